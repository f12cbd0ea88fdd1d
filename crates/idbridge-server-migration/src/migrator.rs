// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Migrates one legacy user to the identity provider.
//!
//! The remote identity is created first and the local record is only marked
//! once that succeeds, so a remote failure leaves the local record untouched
//! and the attempt can simply be repeated. The reverse window (remote created,
//! local mark failed) is reported as [`MigrationError::InconsistentState`].
//!
//! Cancellation is honoured up to the remote create. Once issued, a create
//! always runs to completion so its result is never lost.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use idbridge_common_secret::SecretString;
use idbridge_server_db::{LegacyUser, LocalUserStore};
use idbridge_server_entra::{IdentityError, IdentityStore, UserDraft};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::decision::{decide, Decision};
use crate::error::{MigrationError, Result};
use crate::locks::PerUserLocks;
use crate::notify::{NotificationQueue, TemporaryPasswordNotice};
use crate::outcome::MigrationOutcome;
use crate::password::{SecretGenerator, DEFAULT_LENGTH};

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
	/// Queue a notice carrying the temporary password.
	pub send_email: bool,
}

/// Initial password for the remote identity.
enum Credential<'a> {
	/// Generated here; the user must change it on first remote sign-in.
	Temporary { send_email: bool },
	/// The user's own password, just verified at login.
	Verified(&'a SecretString),
}

#[derive(Debug, Default)]
pub struct MigrationMetrics {
	inconsistent_state: AtomicU64,
}

impl MigrationMetrics {
	/// Remote identities created whose local record could not be marked.
	pub fn inconsistent_state_count(&self) -> u64 {
		self.inconsistent_state.load(Ordering::Relaxed)
	}
}

pub struct SingleUserMigrator {
	users: Arc<dyn LocalUserStore>,
	identity: Arc<dyn IdentityStore>,
	generator: SecretGenerator,
	locks: PerUserLocks,
	notifications: Option<NotificationQueue>,
	metrics: Arc<MigrationMetrics>,
	temporary_password_length: usize,
}

impl SingleUserMigrator {
	pub fn new(users: Arc<dyn LocalUserStore>, identity: Arc<dyn IdentityStore>) -> Self {
		Self {
			users,
			identity,
			generator: SecretGenerator::new(),
			locks: PerUserLocks::new(),
			notifications: None,
			metrics: Arc::new(MigrationMetrics::default()),
			temporary_password_length: DEFAULT_LENGTH,
		}
	}

	pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
		self.notifications = Some(queue);
		self
	}

	pub fn with_temporary_password_length(mut self, length: usize) -> Self {
		self.temporary_password_length = length;
		self
	}

	pub fn metrics(&self) -> Arc<MigrationMetrics> {
		Arc::clone(&self.metrics)
	}

	pub fn users(&self) -> &Arc<dyn LocalUserStore> {
		&self.users
	}

	/// Migrate with a generated temporary password.
	///
	/// Skips return `Ok`; a missing user is [`MigrationError::NotFound`].
	#[instrument(skip(self, cancel), fields(send_email = options.send_email))]
	pub async fn migrate(
		&self,
		user_id: &str,
		options: MigrateOptions,
		cancel: &CancellationToken,
	) -> Result<MigrationOutcome> {
		self.migrate_with(
			user_id,
			Credential::Temporary {
				send_email: options.send_email,
			},
			cancel,
		)
		.await
	}

	/// Migrate using the user's verified plaintext password. No forced change.
	#[instrument(skip(self, password))]
	pub async fn migrate_with_password(
		&self,
		user_id: &str,
		password: &SecretString,
	) -> Result<MigrationOutcome> {
		self.migrate_with(
			user_id,
			Credential::Verified(password),
			&CancellationToken::new(),
		)
		.await
	}

	async fn migrate_with(
		&self,
		user_id: &str,
		credential: Credential<'_>,
		cancel: &CancellationToken,
	) -> Result<MigrationOutcome> {
		let _lock = self.locks.lock(user_id).await;

		let user = self
			.users
			.find_by_id(user_id)
			.await?
			.ok_or_else(|| MigrationError::NotFound(user_id.to_string()))?;

		if let Decision::Skip(reason) =
			unless_cancelled(cancel, decide(&user, self.identity.as_ref())).await??
		{
			info!(user_id, %reason, "migration skipped");
			return Ok(MigrationOutcome::skipped(&user, reason));
		}

		let (password, force_change, send_email) = match credential {
			Credential::Temporary { send_email } => (
				self.generator.generate(self.temporary_password_length)?,
				true,
				send_email,
			),
			Credential::Verified(password) => (password.clone(), false, false),
		};

		let draft = UserDraft {
			email: user.email.clone(),
			username: user.username.clone(),
			account_enabled: user.is_active,
		};
		let remote_id = match self.identity.create(&draft, &password, force_change).await {
			Ok(remote_id) => remote_id,
			Err(e) => return Err(self.create_failed(&user, e).await),
		};

		self.commit(&user, &remote_id).await?;
		info!(user_id, remote_id = %remote_id, force_change, "user migrated");

		let notified = send_email && self.notify(&user, &password);

		Ok(MigrationOutcome::Migrated {
			user_id: user.id,
			email: user.email,
			entra_user_id: remote_id,
			temporary_password: force_change.then_some(password),
			notified,
		})
	}

	/// Mark a user migrated when a remote identity already exists for them.
	///
	/// Returns the remote id when this call flipped the local flag. Used by the
	/// reconciliation sweep to close the remote-created, locally-unmarked gap.
	#[instrument(skip(self))]
	pub async fn reconcile(&self, user_id: &str) -> Result<Option<String>> {
		let _lock = self.locks.lock(user_id).await;

		let Some(user) = self.users.find_by_id(user_id).await? else {
			return Ok(None);
		};
		if user.migrated_to_entra {
			return Ok(None);
		}
		let Some(remote_id) = self.identity.find_by_email(&user.email).await? else {
			return Ok(None);
		};
		if !self.users.mark_migrated(&user.id, &remote_id).await? {
			return Ok(None);
		}

		info!(user_id, remote_id = %remote_id, "reconciled existing remote identity");
		Ok(Some(remote_id))
	}

	async fn commit(&self, user: &LegacyUser, remote_id: &str) -> Result<()> {
		let reason = match self.users.mark_migrated(&user.id, remote_id).await {
			Ok(true) => return Ok(()),
			Ok(false) => "local record was already marked by another writer".to_string(),
			Err(e) => e.to_string(),
		};
		Err(self.inconsistent(user, remote_id, &reason))
	}

	/// Classify a failed create. A timeout or a duplicate may mean the
	/// identity was committed after all, so the directory is asked before
	/// the failure is reported as clean.
	async fn create_failed(&self, user: &LegacyUser, error: IdentityError) -> MigrationError {
		if !matches!(
			error,
			IdentityError::Unavailable { .. } | IdentityError::Conflict(_)
		) {
			return MigrationError::RemoteCreateFailed(error);
		}

		match self.identity.find_by_email(&user.email).await {
			Ok(Some(remote_id)) => {
				self.inconsistent(user, &remote_id, &format!("create reported failure: {error}"))
			}
			Ok(None) => MigrationError::RemoteCreateFailed(error),
			Err(lookup) => {
				warn!(
					user_id = %user.id,
					error = %lookup,
					"could not confirm whether the failed create committed"
				);
				MigrationError::RemoteCreateFailed(error)
			}
		}
	}

	fn inconsistent(&self, user: &LegacyUser, remote_id: &str, reason: &str) -> MigrationError {
		self.metrics.inconsistent_state.fetch_add(1, Ordering::Relaxed);
		error!(
			inconsistent_state = true,
			user_id = %user.id,
			remote_id,
			reason = %reason,
			"remote identity created but local record not marked migrated"
		);
		MigrationError::InconsistentState {
			user_id: user.id.clone(),
			remote_id: remote_id.to_string(),
		}
	}

	/// Returns whether the notice was queued.
	fn notify(&self, user: &LegacyUser, password: &SecretString) -> bool {
		let Some(queue) = &self.notifications else {
			warn!(user_id = %user.id, "no mail transport configured, temporary password not sent");
			return false;
		};
		queue.enqueue(TemporaryPasswordNotice {
			email: user.email.clone(),
			username: user.username.clone(),
			password: password.clone(),
		})
	}
}

async fn unless_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(MigrationError::Cancelled),
		output = fut => Ok(output),
	}
}
