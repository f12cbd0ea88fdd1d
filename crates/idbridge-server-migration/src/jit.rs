// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Migration as a side effect of a successful login.

use std::sync::Arc;

use idbridge_common_secret::SecretString;
use idbridge_server_db::LegacyUser;
use tracing::{debug, info, instrument, warn};

use crate::decision::SkipReason;
use crate::migrator::SingleUserMigrator;
use crate::outcome::MigrationOutcome;
use crate::password::validate_password_strength;

pub struct JitLoginMigrator {
	migrator: Arc<SingleUserMigrator>,
}

impl JitLoginMigrator {
	pub fn new(migrator: Arc<SingleUserMigrator>) -> Self {
		Self { migrator }
	}

	/// Best-effort migration after the password was verified.
	///
	/// Always returns a user: the migrated copy on success, otherwise the
	/// latest known local state. Failures are logged, never returned.
	#[instrument(skip_all, fields(user_id = %user.id))]
	pub async fn on_login(&self, user: LegacyUser, password: &SecretString) -> LegacyUser {
		if user.migrated_to_entra {
			return user;
		}
		if !validate_password_strength(password.expose()) {
			info!("password does not meet identity provider policy, deferring migration");
			return user;
		}

		match self.migrator.migrate_with_password(&user.id, password).await {
			Ok(MigrationOutcome::Migrated { entra_user_id, .. }) => {
				info!(remote_id = %entra_user_id, "user migrated at login");
				user.with_migration(entra_user_id)
			}
			Ok(MigrationOutcome::Skipped {
				reason: SkipReason::AlreadyMigrated,
				..
			}) => self.reload(user).await,
			Ok(other) => {
				debug!(outcome = ?other, "login migration not performed");
				user
			}
			Err(e) => {
				warn!(error = %e, "login migration failed, login continues");
				user
			}
		}
	}

	/// Another writer migrated the user while we waited for the lock.
	async fn reload(&self, user: LegacyUser) -> LegacyUser {
		match self.migrator.users().find_by_id(&user.id).await {
			Ok(Some(fresh)) => fresh,
			Ok(None) => user,
			Err(e) => {
				warn!(error = %e, "could not reload user after concurrent migration");
				user
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrator::MigrateOptions;
	use crate::test_support::InMemoryUserStore;
	use idbridge_server_entra::testing::InMemoryIdentityStore;
	use tokio_util::sync::CancellationToken;

	fn setup() -> (Arc<InMemoryUserStore>, Arc<InMemoryIdentityStore>, JitLoginMigrator) {
		let users = InMemoryUserStore::new();
		let identity = InMemoryIdentityStore::new();
		let migrator = Arc::new(SingleUserMigrator::new(users.clone(), identity.clone()));
		(users, identity, JitLoginMigrator::new(migrator))
	}

	#[tokio::test]
	async fn login_migrates_with_the_verified_password() {
		let (users, identity, jit) = setup();
		users.insert("u1", "alice@example.com", 0);
		let user = users.get("u1").unwrap();

		let after = jit
			.on_login(user, &SecretString::from("Alice#Secret99"))
			.await;

		assert!(after.migrated_to_entra);
		let remote = identity
			.get(after.entra_user_id.as_deref().unwrap())
			.unwrap();
		assert_eq!(remote.password, "Alice#Secret99");
		assert!(!remote.force_change);
		assert!(users.get("u1").unwrap().migrated_to_entra);
	}

	#[tokio::test]
	async fn remote_outage_returns_the_unmigrated_user() {
		let (users, identity, jit) = setup();
		users.insert("u1", "alice@example.com", 0);
		identity.set_unavailable(true);
		let user = users.get("u1").unwrap();

		let after = jit
			.on_login(user.clone(), &SecretString::from("Alice#Secret99"))
			.await;
		assert_eq!(after, user);
	}

	#[tokio::test]
	async fn weak_password_skips_the_remote_call() {
		let (users, identity, jit) = setup();
		users.insert("u1", "alice@example.com", 0);
		let user = users.get("u1").unwrap();

		let after = jit.on_login(user, &SecretString::from("password")).await;
		assert!(!after.migrated_to_entra);
		assert_eq!(identity.create_calls(), 0);
	}

	#[tokio::test]
	async fn stale_login_copy_picks_up_concurrent_migration() {
		let users = InMemoryUserStore::new();
		let identity = InMemoryIdentityStore::new();
		let migrator = Arc::new(SingleUserMigrator::new(users.clone(), identity.clone()));
		let jit = JitLoginMigrator::new(Arc::clone(&migrator));
		users.insert("u1", "alice@example.com", 0);
		let stale = users.get("u1").unwrap();

		migrator
			.migrate("u1", MigrateOptions::default(), &CancellationToken::new())
			.await
			.unwrap();

		let after = jit
			.on_login(stale, &SecretString::from("Alice#Secret99"))
			.await;
		assert!(after.migrated_to_entra);
		assert_eq!(identity.create_calls(), 1);
	}
}
