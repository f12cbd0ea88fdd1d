// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrative password changes.
//!
//! The legacy hash is always updated. For migrated users the new password is
//! also pushed to the identity provider; a failed push is logged and reported
//! but does not undo the local change.

use std::sync::Arc;

use idbridge_common_secret::SecretString;
use idbridge_server_db::{LegacyUser, LocalUserStore};
use idbridge_server_entra::IdentityStore;
use idbridge_server_migration::SecretGenerator;
use tracing::{info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::password::hash_password;

/// What happened on the identity provider side of a password change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSync {
	/// User not migrated; nothing to push.
	NotMigrated,
	Synced,
	Failed,
}

pub struct PasswordService {
	users: Arc<dyn LocalUserStore>,
	identity: Option<Arc<dyn IdentityStore>>,
	generator: SecretGenerator,
	min_length: usize,
	temporary_length: usize,
}

impl PasswordService {
	pub fn new(users: Arc<dyn LocalUserStore>, min_length: usize, temporary_length: usize) -> Self {
		Self {
			users,
			identity: None,
			generator: SecretGenerator::new(),
			min_length,
			temporary_length,
		}
	}

	pub fn with_identity_store(mut self, identity: Arc<dyn IdentityStore>) -> Self {
		self.identity = Some(identity);
		self
	}

	#[instrument(skip(self, new_password))]
	pub async fn update_password(
		&self,
		user_id: &str,
		new_password: &SecretString,
	) -> Result<RemoteSync> {
		if new_password.expose().chars().count() < self.min_length {
			return Err(AuthError::WeakPassword(format!(
				"must be at least {} characters",
				self.min_length
			)));
		}
		let user = self.load(user_id).await?;
		self.apply(&user, new_password).await
	}

	/// Replace the password with a generated one and return it. This is the
	/// only place the value is ever surfaced.
	#[instrument(skip(self))]
	pub async fn reset_password(&self, user_id: &str) -> Result<(SecretString, RemoteSync)> {
		let user = self.load(user_id).await?;
		let temporary = self.generator.generate(self.temporary_length)?;
		let sync = self.apply(&user, &temporary).await?;
		Ok((temporary, sync))
	}

	async fn load(&self, user_id: &str) -> Result<LegacyUser> {
		self.users
			.find_by_id(user_id)
			.await?
			.ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))
	}

	async fn apply(&self, user: &LegacyUser, password: &SecretString) -> Result<RemoteSync> {
		let hash = hash_password(password.expose())?;
		self.users.update_password_hash(&user.id, &hash).await?;
		info!(user_id = %user.id, "local password updated");

		let (Some(remote_id), Some(identity)) = (user.entra_user_id.as_deref(), &self.identity)
		else {
			return Ok(RemoteSync::NotMigrated);
		};

		match identity.patch_password(remote_id, password).await {
			Ok(()) => {
				info!(user_id = %user.id, remote_id, "remote password updated");
				Ok(RemoteSync::Synced)
			}
			Err(e) => {
				warn!(user_id = %user.id, remote_id, error = %e, "remote password update failed");
				Ok(RemoteSync::Failed)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::password::verify_password;
	use idbridge_common_secret::SecretString;
	use idbridge_server_db::testing::create_migrated_test_pool;
	use idbridge_server_db::{LegacyUserRepository, NewLegacyUser};
	use idbridge_server_entra::testing::InMemoryIdentityStore;
	use idbridge_server_entra::UserDraft;

	async fn setup() -> (LegacyUserRepository, Arc<InMemoryIdentityStore>, PasswordService) {
		let repo = LegacyUserRepository::new(create_migrated_test_pool().await);
		let identity = InMemoryIdentityStore::new();
		let service = PasswordService::new(Arc::new(repo.clone()), 8, 16)
			.with_identity_store(identity.clone());
		(repo, identity, service)
	}

	async fn migrated_user(
		repo: &LegacyUserRepository,
		identity: &InMemoryIdentityStore,
	) -> (String, String) {
		let user = repo
			.create(&NewLegacyUser::new("alice@example.com", "alice", hash_password("Old#Pass1").unwrap()))
			.await
			.unwrap();
		let remote_id = identity
			.create(
				&UserDraft::new("alice@example.com", "alice"),
				&SecretString::from("Old#Pass1"),
				false,
			)
			.await
			.unwrap();
		assert!(repo.mark_migrated(&user.id, &remote_id).await.unwrap());
		(user.id, remote_id)
	}

	#[tokio::test]
	async fn update_changes_both_sides_for_migrated_users() {
		let (repo, identity, service) = setup().await;
		let (id, remote_id) = migrated_user(&repo, &identity).await;

		let sync = service
			.update_password(&id, &SecretString::from("New#Pass22"))
			.await
			.unwrap();
		assert_eq!(sync, RemoteSync::Synced);
		assert_eq!(identity.get(&remote_id).unwrap().password, "New#Pass22");

		let stored = repo.find_by_id(&id).await.unwrap().unwrap();
		assert!(verify_password("New#Pass22", &stored.password_hash));
	}

	#[tokio::test]
	async fn remote_failure_keeps_the_local_change() {
		let (repo, identity, service) = setup().await;
		let (id, _) = migrated_user(&repo, &identity).await;
		identity.set_unavailable(true);

		let sync = service
			.update_password(&id, &SecretString::from("New#Pass22"))
			.await
			.unwrap();
		assert_eq!(sync, RemoteSync::Failed);
		let stored = repo.find_by_id(&id).await.unwrap().unwrap();
		assert!(verify_password("New#Pass22", &stored.password_hash));
	}

	#[tokio::test]
	async fn short_passwords_are_rejected_before_lookup() {
		let (_, _, service) = setup().await;
		let err = service
			.update_password("missing", &SecretString::from("short"))
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::WeakPassword(_)));
	}

	#[tokio::test]
	async fn reset_returns_a_temporary_password_that_verifies() {
		let (repo, _, service) = setup().await;
		let user = repo
			.create(&NewLegacyUser::new("bob@example.com", "bob", hash_password("Old#Pass1").unwrap()))
			.await
			.unwrap();

		let (temporary, sync) = service.reset_password(&user.id).await.unwrap();
		assert_eq!(sync, RemoteSync::NotMigrated);
		assert_eq!(temporary.expose().len(), 16);
		let stored = repo.find_by_id(&user.id).await.unwrap().unwrap();
		assert!(verify_password(temporary.expose(), &stored.password_hash));
	}

	#[tokio::test]
	async fn unknown_user_is_not_found() {
		let (_, _, service) = setup().await;
		assert!(matches!(
			service.reset_password("missing").await,
			Err(AuthError::UserNotFound(_))
		));
	}
}
