// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use idbridge_common_secret::SecretString;
use idbridge_server_db::{LegacyUser, LocalUserStore};
use idbridge_server_migration::JitLoginMigrator;
use tracing::{info, instrument};

use crate::error::{AuthError, Result};
use crate::password::verify_password;
use crate::session::SessionTokens;

#[derive(Debug)]
pub struct LoginResult {
	pub token: String,
	/// State after any login-time migration.
	pub user: LegacyUser,
}

pub struct LoginService {
	users: Arc<dyn LocalUserStore>,
	sessions: SessionTokens,
	jit: Option<Arc<JitLoginMigrator>>,
}

impl LoginService {
	pub fn new(users: Arc<dyn LocalUserStore>, sessions: SessionTokens) -> Self {
		Self {
			users,
			sessions,
			jit: None,
		}
	}

	pub fn with_jit_migration(mut self, jit: Arc<JitLoginMigrator>) -> Self {
		self.jit = Some(jit);
		self
	}

	/// Verify legacy credentials and issue a session.
	///
	/// The result depends only on the credentials; login-time migration can
	/// change the returned user but never the outcome.
	#[instrument(skip(self, password))]
	pub async fn login(&self, email: &str, password: &SecretString) -> Result<LoginResult> {
		let user = self
			.users
			.find_by_email(email)
			.await?
			.ok_or(AuthError::InvalidCredentials)?;

		if !verify_password(password.expose(), &user.password_hash) {
			return Err(AuthError::InvalidCredentials);
		}
		if !user.is_active {
			return Err(AuthError::AccountDisabled);
		}

		let user = match &self.jit {
			Some(jit) => jit.on_login(user, password).await,
			None => user,
		};

		let token = self.sessions.issue(&user)?;
		info!(user_id = %user.id, migrated = user.migrated_to_entra, "login succeeded");
		Ok(LoginResult { token, user })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::password::hash_password;
	use idbridge_server_db::testing::create_migrated_test_pool;
	use idbridge_server_db::{LegacyUserRepository, NewLegacyUser};
	use idbridge_server_entra::testing::InMemoryIdentityStore;
	use idbridge_server_migration::SingleUserMigrator;
	use std::time::Duration;

	async fn setup() -> (LegacyUserRepository, Arc<InMemoryIdentityStore>, LoginService) {
		let repo = LegacyUserRepository::new(create_migrated_test_pool().await);
		let identity = InMemoryIdentityStore::new();
		let users: Arc<dyn LocalUserStore> = Arc::new(repo.clone());
		let migrator = Arc::new(SingleUserMigrator::new(users.clone(), identity.clone()));
		let service = LoginService::new(
			users,
			SessionTokens::new(&SecretString::from("jwt"), Duration::from_secs(600)),
		)
		.with_jit_migration(Arc::new(JitLoginMigrator::new(migrator)));
		(repo, identity, service)
	}

	async fn add_user(repo: &LegacyUserRepository, email: &str, password: &str) -> LegacyUser {
		repo.create(&NewLegacyUser::new(email, "alice", hash_password(password).unwrap()))
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn login_migrates_and_reports_it_in_the_session() {
		let (repo, identity, service) = setup().await;
		add_user(&repo, "alice@example.com", "Alice#Secret99").await;

		let result = service
			.login("alice@example.com", &SecretString::from("Alice#Secret99"))
			.await
			.unwrap();
		assert!(result.user.migrated_to_entra);
		assert_eq!(identity.len(), 1);

		let claims = SessionTokens::new(&SecretString::from("jwt"), Duration::from_secs(600))
			.decode(&result.token)
			.unwrap();
		assert!(claims.migrated_to_entra);
	}

	#[tokio::test]
	async fn bcrypt_legacy_user_is_migrated_at_login() {
		let (repo, identity, service) = setup().await;
		repo.create(&NewLegacyUser::new(
			"bob@example.com",
			"bob",
			"$2b$04$Tu10DhUwR0nJMHW4/oSfs.rDy6JaPg6BoJ8HPIlrMUzzP4hBYZgI2",
		))
		.await
		.unwrap();

		let result = service
			.login("bob@example.com", &SecretString::from("Legacy#Pass1"))
			.await
			.unwrap();
		assert!(result.user.migrated_to_entra);
		assert_eq!(identity.create_calls(), 1);
	}

	#[tokio::test]
	async fn login_succeeds_when_identity_provider_is_down() {
		let (repo, identity, service) = setup().await;
		add_user(&repo, "alice@example.com", "Alice#Secret99").await;
		identity.set_unavailable(true);

		let result = service
			.login("alice@example.com", &SecretString::from("Alice#Secret99"))
			.await
			.unwrap();
		assert!(!result.user.migrated_to_entra);
		assert!(!result.token.is_empty());
	}

	#[tokio::test]
	async fn wrong_password_and_unknown_email_look_the_same() {
		let (repo, identity, service) = setup().await;
		add_user(&repo, "alice@example.com", "Alice#Secret99").await;

		let wrong = service
			.login("alice@example.com", &SecretString::from("nope"))
			.await
			.unwrap_err();
		let unknown = service
			.login("bob@example.com", &SecretString::from("Alice#Secret99"))
			.await
			.unwrap_err();
		assert!(matches!(wrong, AuthError::InvalidCredentials));
		assert!(matches!(unknown, AuthError::InvalidCredentials));
		assert_eq!(identity.create_calls(), 0);
	}

	#[tokio::test]
	async fn inactive_account_is_refused() {
		let (repo, _, service) = setup().await;
		let user = add_user(&repo, "alice@example.com", "Alice#Secret99").await;
		repo.set_active(&user.id, false).await.unwrap();

		let err = service
			.login("alice@example.com", &SecretString::from("Alice#Secret99"))
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::AccountDisabled));
	}
}
