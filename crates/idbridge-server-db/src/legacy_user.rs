// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Legacy user repository.
//!
//! The legacy store is the system of record until a user has been migrated.
//! Migration state only ever moves forward: [`LegacyUserRepository::mark_migrated`]
//! is a compare-and-swap that flips `migrated_to_entra` from false to true and
//! reports whether this caller won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{LegacyUser, MigrationStats, NewLegacyUser};

const USER_COLUMNS: &str = "id, email, username, password_hash, is_active, migrated_to_entra, \
	entra_user_id, created_at, updated_at, migrated_at";

#[async_trait]
pub trait LocalUserStore: Send + Sync {
	async fn find_by_id(&self, id: &str) -> Result<Option<LegacyUser>>;
	async fn find_by_email(&self, email: &str) -> Result<Option<LegacyUser>>;
	/// Unmigrated users ordered by `created_at` ascending.
	async fn list_unmigrated(&self, limit: Option<u32>, active_only: bool)
		-> Result<Vec<LegacyUser>>;
	/// Returns `true` only if this call moved the user from unmigrated to migrated.
	async fn mark_migrated(&self, id: &str, entra_user_id: &str) -> Result<bool>;
	async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<()>;
	async fn migration_stats(&self) -> Result<MigrationStats>;
}

#[async_trait]
impl LocalUserStore for LegacyUserRepository {
	async fn find_by_id(&self, id: &str) -> Result<Option<LegacyUser>> {
		self.find_by_id(id).await
	}

	async fn find_by_email(&self, email: &str) -> Result<Option<LegacyUser>> {
		self.find_by_email(email).await
	}

	async fn list_unmigrated(
		&self,
		limit: Option<u32>,
		active_only: bool,
	) -> Result<Vec<LegacyUser>> {
		self.list_unmigrated(limit, active_only).await
	}

	async fn mark_migrated(&self, id: &str, entra_user_id: &str) -> Result<bool> {
		self.mark_migrated(id, entra_user_id).await
	}

	async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<()> {
		self.update_password_hash(id, password_hash).await
	}

	async fn migration_stats(&self) -> Result<MigrationStats> {
		self.migration_stats().await
	}
}

#[derive(Clone)]
pub struct LegacyUserRepository {
	pool: SqlitePool,
}

impl LegacyUserRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert a new unmigrated user. Emails are stored lowercased.
	///
	/// # Errors
	/// `DbError::Conflict` if the email is already present.
	#[tracing::instrument(skip(self, user), fields(email = %user.email))]
	pub async fn create(&self, user: &NewLegacyUser) -> Result<LegacyUser> {
		let id = user
			.id
			.clone()
			.unwrap_or_else(|| Uuid::new_v4().to_string());
		let now = Utc::now();
		let created_at = user.created_at.unwrap_or(now);
		let email = normalize_email(&user.email);

		let result = sqlx::query(
			r#"
			INSERT INTO legacy_users (id, email, username, password_hash, is_active,
				migrated_to_entra, entra_user_id, created_at, updated_at, migrated_at)
			VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?, NULL)
			"#,
		)
		.bind(&id)
		.bind(&email)
		.bind(&user.username)
		.bind(&user.password_hash)
		.bind(user.is_active)
		.bind(created_at)
		.bind(now)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => {}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
				return Err(DbError::Conflict(format!("user with email {email} already exists")));
			}
			Err(e) => return Err(e.into()),
		}

		tracing::debug!(user_id = %id, "legacy user created");

		Ok(LegacyUser {
			id,
			email,
			username: user.username.clone(),
			password_hash: user.password_hash.clone(),
			is_active: user.is_active,
			migrated_to_entra: false,
			entra_user_id: None,
			created_at,
			updated_at: now,
			migrated_at: None,
		})
	}

	#[tracing::instrument(skip(self), fields(user_id = %id))]
	pub async fn find_by_id(&self, id: &str) -> Result<Option<LegacyUser>> {
		let row = sqlx::query(&format!(
			"SELECT {USER_COLUMNS} FROM legacy_users WHERE id = ?"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_user_row).transpose()
	}

	#[tracing::instrument(skip(self, email))]
	pub async fn find_by_email(&self, email: &str) -> Result<Option<LegacyUser>> {
		let row = sqlx::query(&format!(
			"SELECT {USER_COLUMNS} FROM legacy_users WHERE lower(email) = ?"
		))
		.bind(normalize_email(email))
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_user_row).transpose()
	}

	/// Candidate users for migration, oldest first so repeated runs drain
	/// the backlog in FIFO order. `id` breaks ties for a stable order.
	#[tracing::instrument(skip(self))]
	pub async fn list_unmigrated(
		&self,
		limit: Option<u32>,
		active_only: bool,
	) -> Result<Vec<LegacyUser>> {
		// SQLite treats a negative LIMIT as unbounded.
		let limit = limit.map(i64::from).unwrap_or(-1);

		let rows = sqlx::query(&format!(
			r#"
			SELECT {USER_COLUMNS} FROM legacy_users
			WHERE migrated_to_entra = 0
			  AND (? = 0 OR is_active = 1)
			ORDER BY created_at ASC, id ASC
			LIMIT ?
			"#
		))
		.bind(active_only)
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_user_row).collect()
	}

	#[tracing::instrument(skip(self), fields(user_id = %id, entra_user_id = %entra_user_id))]
	pub async fn mark_migrated(&self, id: &str, entra_user_id: &str) -> Result<bool> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE legacy_users
			SET migrated_to_entra = 1,
				entra_user_id = ?,
				migrated_at = ?,
				updated_at = ?
			WHERE id = ? AND migrated_to_entra = 0
			"#,
		)
		.bind(entra_user_id)
		.bind(now)
		.bind(now)
		.bind(id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self, password_hash), fields(user_id = %id))]
	pub async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<()> {
		let result = sqlx::query(
			"UPDATE legacy_users SET password_hash = ?, updated_at = ? WHERE id = ?",
		)
		.bind(password_hash)
		.bind(Utc::now())
		.bind(id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("legacy user {id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn migration_stats(&self) -> Result<MigrationStats> {
		let (total, migrated, pending) = sqlx::query_as::<_, (i64, i64, i64)>(
			r#"
			SELECT
				COUNT(*),
				COALESCE(SUM(CASE WHEN migrated_to_entra = 1 THEN 1 ELSE 0 END), 0),
				COALESCE(SUM(CASE WHEN migrated_to_entra = 0 AND is_active = 1 THEN 1 ELSE 0 END), 0)
			FROM legacy_users
			"#,
		)
		.fetch_one(&self.pool)
		.await?;

		Ok(MigrationStats::from_counts(total, migrated, pending))
	}

	#[tracing::instrument(skip(self), fields(user_id = %id))]
	pub async fn set_active(&self, id: &str, is_active: bool) -> Result<()> {
		let result = sqlx::query("UPDATE legacy_users SET is_active = ?, updated_at = ? WHERE id = ?")
			.bind(is_active)
			.bind(Utc::now())
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("legacy user {id}")));
		}
		Ok(())
	}
}

fn normalize_email(email: &str) -> String {
	email.trim().to_lowercase()
}

fn parse_user_row(row: &SqliteRow) -> Result<LegacyUser> {
	Ok(LegacyUser {
		id: row.try_get("id")?,
		email: row.try_get("email")?,
		username: row.try_get("username")?,
		password_hash: row.try_get("password_hash")?,
		is_active: row.try_get("is_active")?,
		migrated_to_entra: row.try_get("migrated_to_entra")?,
		entra_user_id: row.try_get("entra_user_id")?,
		created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
		updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
		migrated_at: row.try_get::<Option<DateTime<Utc>>, _>("migrated_at")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_test_pool;
	use chrono::Duration;

	async fn make_repo() -> LegacyUserRepository {
		LegacyUserRepository::new(create_migrated_test_pool().await)
	}

	fn user_at(email: &str, minutes_ago: i64) -> NewLegacyUser {
		NewLegacyUser {
			created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
			..NewLegacyUser::new(email, email.split('@').next().unwrap(), "$argon2id$stub")
		}
	}

	#[tokio::test]
	async fn create_and_find_by_email_is_case_insensitive() {
		let repo = make_repo().await;
		let created = repo.create(&user_at("Alice@Example.com", 1)).await.unwrap();
		assert_eq!(created.email, "alice@example.com");

		let found = repo.find_by_email("ALICE@example.com").await.unwrap().unwrap();
		assert_eq!(found.id, created.id);
		assert!(!found.migrated_to_entra);
		assert!(found.entra_user_id.is_none());
	}

	#[tokio::test]
	async fn duplicate_email_is_conflict() {
		let repo = make_repo().await;
		repo.create(&user_at("bob@example.com", 1)).await.unwrap();
		let err = repo.create(&user_at("bob@example.com", 1)).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn list_unmigrated_orders_oldest_first_and_filters() {
		let repo = make_repo().await;
		let newest = repo.create(&user_at("c@example.com", 1)).await.unwrap();
		let oldest = repo.create(&user_at("a@example.com", 30)).await.unwrap();
		let middle = repo.create(&user_at("b@example.com", 10)).await.unwrap();
		let inactive = repo.create(&user_at("d@example.com", 20)).await.unwrap();
		repo.set_active(&inactive.id, false).await.unwrap();
		repo.mark_migrated(&middle.id, "remote-b").await.unwrap();

		let active: Vec<String> = repo
			.list_unmigrated(None, true)
			.await
			.unwrap()
			.into_iter()
			.map(|u| u.id)
			.collect();
		assert_eq!(active, vec![oldest.id.clone(), newest.id.clone()]);

		let all: Vec<String> = repo
			.list_unmigrated(None, false)
			.await
			.unwrap()
			.into_iter()
			.map(|u| u.id)
			.collect();
		assert_eq!(all, vec![oldest.id.clone(), inactive.id, newest.id]);

		let limited = repo.list_unmigrated(Some(1), true).await.unwrap();
		assert_eq!(limited.len(), 1);
		assert_eq!(limited[0].id, oldest.id);
	}

	#[tokio::test]
	async fn mark_migrated_is_compare_and_swap() {
		let repo = make_repo().await;
		let user = repo.create(&user_at("cas@example.com", 1)).await.unwrap();

		assert!(repo.mark_migrated(&user.id, "remote-1").await.unwrap());
		assert!(!repo.mark_migrated(&user.id, "remote-2").await.unwrap());

		let stored = repo.find_by_id(&user.id).await.unwrap().unwrap();
		assert!(stored.migrated_to_entra);
		assert_eq!(stored.entra_user_id.as_deref(), Some("remote-1"));
		assert!(stored.migrated_at.is_some());
	}

	#[tokio::test]
	async fn mark_migrated_unknown_user_reports_false() {
		let repo = make_repo().await;
		assert!(!repo.mark_migrated("missing", "remote").await.unwrap());
	}

	#[tokio::test]
	async fn update_password_hash_requires_existing_user() {
		let repo = make_repo().await;
		let user = repo.create(&user_at("pw@example.com", 1)).await.unwrap();
		repo.update_password_hash(&user.id, "$argon2id$new").await.unwrap();
		assert_eq!(
			repo.find_by_id(&user.id).await.unwrap().unwrap().password_hash,
			"$argon2id$new"
		);

		let err = repo.update_password_hash("missing", "x").await.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn stats_count_pending_as_active_unmigrated() {
		let repo = make_repo().await;
		let a = repo.create(&user_at("a@example.com", 4)).await.unwrap();
		repo.create(&user_at("b@example.com", 3)).await.unwrap();
		let c = repo.create(&user_at("c@example.com", 2)).await.unwrap();
		repo.create(&user_at("d@example.com", 1)).await.unwrap();
		repo.mark_migrated(&a.id, "remote-a").await.unwrap();
		repo.set_active(&c.id, false).await.unwrap();

		let stats = repo.migration_stats().await.unwrap();
		assert_eq!(stats.total, 4);
		assert_eq!(stats.migrated, 1);
		assert_eq!(stats.pending, 2);
		assert_eq!(stats.percent_complete, 25.0);
	}

	#[tokio::test]
	async fn schema_rejects_flag_without_remote_id() {
		let repo = make_repo().await;
		let user = repo.create(&user_at("check@example.com", 1)).await.unwrap();
		let result = sqlx::query("UPDATE legacy_users SET migrated_to_entra = 1 WHERE id = ?")
			.bind(&user.id)
			.execute(&repo.pool)
			.await;
		assert!(result.is_err());
	}
}
