// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable sign-in tracking keyed by identity provider user id.
//!
//! The sign-in webhook needs to know whether a user has completed a sign-in
//! before. Keeping that in the database means the answer survives restarts
//! and is shared by every server instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::Result;
use crate::types::SignInRecord;

#[async_trait]
pub trait SignInStore: Send + Sync {
	async fn has_signed_in(&self, user_id: &str) -> Result<bool>;
	/// Insert or bump the record for `user_id`.
	async fn record_sign_in(&self, user_id: &str) -> Result<SignInRecord>;
}

#[async_trait]
impl SignInStore for SignInRepository {
	async fn has_signed_in(&self, user_id: &str) -> Result<bool> {
		self.has_signed_in(user_id).await
	}

	async fn record_sign_in(&self, user_id: &str) -> Result<SignInRecord> {
		self.record_sign_in(user_id).await
	}
}

#[derive(Clone)]
pub struct SignInRepository {
	pool: SqlitePool,
}

impl SignInRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn has_signed_in(&self, user_id: &str) -> Result<bool> {
		let row = sqlx::query("SELECT 1 FROM sign_in_records WHERE user_id = ?")
			.bind(user_id)
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.is_some())
	}

	#[tracing::instrument(skip(self))]
	pub async fn record_sign_in(&self, user_id: &str) -> Result<SignInRecord> {
		let now = Utc::now();
		let row = sqlx::query(
			r#"
			INSERT INTO sign_in_records (user_id, first_seen_at, last_seen_at, sign_in_count)
			VALUES (?, ?, ?, 1)
			ON CONFLICT(user_id) DO UPDATE SET
				last_seen_at = excluded.last_seen_at,
				sign_in_count = sign_in_count + 1
			RETURNING user_id, first_seen_at, last_seen_at, sign_in_count
			"#,
		)
		.bind(user_id)
		.bind(now)
		.bind(now)
		.fetch_one(&self.pool)
		.await?;

		parse_sign_in_row(&row)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, user_id: &str) -> Result<Option<SignInRecord>> {
		let row = sqlx::query(
			"SELECT user_id, first_seen_at, last_seen_at, sign_in_count FROM sign_in_records WHERE user_id = ?",
		)
		.bind(user_id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_sign_in_row).transpose()
	}
}

fn parse_sign_in_row(row: &SqliteRow) -> Result<SignInRecord> {
	Ok(SignInRecord {
		user_id: row.try_get("user_id")?,
		first_seen_at: row.try_get::<DateTime<Utc>, _>("first_seen_at")?,
		last_seen_at: row.try_get::<DateTime<Utc>, _>("last_seen_at")?,
		sign_in_count: row.try_get("sign_in_count")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_test_pool;

	#[tokio::test]
	async fn unknown_user_has_not_signed_in() {
		let repo = SignInRepository::new(create_migrated_test_pool().await);
		assert!(!repo.has_signed_in("remote-1").await.unwrap());
		assert!(repo.get("remote-1").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn record_sign_in_upserts_and_counts() {
		let repo = SignInRepository::new(create_migrated_test_pool().await);

		let first = repo.record_sign_in("remote-1").await.unwrap();
		assert_eq!(first.sign_in_count, 1);
		assert!(repo.has_signed_in("remote-1").await.unwrap());

		let second = repo.record_sign_in("remote-1").await.unwrap();
		assert_eq!(second.sign_in_count, 2);
		assert_eq!(second.first_seen_at, first.first_seen_at);
		assert!(second.last_seen_at >= first.last_seen_at);
	}

	#[tokio::test]
	async fn records_survive_new_repository_instances() {
		let pool = create_migrated_test_pool().await;
		SignInRepository::new(pool.clone())
			.record_sign_in("remote-9")
			.await
			.unwrap();
		assert!(SignInRepository::new(pool)
			.has_signed_in("remote-9")
			.await
			.unwrap());
	}
}
