// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A user record in the legacy password store.
///
/// `migrated_to_entra` is true exactly when `entra_user_id` is set, and it
/// never goes back to false. The schema enforces the pairing with a CHECK
/// constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyUser {
	pub id: String,
	pub email: String,
	pub username: String,
	/// PHC-formatted password hash.
	pub password_hash: String,
	pub is_active: bool,
	pub migrated_to_entra: bool,
	pub entra_user_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub migrated_at: Option<DateTime<Utc>>,
}

impl LegacyUser {
	/// Apply a successful migration to an in-memory copy.
	pub fn with_migration(mut self, entra_user_id: impl Into<String>) -> Self {
		let now = Utc::now();
		self.migrated_to_entra = true;
		self.entra_user_id = Some(entra_user_id.into());
		self.migrated_at = Some(now);
		self.updated_at = now;
		self
	}
}

/// Input for inserting a legacy user (imports, fixtures).
#[derive(Debug, Clone)]
pub struct NewLegacyUser {
	pub id: Option<String>,
	pub email: String,
	pub username: String,
	pub password_hash: String,
	pub is_active: bool,
	pub created_at: Option<DateTime<Utc>>,
}

impl NewLegacyUser {
	pub fn new(
		email: impl Into<String>,
		username: impl Into<String>,
		password_hash: impl Into<String>,
	) -> Self {
		Self {
			id: None,
			email: email.into(),
			username: username.into(),
			password_hash: password_hash.into(),
			is_active: true,
			created_at: None,
		}
	}
}

/// Aggregate migration progress over the whole legacy store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
	/// Every legacy user, active or not.
	pub total: i64,
	pub migrated: i64,
	/// Unmigrated and active, i.e. eligible for the next bulk run.
	pub pending: i64,
	/// `migrated / total * 100`, rounded to two decimals; zero for an empty store.
	pub percent_complete: f64,
}

impl MigrationStats {
	pub fn from_counts(total: i64, migrated: i64, pending: i64) -> Self {
		let percent_complete = if total > 0 {
			((migrated as f64 / total as f64) * 10_000.0).round() / 100.0
		} else {
			0.0
		};
		Self {
			total,
			migrated,
			pending,
			percent_complete,
		}
	}
}

/// Durable record of a user having signed in through the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SignInRecord {
	pub user_id: String,
	pub first_seen_at: DateTime<Utc>,
	pub last_seen_at: DateTime<Utc>,
	pub sign_in_count: i64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percent_complete_rounds_to_two_decimals() {
		let stats = MigrationStats::from_counts(3, 1, 2);
		assert_eq!(stats.percent_complete, 33.33);

		let stats = MigrationStats::from_counts(3, 2, 1);
		assert_eq!(stats.percent_complete, 66.67);
	}

	#[test]
	fn empty_store_is_zero_percent() {
		assert_eq!(MigrationStats::from_counts(0, 0, 0).percent_complete, 0.0);
	}

	#[test]
	fn stats_serialize_camel_case() {
		let json = serde_json::to_value(MigrationStats::from_counts(4, 1, 3)).unwrap();
		assert_eq!(json["percentComplete"], 25.0);
		assert_eq!(json["pending"], 3);
	}
}
