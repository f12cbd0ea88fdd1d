// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use idbridge_server_db::{DbError, LegacyUser, LocalUserStore, MigrationStats, Result};

/// `LocalUserStore` over a `HashMap`, with switches for failure injection.
#[derive(Default)]
pub struct InMemoryUserStore {
	users: Mutex<HashMap<String, LegacyUser>>,
	pub fail_list: AtomicBool,
	pub fail_mark: AtomicBool,
	pub mark_calls: AtomicUsize,
}

impl InMemoryUserStore {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Insert `count` active unmigrated users, `user-0000` being the oldest.
	pub fn seed(&self, count: usize) -> Vec<String> {
		(0..count)
			.map(|i| self.insert(&format!("user-{i:04}"), &format!("user{i}@example.com"), i as i64))
			.collect()
	}

	pub fn insert(&self, id: &str, email: &str, age_rank: i64) -> String {
		let created_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
			+ ChronoDuration::minutes(age_rank);
		let user = LegacyUser {
			id: id.to_string(),
			email: email.to_string(),
			username: id.replace('-', ""),
			password_hash: "$argon2id$placeholder".to_string(),
			is_active: true,
			migrated_to_entra: false,
			entra_user_id: None,
			created_at,
			updated_at: created_at,
			migrated_at: None,
		};
		self.users.lock().unwrap().insert(id.to_string(), user);
		id.to_string()
	}

	pub fn update(&self, id: &str, f: impl FnOnce(&mut LegacyUser)) {
		if let Some(user) = self.users.lock().unwrap().get_mut(id) {
			f(user);
		}
	}

	pub fn get(&self, id: &str) -> Option<LegacyUser> {
		self.users.lock().unwrap().get(id).cloned()
	}

	fn unavailable() -> DbError {
		DbError::Internal("database connection refused".to_string())
	}
}

#[async_trait]
impl LocalUserStore for InMemoryUserStore {
	async fn find_by_id(&self, id: &str) -> Result<Option<LegacyUser>> {
		Ok(self.get(id))
	}

	async fn find_by_email(&self, email: &str) -> Result<Option<LegacyUser>> {
		Ok(self
			.users
			.lock()
			.unwrap()
			.values()
			.find(|u| u.email.eq_ignore_ascii_case(email))
			.cloned())
	}

	async fn list_unmigrated(&self, limit: Option<u32>, active_only: bool) -> Result<Vec<LegacyUser>> {
		if self.fail_list.load(Ordering::SeqCst) {
			return Err(Self::unavailable());
		}
		let mut users: Vec<LegacyUser> = self
			.users
			.lock()
			.unwrap()
			.values()
			.filter(|u| !u.migrated_to_entra && (!active_only || u.is_active))
			.cloned()
			.collect();
		users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
		if let Some(limit) = limit {
			users.truncate(limit as usize);
		}
		Ok(users)
	}

	async fn mark_migrated(&self, id: &str, entra_user_id: &str) -> Result<bool> {
		self.mark_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_mark.load(Ordering::SeqCst) {
			return Err(Self::unavailable());
		}
		let mut users = self.users.lock().unwrap();
		match users.get_mut(id) {
			Some(user) if !user.migrated_to_entra => {
				*user = user.clone().with_migration(entra_user_id);
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn update_password_hash(&self, id: &str, password_hash: &str) -> Result<()> {
		let mut users = self.users.lock().unwrap();
		let user = users
			.get_mut(id)
			.ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
		user.password_hash = password_hash.to_string();
		Ok(())
	}

	async fn migration_stats(&self) -> Result<MigrationStats> {
		let users = self.users.lock().unwrap();
		let total = users.len() as i64;
		let migrated = users.values().filter(|u| u.migrated_to_entra).count() as i64;
		let pending = users
			.values()
			.filter(|u| !u.migrated_to_entra && u.is_active)
			.count() as i64;
		Ok(MigrationStats::from_counts(total, migrated, pending))
	}
}
