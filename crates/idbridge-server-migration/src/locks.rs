// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutex per user id, so the bulk run and a login never migrate the
/// same user at the same time within this process.
#[derive(Default)]
pub struct PerUserLocks {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[must_use = "the user lock is released when the guard is dropped"]
pub struct UserLockGuard {
	_guard: OwnedMutexGuard<()>,
}

impl PerUserLocks {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn lock(&self, user_id: &str) -> UserLockGuard {
		let lock = {
			let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
			// Entries only referenced by the map are idle.
			locks.retain(|_, lock| Arc::strong_count(lock) > 1);
			Arc::clone(locks.entry(user_id.to_string()).or_default())
		};
		UserLockGuard {
			_guard: lock.lock_owned().await,
		}
	}

	/// Number of users currently locked or awaited.
	pub fn active(&self) -> usize {
		self.locks
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.filter(|lock| Arc::strong_count(lock) > 1)
			.count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test(start_paused = true)]
	async fn same_user_is_serialized() {
		let locks = Arc::new(PerUserLocks::new());
		let guard = locks.lock("u1").await;

		let waiter = {
			let locks = Arc::clone(&locks);
			tokio::spawn(async move {
				let _guard = locks.lock("u1").await;
			})
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!waiter.is_finished());

		drop(guard);
		waiter.await.unwrap();
		assert_eq!(locks.active(), 0);
	}

	#[tokio::test]
	async fn different_users_do_not_block() {
		let locks = PerUserLocks::new();
		let _a = locks.lock("a").await;
		let _b = locks.lock("b").await;
		assert_eq!(locks.active(), 2);
	}
}
