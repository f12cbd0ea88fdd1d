// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bulk migration over the unmigrated, active users.
//!
//! Candidates are taken oldest first and processed in consecutive chunks.
//! Every user in a chunk is migrated concurrently; the next chunk starts only
//! after the whole chunk has finished and the inter-chunk delay has elapsed.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use idbridge_server_db::{LegacyUser, LocalUserStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::decision::SkipReason;
use crate::error::{MigrationError, Result};
use crate::migrator::{MigrateOptions, SingleUserMigrator};
use crate::outcome::{BatchResult, MigrationOutcome};
use crate::registry::RunProgress;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_DELAY_BETWEEN_BATCHES: Duration = Duration::from_millis(2000);

/// Run parameters. Bounds are validated by the caller.
#[derive(Debug, Clone)]
pub struct BatchOptions {
	pub batch_size: usize,
	pub delay_between_batches: Duration,
	pub limit: Option<u32>,
	pub send_emails: bool,
}

impl Default for BatchOptions {
	fn default() -> Self {
		Self {
			batch_size: DEFAULT_BATCH_SIZE,
			delay_between_batches: DEFAULT_DELAY_BETWEEN_BATCHES,
			limit: None,
			send_emails: false,
		}
	}
}

pub struct BatchMigrationOrchestrator {
	users: Arc<dyn LocalUserStore>,
	migrator: Arc<SingleUserMigrator>,
}

impl BatchMigrationOrchestrator {
	pub fn new(migrator: Arc<SingleUserMigrator>) -> Self {
		Self {
			users: Arc::clone(migrator.users()),
			migrator,
		}
	}

	pub async fn run(&self, options: &BatchOptions, cancel: &CancellationToken) -> Result<BatchResult> {
		self.run_tracked(options, cancel, None).await
	}

	/// Like [`run`](Self::run), also publishing live counters to `progress`.
	///
	/// Only a failed candidate fetch is an error. A cancelled run returns the
	/// outcomes gathered so far with `cancelled` set.
	#[instrument(skip_all, fields(batch_size = options.batch_size, limit = ?options.limit))]
	pub async fn run_tracked(
		&self,
		options: &BatchOptions,
		cancel: &CancellationToken,
		progress: Option<&RunProgress>,
	) -> Result<BatchResult> {
		let candidates = self
			.users
			.list_unmigrated(options.limit, true)
			.await
			.map_err(|e| MigrationError::DatastoreUnavailable(e.to_string()))?;

		if let Some(progress) = progress {
			progress.set_total_candidates(candidates.len());
		}
		let batch_size = options.batch_size.max(1);
		let chunk_count = candidates.len().div_ceil(batch_size);
		info!(
			candidates = candidates.len(),
			chunks = chunk_count,
			delay_ms = options.delay_between_batches.as_millis() as u64,
			"starting bulk migration"
		);

		let mut result = BatchResult::default();
		for (index, chunk) in candidates.chunks(batch_size).enumerate() {
			if index > 0 {
				debug!(next_chunk = index + 1, "waiting between chunks");
				tokio::select! {
					_ = cancel.cancelled() => {}
					_ = tokio::time::sleep(options.delay_between_batches) => {}
				}
			}
			if cancel.is_cancelled() {
				result.cancelled = true;
				break;
			}

			debug!(chunk = index + 1, of = chunk_count, size = chunk.len(), "migrating chunk");
			let outcomes = join_all(
				chunk
					.iter()
					.map(|user| self.migrate_candidate(user, options.send_emails, cancel)),
			)
			.await;

			for outcome in outcomes {
				if matches!(
					outcome,
					MigrationOutcome::Failed {
						error: MigrationError::Cancelled,
						..
					}
				) {
					result.cancelled = true;
				}
				if let Some(progress) = progress {
					progress.record(&outcome);
				}
				result.record(outcome);
			}
		}

		if result.cancelled {
			warn!(processed = result.total_processed(), "bulk migration cancelled");
		}
		info!(
			total_processed = result.total_processed(),
			successful = result.successful(),
			failed = result.failed(),
			skipped = result.skipped(),
			cancelled = result.cancelled,
			"bulk migration finished"
		);
		Ok(result)
	}

	async fn migrate_candidate(
		&self,
		user: &LegacyUser,
		send_email: bool,
		cancel: &CancellationToken,
	) -> MigrationOutcome {
		match self
			.migrator
			.migrate(&user.id, MigrateOptions { send_email }, cancel)
			.await
		{
			Ok(outcome) => outcome,
			Err(MigrationError::NotFound(_)) => {
				MigrationOutcome::skipped(user, SkipReason::UserNotFound)
			}
			Err(e) => {
				warn!(user_id = %user.id, error = %e, "user migration failed");
				MigrationOutcome::failed(user, e)
			}
		}
	}
}
