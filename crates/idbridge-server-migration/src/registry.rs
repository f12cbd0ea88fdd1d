// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracks the one bulk migration run allowed at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::{MigrationError, Result};
use crate::outcome::MigrationOutcome;

/// Live counters for a running batch.
#[derive(Debug, Default)]
pub struct RunProgress {
	total_candidates: AtomicUsize,
	processed: AtomicUsize,
	successful: AtomicUsize,
	failed: AtomicUsize,
	skipped: AtomicUsize,
}

impl RunProgress {
	pub fn set_total_candidates(&self, total: usize) {
		self.total_candidates.store(total, Ordering::Relaxed);
	}

	pub fn record(&self, outcome: &MigrationOutcome) {
		let counter = match outcome {
			MigrationOutcome::Migrated { .. } => &self.successful,
			MigrationOutcome::Skipped { .. } => &self.skipped,
			MigrationOutcome::Failed { .. } => &self.failed,
		};
		counter.fetch_add(1, Ordering::Relaxed);
		self.processed.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
	pub run_id: Uuid,
	pub started_at: DateTime<Utc>,
	pub total_candidates: usize,
	pub processed: usize,
	pub successful: usize,
	pub failed: usize,
	pub skipped: usize,
	pub cancel_requested: bool,
}

struct ActiveRun {
	id: Uuid,
	started_at: DateTime<Utc>,
	progress: Arc<RunProgress>,
	cancel: CancellationToken,
}

impl ActiveRun {
	fn snapshot(&self) -> RunSnapshot {
		let p = &self.progress;
		RunSnapshot {
			run_id: self.id,
			started_at: self.started_at,
			total_candidates: p.total_candidates.load(Ordering::Relaxed),
			processed: p.processed.load(Ordering::Relaxed),
			successful: p.successful.load(Ordering::Relaxed),
			failed: p.failed.load(Ordering::Relaxed),
			skipped: p.skipped.load(Ordering::Relaxed),
			cancel_requested: self.cancel.is_cancelled(),
		}
	}
}

#[derive(Default)]
pub struct MigrationRunRegistry {
	active: Mutex<Option<ActiveRun>>,
}

/// Registration of the active run; releases the slot when dropped.
pub struct RunHandle {
	registry: Arc<MigrationRunRegistry>,
	id: Uuid,
	progress: Arc<RunProgress>,
	cancel: CancellationToken,
}

impl RunHandle {
	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn progress(&self) -> &RunProgress {
		&self.progress
	}

	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}
}

impl Drop for RunHandle {
	fn drop(&mut self) {
		let mut active = self
			.registry
			.active
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		if active.as_ref().is_some_and(|run| run.id == self.id) {
			*active = None;
		}
	}
}

impl MigrationRunRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Claim the run slot, failing with `RunInProgress` if it is taken.
	pub fn begin(self: &Arc<Self>) -> Result<RunHandle> {
		let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(run) = active.as_ref() {
			return Err(MigrationError::RunInProgress(run.id));
		}

		let run = ActiveRun {
			id: Uuid::new_v4(),
			started_at: Utc::now(),
			progress: Arc::new(RunProgress::default()),
			cancel: CancellationToken::new(),
		};
		let handle = RunHandle {
			registry: Arc::clone(self),
			id: run.id,
			progress: Arc::clone(&run.progress),
			cancel: run.cancel.clone(),
		};
		info!(run_id = %run.id, "migration run registered");
		*active = Some(run);
		Ok(handle)
	}

	/// Request cancellation of the active run. Returns false if none is active.
	pub fn cancel_active(&self) -> bool {
		let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
		match active.as_ref() {
			Some(run) => {
				info!(run_id = %run.id, "migration run cancellation requested");
				run.cancel.cancel();
				true
			}
			None => false,
		}
	}

	pub fn snapshot(&self) -> Option<RunSnapshot> {
		self.active
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.map(ActiveRun::snapshot)
	}
}
