// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use idbridge_common_secret::SecretString;
use idbridge_server_db::LegacyUser;

use crate::decision::SkipReason;
use crate::error::MigrationError;

/// Result of one migration attempt. Never persisted.
#[derive(Debug)]
pub enum MigrationOutcome {
	Migrated {
		user_id: String,
		email: String,
		entra_user_id: String,
		/// Generated for bulk migration; `None` when the user's own password was used.
		temporary_password: Option<SecretString>,
		/// A notice carrying the temporary password was handed to the mail queue.
		notified: bool,
	},
	Skipped {
		user_id: String,
		email: Option<String>,
		reason: SkipReason,
	},
	Failed {
		user_id: String,
		email: Option<String>,
		error: MigrationError,
	},
}

impl MigrationOutcome {
	pub fn skipped(user: &LegacyUser, reason: SkipReason) -> Self {
		MigrationOutcome::Skipped {
			user_id: user.id.clone(),
			email: Some(user.email.clone()),
			reason,
		}
	}

	pub fn failed(user: &LegacyUser, error: MigrationError) -> Self {
		MigrationOutcome::Failed {
			user_id: user.id.clone(),
			email: Some(user.email.clone()),
			error,
		}
	}

	pub fn user_id(&self) -> &str {
		match self {
			MigrationOutcome::Migrated { user_id, .. }
			| MigrationOutcome::Skipped { user_id, .. }
			| MigrationOutcome::Failed { user_id, .. } => user_id,
		}
	}

	pub fn email(&self) -> Option<&str> {
		match self {
			MigrationOutcome::Migrated { email, .. } => Some(email),
			MigrationOutcome::Skipped { email, .. } | MigrationOutcome::Failed { email, .. } => {
				email.as_deref()
			}
		}
	}

	pub fn is_migrated(&self) -> bool {
		matches!(self, MigrationOutcome::Migrated { .. })
	}
}

/// Aggregate over one bulk run. Counters are only changed through [`BatchResult::record`].
#[derive(Debug, Default)]
pub struct BatchResult {
	total_processed: usize,
	successful: usize,
	failed: usize,
	skipped: usize,
	pub cancelled: bool,
	outcomes: Vec<MigrationOutcome>,
}

impl BatchResult {
	pub fn record(&mut self, outcome: MigrationOutcome) {
		match outcome {
			MigrationOutcome::Migrated { .. } => self.successful += 1,
			MigrationOutcome::Skipped { .. } => self.skipped += 1,
			MigrationOutcome::Failed { .. } => self.failed += 1,
		}
		self.total_processed += 1;
		self.outcomes.push(outcome);
	}

	pub fn total_processed(&self) -> usize {
		self.total_processed
	}

	pub fn successful(&self) -> usize {
		self.successful
	}

	pub fn failed(&self) -> usize {
		self.failed
	}

	pub fn skipped(&self) -> usize {
		self.skipped
	}

	/// Outcomes in candidate order.
	pub fn outcomes(&self) -> &[MigrationOutcome] {
		&self.outcomes
	}

	pub fn into_outcomes(self) -> Vec<MigrationOutcome> {
		self.outcomes
	}
}
