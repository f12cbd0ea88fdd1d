// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bulk and just-in-time migration tuning.

use serde::Deserialize;

use crate::error::ConfigError;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 200;
pub const MIN_DELAY_BETWEEN_BATCHES_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationConfig {
	pub batch_size: usize,
	pub delay_between_batches_ms: u64,
	pub temporary_password_length: usize,
	pub notification_queue_capacity: usize,
	pub notification_max_attempts: u32,
	/// Zero disables the reconciliation sweep.
	pub reconciliation_interval_secs: u64,
}

impl Default for MigrationConfig {
	fn default() -> Self {
		MigrationConfigLayer::default().finalize()
	}
}

impl MigrationConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
			return Err(ConfigError::InvalidValue {
				key: "migration.batch_size".to_string(),
				message: format!("must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}"),
			});
		}
		if self.delay_between_batches_ms < MIN_DELAY_BETWEEN_BATCHES_MS {
			return Err(ConfigError::InvalidValue {
				key: "migration.delay_between_batches_ms".to_string(),
				message: format!("must be at least {MIN_DELAY_BETWEEN_BATCHES_MS}"),
			});
		}
		if self.temporary_password_length < 8 {
			return Err(ConfigError::InvalidValue {
				key: "migration.temporary_password_length".to_string(),
				message: "must be at least 8".to_string(),
			});
		}
		if self.notification_queue_capacity == 0 {
			return Err(ConfigError::InvalidValue {
				key: "migration.notification_queue_capacity".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		if self.notification_max_attempts == 0 {
			return Err(ConfigError::InvalidValue {
				key: "migration.notification_max_attempts".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrationConfigLayer {
	#[serde(default)]
	pub batch_size: Option<usize>,
	#[serde(default)]
	pub delay_between_batches_ms: Option<u64>,
	#[serde(default)]
	pub temporary_password_length: Option<usize>,
	#[serde(default)]
	pub notification_queue_capacity: Option<usize>,
	#[serde(default)]
	pub notification_max_attempts: Option<u32>,
	#[serde(default)]
	pub reconciliation_interval_secs: Option<u64>,
}

impl MigrationConfigLayer {
	pub fn merge(&mut self, other: MigrationConfigLayer) {
		if other.batch_size.is_some() {
			self.batch_size = other.batch_size;
		}
		if other.delay_between_batches_ms.is_some() {
			self.delay_between_batches_ms = other.delay_between_batches_ms;
		}
		if other.temporary_password_length.is_some() {
			self.temporary_password_length = other.temporary_password_length;
		}
		if other.notification_queue_capacity.is_some() {
			self.notification_queue_capacity = other.notification_queue_capacity;
		}
		if other.notification_max_attempts.is_some() {
			self.notification_max_attempts = other.notification_max_attempts;
		}
		if other.reconciliation_interval_secs.is_some() {
			self.reconciliation_interval_secs = other.reconciliation_interval_secs;
		}
	}

	pub fn finalize(self) -> MigrationConfig {
		MigrationConfig {
			batch_size: self.batch_size.unwrap_or(50),
			delay_between_batches_ms: self.delay_between_batches_ms.unwrap_or(2000),
			temporary_password_length: self.temporary_password_length.unwrap_or(16),
			notification_queue_capacity: self.notification_queue_capacity.unwrap_or(256),
			notification_max_attempts: self.notification_max_attempts.unwrap_or(3),
			reconciliation_interval_secs: self.reconciliation_interval_secs.unwrap_or(3600),
		}
	}
}
