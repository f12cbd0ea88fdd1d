// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request body parsing and validation.

use std::time::Duration;

use axum::body::Bytes;
use idbridge_server_config::migration::{
	MAX_BATCH_SIZE, MIN_BATCH_SIZE, MIN_DELAY_BETWEEN_BATCHES_MS,
};
use idbridge_server_config::MigrationConfig;
use idbridge_server_migration::BatchOptions;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::routes::migration::StartMigrationRequest;

/// Parse a JSON body, treating an empty body as `T::default()`.
pub fn parse_json_or_default<T>(body: &Bytes) -> Result<T, ApiError>
where
	T: DeserializeOwned + Default,
{
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(T::default());
	}
	serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// Validate a bulk run request and fill unset fields from configuration.
pub fn batch_options(
	request: &StartMigrationRequest,
	defaults: &MigrationConfig,
) -> Result<BatchOptions, ApiError> {
	if let Some(size) = request.batch_size {
		if !(MIN_BATCH_SIZE as u64..=MAX_BATCH_SIZE as u64).contains(&size) {
			return Err(ApiError::BadRequest(format!(
				"batchSize must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}"
			)));
		}
	}
	if let Some(delay) = request.delay_between_batches {
		if delay < MIN_DELAY_BETWEEN_BATCHES_MS {
			return Err(ApiError::BadRequest(format!(
				"delayBetweenBatches must be at least {MIN_DELAY_BETWEEN_BATCHES_MS}ms"
			)));
		}
	}
	let limit = match request.limit {
		Some(0) => return Err(ApiError::BadRequest("limit must be greater than 0".to_string())),
		Some(limit) => Some(u32::try_from(limit).unwrap_or(u32::MAX)),
		None => None,
	};

	Ok(BatchOptions {
		batch_size: request
			.batch_size
			.map(|size| size as usize)
			.unwrap_or(defaults.batch_size),
		delay_between_batches: Duration::from_millis(
			request
				.delay_between_batches
				.unwrap_or(defaults.delay_between_batches_ms),
		),
		limit,
		send_emails: request.send_emails.unwrap_or(false),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(batch_size: Option<u64>, delay: Option<u64>, limit: Option<u64>) -> StartMigrationRequest {
		StartMigrationRequest {
			batch_size,
			delay_between_batches: delay,
			limit,
			send_emails: None,
		}
	}

	#[test]
	fn unset_fields_use_configured_defaults() {
		let options = batch_options(&request(None, None, None), &MigrationConfig::default()).unwrap();
		assert_eq!(options.batch_size, 50);
		assert_eq!(options.delay_between_batches, Duration::from_millis(2000));
		assert_eq!(options.limit, None);
		assert!(!options.send_emails);
	}

	#[test]
	fn batch_size_bounds_are_inclusive() {
		let defaults = MigrationConfig::default();
		assert!(batch_options(&request(Some(1), None, None), &defaults).is_ok());
		assert!(batch_options(&request(Some(200), None, None), &defaults).is_ok());
		assert!(batch_options(&request(Some(0), None, None), &defaults).is_err());
		assert!(batch_options(&request(Some(201), None, None), &defaults).is_err());
	}

	#[test]
	fn short_delay_and_zero_limit_are_rejected() {
		let defaults = MigrationConfig::default();
		assert!(batch_options(&request(None, Some(999), None), &defaults).is_err());
		assert!(batch_options(&request(None, Some(1000), None), &defaults).is_ok());
		assert!(batch_options(&request(None, None, Some(0)), &defaults).is_err());
		assert_eq!(
			batch_options(&request(None, None, Some(5)), &defaults)
				.unwrap()
				.limit,
			Some(5)
		);
	}

	#[test]
	fn empty_body_parses_as_default() {
		let parsed: StartMigrationRequest = parse_json_or_default(&Bytes::from_static(b"  ")).unwrap();
		assert!(parsed.batch_size.is_none());
		assert!(parse_json_or_default::<StartMigrationRequest>(&Bytes::from_static(b"{nope")).is_err());
	}
}
