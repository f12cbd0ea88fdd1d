// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff for calls against rate-limited services.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(10),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// Status codes that indicate throttling or a transient upstream fault.
	pub fn is_retryable_status(status: StatusCode) -> bool {
		matches!(
			status,
			StatusCode::TOO_MANY_REQUESTS
				| StatusCode::REQUEST_TIMEOUT
				| StatusCode::INTERNAL_SERVER_ERROR
				| StatusCode::BAD_GATEWAY
				| StatusCode::SERVICE_UNAVAILABLE
				| StatusCode::GATEWAY_TIMEOUT
		)
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;

	/// Minimum wait requested by the server, e.g. from `Retry-After`.
	fn retry_after(&self) -> Option<Duration> {
		None
	}
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().is_some_and(RetryConfig::is_retryable_status)
	}
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped = exponential.min(cfg.max_delay.as_secs_f64());

	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};

	Duration::from_secs_f64(delay)
}

/// Run `f` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. A server-provided `retry_after` is honoured
/// as a lower bound on the wait, capped at `max_delay`.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					return Err(err);
				}

				if attempt >= cfg.max_attempts {
					warn!(
						error = ?err,
						attempt,
						max_attempts = cfg.max_attempts,
						"max retry attempts exhausted"
					);
					return Err(err);
				}

				let mut delay = calculate_delay(cfg, attempt - 1);
				if let Some(hint) = err.retry_after() {
					delay = delay.max(hint.min(cfg.max_delay));
				}
				warn!(
					error = ?err,
					attempt,
					max_attempts = cfg.max_attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct MockError {
		retryable: bool,
		retry_after: Option<Duration>,
	}

	impl MockError {
		fn transient() -> Self {
			Self {
				retryable: true,
				retry_after: None,
			}
		}
	}

	impl RetryableError for MockError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}

		fn retry_after(&self) -> Option<Duration> {
			self.retry_after
		}
	}

	fn fast_config(max_attempts: u32) -> RetryConfig {
		RetryConfig {
			max_attempts,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(10),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	#[tokio::test]
	async fn non_retryable_error_fails_immediately() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), MockError> = retry(&fast_config(5), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(MockError {
					retryable: false,
					retry_after: None,
				})
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn retryable_error_stops_at_max_attempts() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<(), MockError> = retry(&fast_config(3), || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(MockError::transient())
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn succeeds_after_transient_failures() {
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let result: Result<&str, MockError> = retry(&fast_config(3), || {
			let counter = Arc::clone(&counter);
			async move {
				if counter.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(MockError::transient())
				} else {
					Ok("created")
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), "created");
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn retry_after_hint_extends_delay() {
		let cfg = RetryConfig {
			max_attempts: 2,
			base_delay: Duration::from_millis(10),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: false,
		};
		let attempts = Arc::new(AtomicU32::new(0));
		let counter = Arc::clone(&attempts);

		let start = tokio::time::Instant::now();
		let _: Result<(), MockError> = retry(&cfg, || {
			let counter = Arc::clone(&counter);
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Err(MockError {
					retryable: true,
					retry_after: Some(Duration::from_secs(2)),
				})
			}
		})
		.await;

		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		assert!(start.elapsed() >= Duration::from_secs(2));
	}

	#[test]
	fn delay_grows_exponentially_and_is_capped() {
		let cfg = RetryConfig {
			max_attempts: 10,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(1000),
			backoff_factor: 2.0,
			jitter: false,
		};
		assert_eq!(calculate_delay(&cfg, 0), Duration::from_millis(100));
		assert_eq!(calculate_delay(&cfg, 1), Duration::from_millis(200));
		assert_eq!(calculate_delay(&cfg, 2), Duration::from_millis(400));
		assert_eq!(calculate_delay(&cfg, 8), Duration::from_millis(1000));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let cfg = RetryConfig {
			jitter: true,
			..fast_config(3)
		};
		for _ in 0..100 {
			let d = calculate_delay(&cfg, 0).as_secs_f64();
			assert!((0.0005..=0.0015).contains(&d));
		}
	}

	#[test]
	fn throttling_statuses_are_retryable() {
		assert!(RetryConfig::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
		assert!(RetryConfig::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
		assert!(!RetryConfig::is_retryable_status(StatusCode::BAD_REQUEST));
		assert!(!RetryConfig::is_retryable_status(StatusCode::CONFLICT));
	}
}
