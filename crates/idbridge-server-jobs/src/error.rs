// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use idbridge_common_http::RetryableError;
use idbridge_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("job failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("job cancelled")]
	Cancelled,

	#[error("job history unavailable: {0}")]
	History(#[from] DbError),

	#[error("job not found: {0}")]
	NotFound(String),
}

impl JobError {
	pub fn failed(message: impl Into<String>, retryable: bool) -> Self {
		Self::Failed {
			message: message.into(),
			retryable,
		}
	}
}

impl RetryableError for JobError {
	fn is_retryable(&self) -> bool {
		matches!(
			self,
			JobError::Failed {
				retryable: true,
				..
			}
		)
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
