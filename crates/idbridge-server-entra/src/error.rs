// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use idbridge_common_http::RetryableError;
use reqwest::StatusCode;
use serde::Deserialize;

/// Failures talking to the identity provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
	/// Network failure, timeout, throttling or a 5xx. Safe to retry.
	#[error("identity provider unavailable: {message}")]
	Unavailable {
		message: String,
		retry_after: Option<Duration>,
	},

	/// The identity already exists (duplicate sign-in name or UPN).
	#[error("identity conflict: {0}")]
	Conflict(String),

	/// The provider rejected the request payload, e.g. password policy.
	#[error("identity validation failed: {0}")]
	Validation(String),

	#[error("identity not found: {0}")]
	NotFound(String),

	/// Token acquisition failed or the app lacks permission.
	#[error("identity provider authorization failed: {0}")]
	Auth(String),
}

impl IdentityError {
	pub fn unavailable(message: impl Into<String>) -> Self {
		IdentityError::Unavailable {
			message: message.into(),
			retry_after: None,
		}
	}

	/// Classify a non-success Graph response.
	pub fn from_response(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
		let detail = GraphErrorEnvelope::parse(body);
		let message = detail
			.as_ref()
			.map(|e| format!("{}: {}", e.code, e.message))
			.unwrap_or_else(|| format!("HTTP {status}"));

		let looks_like_conflict = detail.as_ref().is_some_and(|e| {
			e.code == "ObjectConflict" || e.message.contains("already exists")
		});

		match status {
			StatusCode::CONFLICT => IdentityError::Conflict(message),
			StatusCode::BAD_REQUEST if looks_like_conflict => IdentityError::Conflict(message),
			StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
				IdentityError::Validation(message)
			}
			StatusCode::NOT_FOUND => IdentityError::NotFound(message),
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IdentityError::Auth(message),
			s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
				IdentityError::Unavailable {
					message,
					retry_after,
				}
			}
			StatusCode::REQUEST_TIMEOUT => IdentityError::Unavailable {
				message,
				retry_after,
			},
			_ => IdentityError::Validation(message),
		}
	}
}

impl From<reqwest::Error> for IdentityError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_decode() {
			return IdentityError::unavailable(format!("malformed response: {e}"));
		}
		IdentityError::unavailable(e.to_string())
	}
}

impl RetryableError for IdentityError {
	fn is_retryable(&self) -> bool {
		matches!(self, IdentityError::Unavailable { .. })
	}

	fn retry_after(&self) -> Option<Duration> {
		match self {
			IdentityError::Unavailable { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
	error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
	#[serde(default)]
	code: String,
	#[serde(default)]
	message: String,
}

impl GraphErrorEnvelope {
	fn parse(body: &str) -> Option<GraphErrorDetail> {
		serde_json::from_str::<GraphErrorEnvelope>(body)
			.ok()
			.map(|e| e.error)
	}
}
