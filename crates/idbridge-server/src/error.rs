// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP error type and its JSON rendering.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use idbridge_server_auth::AuthError;
use idbridge_server_db::DbError;
use idbridge_server_jobs::JobError;
use idbridge_server_migration::MigrationError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("{0}")]
	BadRequest(String),

	#[error("{0}")]
	Unauthorized(String),

	#[error("{0}")]
	Forbidden(String),

	#[error("{0}")]
	NotFound(String),

	#[error("{0}")]
	Conflict(String),

	/// A single-user migration that failed for a reason other than a missing user.
	#[error("migration failed: {0}")]
	MigrationFailed(String),

	#[error("database error: {0}")]
	Database(#[from] DbError),

	#[error("{0}")]
	ServiceUnavailable(String),

	#[error("internal error: {0}")]
	Internal(String),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
	pub error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<String>,
}

impl ErrorResponse {
	fn new(error: &str, message: impl Into<String>) -> Self {
		Self {
			error: error.to_string(),
			message: Some(message.into()),
			details: None,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, body) = match self {
			ApiError::BadRequest(message) => (
				StatusCode::BAD_REQUEST,
				ErrorResponse::new("Validation error", message),
			),
			ApiError::Unauthorized(message) => (
				StatusCode::UNAUTHORIZED,
				ErrorResponse::new("Unauthorized", message),
			),
			ApiError::Forbidden(message) => (
				StatusCode::FORBIDDEN,
				ErrorResponse::new("Forbidden", message),
			),
			ApiError::NotFound(message) => (
				StatusCode::NOT_FOUND,
				ErrorResponse::new("Not found", message),
			),
			ApiError::Conflict(message) => (
				StatusCode::CONFLICT,
				ErrorResponse::new("Conflict", message),
			),
			ApiError::MigrationFailed(details) => (
				StatusCode::BAD_REQUEST,
				ErrorResponse {
					error: "Migration failed".to_string(),
					message: None,
					details: Some(details),
				},
			),
			ApiError::Database(e) => {
				tracing::error!(error = %e, "database error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("Internal server error", "A database error occurred"),
				)
			}
			ApiError::ServiceUnavailable(message) => (
				StatusCode::SERVICE_UNAVAILABLE,
				ErrorResponse::new("Service unavailable", message),
			),
			ApiError::Internal(message) => {
				tracing::error!(error = %message, "internal error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("Internal server error", "An internal error occurred"),
				)
			}
		};

		(status, Json(body)).into_response()
	}
}

impl From<AuthError> for ApiError {
	fn from(e: AuthError) -> Self {
		match e {
			AuthError::InvalidCredentials => ApiError::Unauthorized(e.to_string()),
			AuthError::AccountDisabled => ApiError::Forbidden(e.to_string()),
			AuthError::UserNotFound(_) => ApiError::NotFound(e.to_string()),
			AuthError::WeakPassword(message) => ApiError::BadRequest(message),
			AuthError::Store(db) => ApiError::Database(db),
			AuthError::Hash(_) | AuthError::Token(_) | AuthError::Migration(_) => {
				ApiError::Internal(e.to_string())
			}
		}
	}
}

impl From<MigrationError> for ApiError {
	fn from(e: MigrationError) -> Self {
		match e {
			MigrationError::NotFound(id) => ApiError::NotFound(format!("user not found: {id}")),
			MigrationError::RunInProgress(run_id) => {
				ApiError::Conflict(format!("migration run {run_id} is already in progress"))
			}
			MigrationError::InvalidArgument(message) => ApiError::BadRequest(message),
			MigrationError::StoreUnavailable(_) | MigrationError::DatastoreUnavailable(_) => {
				ApiError::ServiceUnavailable(e.to_string())
			}
			other => ApiError::MigrationFailed(other.to_string()),
		}
	}
}

impl From<JobError> for ApiError {
	fn from(e: JobError) -> Self {
		match e {
			JobError::NotFound(id) => ApiError::NotFound(format!("job not found: {id}")),
			JobError::Cancelled => ApiError::Conflict(e.to_string()),
			JobError::History(db) => ApiError::Database(db),
			JobError::Failed { .. } => ApiError::Internal(e.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
		let response = err.into_response();
		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, serde_json::from_slice(&body).unwrap())
	}

	#[tokio::test]
	async fn migration_failure_renders_details() {
		let (status, body) = render(ApiError::from(MigrationError::RemoteConflict(
			"exists".to_string(),
		)))
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "Migration failed");
		assert!(body["details"].as_str().unwrap().contains("exists"));
		assert!(body.get("message").is_none());
	}

	#[tokio::test]
	async fn database_errors_hide_the_cause() {
		let (status, body) = render(ApiError::Database(DbError::Internal(
			"disk I/O error at /var/lib".to_string(),
		)))
		.await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body["message"], "A database error occurred");
	}

	#[test]
	fn auth_errors_map_to_statuses() {
		assert!(matches!(
			ApiError::from(AuthError::InvalidCredentials),
			ApiError::Unauthorized(_)
		));
		assert!(matches!(
			ApiError::from(AuthError::AccountDisabled),
			ApiError::Forbidden(_)
		));
		assert!(matches!(
			ApiError::from(MigrationError::NotFound("u1".to_string())),
			ApiError::NotFound(_)
		));
	}
}
