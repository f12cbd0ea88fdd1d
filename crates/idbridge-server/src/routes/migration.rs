// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin endpoints for bulk and single-user migration.
//!
//! Runs are executed on spawned tasks so a dropped client connection cannot
//! interrupt a migration between the remote create and the local mark.

use axum::{
	body::Bytes,
	extract::{Path, State},
	Json,
};
use chrono::{DateTime, Utc};
use idbridge_server_db::MigrationStats;
use idbridge_server_migration::{
	BatchResult, CancellationToken, MigrateOptions, MigrationOutcome, RunSnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{ApiError, ErrorResponse};
use crate::validation::{batch_options, parse_json_or_default};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartMigrationRequest {
	pub batch_size: Option<u64>,
	/// Milliseconds.
	pub delay_between_batches: Option<u64>,
	pub limit: Option<u64>,
	pub send_emails: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateUserRequest {
	pub send_email: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
	Migrated,
	Skipped,
	Failed,
}

/// One user's migration result.
///
/// The temporary password is included only when no notice carrying it was
/// queued, since this response is then the only place it can be read.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeView {
	pub user_id: String,
	pub email: Option<String>,
	pub status: OutcomeStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entra_user_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temporary_password: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl From<&MigrationOutcome> for OutcomeView {
	fn from(outcome: &MigrationOutcome) -> Self {
		let mut view = OutcomeView {
			user_id: outcome.user_id().to_string(),
			email: outcome.email().map(str::to_string),
			status: OutcomeStatus::Migrated,
			entra_user_id: None,
			temporary_password: None,
			reason: None,
			error: None,
		};
		match outcome {
			MigrationOutcome::Migrated {
				entra_user_id,
				temporary_password,
				notified,
				..
			} => {
				view.entra_user_id = Some(entra_user_id.clone());
				if !notified {
					view.temporary_password = temporary_password
						.as_ref()
						.map(|password| password.expose().clone());
				}
			}
			MigrationOutcome::Skipped { reason, .. } => {
				view.status = OutcomeStatus::Skipped;
				view.reason = Some(reason.to_string());
			}
			MigrationOutcome::Failed { error, .. } => {
				view.status = OutcomeStatus::Failed;
				view.error = Some(error.to_string());
			}
		}
		view
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
	pub total_processed: usize,
	pub successful: usize,
	pub failed: usize,
	pub skipped: usize,
	pub cancelled: bool,
}

impl From<&BatchResult> for BatchSummary {
	fn from(result: &BatchResult) -> Self {
		Self {
			total_processed: result.total_processed(),
			successful: result.successful(),
			failed: result.failed(),
			skipped: result.skipped(),
			cancelled: result.cancelled,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartMigrationResponse {
	pub message: String,
	pub summary: BatchSummary,
	pub results: Vec<OutcomeView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MigrateUserResponse {
	pub message: String,
	pub result: OutcomeView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatusResponse {
	pub status: String,
	pub timestamp: DateTime<Utc>,
	pub stats: MigrationStats,
	#[schema(value_type = Option<Object>)]
	pub active_run: Option<RunSnapshot>,
	pub inconsistent_state_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
	pub cancelled: bool,
}

#[utoipa::path(
	get,
	path = "/api/migration/status",
	responses(
		(status = 200, description = "Service status and migration statistics", body = MigrationStatusResponse),
		(status = 401, description = "Missing or invalid admin API key", body = ErrorResponse)
	),
	tag = "migration"
)]
pub async fn status(State(state): State<AppState>) -> Result<Json<MigrationStatusResponse>, ApiError> {
	let stats = state.users.migration_stats().await?;
	Ok(Json(MigrationStatusResponse {
		status: "operational".to_string(),
		timestamp: Utc::now(),
		stats,
		active_run: state.runs.snapshot(),
		inconsistent_state_count: state.migrator.metrics().inconsistent_state_count(),
	}))
}

#[utoipa::path(
	get,
	path = "/api/migration/progress",
	responses(
		(status = 200, description = "Migration progress", body = MigrationStats),
		(status = 401, description = "Missing or invalid admin API key", body = ErrorResponse)
	),
	tag = "migration"
)]
pub async fn progress(State(state): State<AppState>) -> Result<Json<MigrationStats>, ApiError> {
	Ok(Json(state.users.migration_stats().await?))
}

#[utoipa::path(
	post,
	path = "/api/migration/start",
	request_body = StartMigrationRequest,
	responses(
		(status = 200, description = "Run finished or was cancelled", body = StartMigrationResponse),
		(status = 400, description = "Invalid run parameters", body = ErrorResponse),
		(status = 409, description = "Another run is active", body = ErrorResponse)
	),
	tag = "migration"
)]
#[instrument(skip(state, body))]
pub async fn start(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<StartMigrationResponse>, ApiError> {
	let request: StartMigrationRequest = parse_json_or_default(&body)?;
	let options = batch_options(&request, &state.migration)?;

	let run = state.runs.begin()?;
	info!(
		run_id = %run.id(),
		batch_size = options.batch_size,
		limit = ?options.limit,
		send_emails = options.send_emails,
		"bulk migration requested"
	);

	let orchestrator = state.orchestrator.clone();
	let result = tokio::spawn(async move {
		orchestrator
			.run_tracked(&options, run.cancel_token(), Some(run.progress()))
			.await
	})
	.await
	.map_err(|e| ApiError::Internal(format!("migration task failed: {e}")))??;

	let message = if result.cancelled {
		"Bulk migration cancelled"
	} else {
		"Bulk migration completed"
	};
	Ok(Json(StartMigrationResponse {
		message: message.to_string(),
		summary: BatchSummary::from(&result),
		results: result.outcomes().iter().map(OutcomeView::from).collect(),
	}))
}

#[utoipa::path(
	post,
	path = "/api/migration/cancel",
	responses(
		(status = 200, description = "Whether an active run was cancelled", body = CancelResponse)
	),
	tag = "migration"
)]
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
	Json(CancelResponse {
		cancelled: state.runs.cancel_active(),
	})
}

#[utoipa::path(
	post,
	path = "/api/migration/user/{id}",
	params(("id" = String, Path, description = "Legacy user id")),
	request_body = MigrateUserRequest,
	responses(
		(status = 200, description = "User migrated or skipped", body = MigrateUserResponse),
		(status = 400, description = "Migration failed", body = ErrorResponse),
		(status = 404, description = "User not found", body = ErrorResponse)
	),
	tag = "migration"
)]
#[instrument(skip(state, body))]
pub async fn migrate_user(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Bytes,
) -> Result<Json<MigrateUserResponse>, ApiError> {
	let request: MigrateUserRequest = parse_json_or_default(&body)?;
	let options = MigrateOptions {
		send_email: request.send_email.unwrap_or(false),
	};

	let migrator = state.migrator.clone();
	let outcome = tokio::spawn(async move {
		migrator
			.migrate(&id, options, &CancellationToken::new())
			.await
	})
	.await
	.map_err(|e| ApiError::Internal(format!("migration task failed: {e}")))??;

	let message = if outcome.is_migrated() {
		"User migrated successfully"
	} else {
		"User migration skipped"
	};
	Ok(Json(MigrateUserResponse {
		message: message.to_string(),
		result: OutcomeView::from(&outcome),
	}))
}
