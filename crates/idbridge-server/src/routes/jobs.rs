// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin endpoints for background jobs.

use std::sync::Arc;

use axum::{
	extract::{Path, State},
	Json,
};
use idbridge_server_jobs::{JobScheduler, SchedulerHealth, TriggerSource};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{ApiError, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJobResponse {
	pub run_id: String,
	pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelJobResponse {
	pub message: String,
}

fn scheduler(state: &AppState) -> Result<&Arc<JobScheduler>, ApiError> {
	state
		.scheduler
		.as_ref()
		.ok_or_else(|| ApiError::ServiceUnavailable("Job scheduler is not running".to_string()))
}

#[utoipa::path(
	get,
	path = "/api/jobs",
	responses(
		(status = 200, description = "Registered jobs and their health"),
		(status = 503, description = "Scheduler not running", body = ErrorResponse)
	),
	tag = "jobs"
)]
pub async fn list(State(state): State<AppState>) -> Result<Json<SchedulerHealth>, ApiError> {
	Ok(Json(scheduler(&state)?.health().await))
}

/// Run a job immediately. The response is sent once the run has finished.
#[utoipa::path(
	post,
	path = "/api/jobs/{id}/run",
	params(("id" = String, Path, description = "Job id")),
	responses(
		(status = 200, description = "Job ran", body = TriggerJobResponse),
		(status = 404, description = "Unknown job", body = ErrorResponse),
		(status = 503, description = "Scheduler not running", body = ErrorResponse)
	),
	tag = "jobs"
)]
pub async fn trigger(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<TriggerJobResponse>, ApiError> {
	let run_id = scheduler(&state)?
		.trigger_job(&id, TriggerSource::Manual)
		.await?;
	info!(job_id = %id, run_id = %run_id, "manually triggered job");
	Ok(Json(TriggerJobResponse {
		run_id,
		message: format!("Job {id} triggered"),
	}))
}

#[utoipa::path(
	post,
	path = "/api/jobs/{id}/cancel",
	params(("id" = String, Path, description = "Job id")),
	responses(
		(status = 200, description = "In-flight run cancelled", body = CancelJobResponse),
		(status = 404, description = "Unknown job", body = ErrorResponse)
	),
	tag = "jobs"
)]
pub async fn cancel(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<CancelJobResponse>, ApiError> {
	scheduler(&state)?.cancel_job(&id)?;
	info!(job_id = %id, "cancelled job run");
	Ok(Json(CancelJobResponse {
		message: format!("Job {id} cancelled"),
	}))
}
