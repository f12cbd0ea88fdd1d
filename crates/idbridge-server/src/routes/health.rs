// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tokio::time::Instant;

use crate::api::AppState;
use crate::health::{self, HealthResponse, HealthStatus};

#[utoipa::path(
	get,
	path = "/health",
	responses(
		(status = 200, description = "Service is up, possibly degraded", body = HealthResponse),
		(status = 503, description = "Database unavailable", body = HealthResponse)
	),
	tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let started = Instant::now();

	let (database, identity_provider, jobs, smtp) = tokio::join!(
		health::check_database(&state.pool),
		health::check_identity_provider(state.identity.as_ref(), state.identity_enabled),
		health::check_jobs(state.scheduler.as_ref()),
		health::check_smtp(state.smtp.as_ref()),
	);

	let mut others = vec![identity_provider.status, smtp.status];
	if let Some(jobs) = &jobs {
		others.push(jobs.status);
	}
	let status = health::aggregate_status(&database, others);

	let response = HealthResponse {
		status,
		timestamp: chrono::Utc::now().to_rfc3339(),
		duration_ms: started.elapsed().as_millis() as u64,
		version: env!("CARGO_PKG_VERSION").to_string(),
		database,
		identity_provider,
		jobs,
		smtp,
	};

	let http_status = match status {
		HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
		_ => StatusCode::OK,
	};
	(http_status, Json(response))
}
