// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Component health checks for `GET /health`.
//!
//! Only the database decides whether the service is up. Identity provider,
//! job and SMTP problems degrade the report without failing it, since logins
//! against the legacy store keep working without them.

use std::sync::Arc;
use std::time::Duration;

use idbridge_server_entra::IdentityStore;
use idbridge_server_jobs::{HealthState, JobScheduler};
use idbridge_server_smtp::SmtpClient;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::time::{timeout, Instant};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Unhealthy,
	/// Component not configured for this deployment.
	Disabled,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentHealth {
	pub status: HealthStatus,
	pub latency_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ComponentHealth {
	fn disabled() -> Self {
		Self {
			status: HealthStatus::Disabled,
			latency_ms: 0,
			error: None,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobsHealth {
	pub status: HealthStatus,
	pub jobs_total: usize,
	pub jobs_healthy: usize,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub failing_jobs: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
	pub status: HealthStatus,
	pub timestamp: String,
	pub duration_ms: u64,
	pub version: String,
	pub database: ComponentHealth,
	pub identity_provider: ComponentHealth,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jobs: Option<JobsHealth>,
	pub smtp: ComponentHealth,
}

const DB_CHECK_TIMEOUT: Duration = Duration::from_millis(500);
const IDENTITY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const SMTP_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

async fn timed<F, E>(limit: Duration, what: &str, check: F) -> ComponentHealth
where
	F: std::future::Future<Output = Result<(), E>>,
	E: std::fmt::Display,
{
	let start = Instant::now();
	let result = timeout(limit, check).await;
	let latency_ms = start.elapsed().as_millis() as u64;

	let (status, error) = match result {
		Ok(Ok(())) => (HealthStatus::Healthy, None),
		Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
		Err(_) => (
			HealthStatus::Unhealthy,
			Some(format!("{what} health check timed out")),
		),
	};
	ComponentHealth {
		status,
		latency_ms,
		error,
	}
}

pub async fn check_database(pool: &SqlitePool) -> ComponentHealth {
	timed(
		DB_CHECK_TIMEOUT,
		"database",
		idbridge_server_db::health_check(pool),
	)
	.await
}

pub async fn check_identity_provider(identity: &dyn IdentityStore, enabled: bool) -> ComponentHealth {
	if !enabled {
		return ComponentHealth::disabled();
	}
	timed(IDENTITY_CHECK_TIMEOUT, "identity provider", identity.health()).await
}

pub async fn check_smtp(client: Option<&Arc<SmtpClient>>) -> ComponentHealth {
	match client {
		Some(client) => timed(SMTP_CHECK_TIMEOUT, "SMTP", client.check_health()).await,
		None => ComponentHealth::disabled(),
	}
}

pub async fn check_jobs(scheduler: Option<&Arc<JobScheduler>>) -> Option<JobsHealth> {
	let health = scheduler?.health().await;

	let failing_jobs = health
		.jobs
		.iter()
		.filter(|job| job.status == HealthState::Unhealthy)
		.map(|job| job.job_id.clone())
		.collect();
	let status = match health.status {
		HealthState::Healthy => HealthStatus::Healthy,
		HealthState::Degraded => HealthStatus::Degraded,
		HealthState::Unhealthy => HealthStatus::Unhealthy,
	};

	Some(JobsHealth {
		status,
		jobs_total: health.jobs.len(),
		jobs_healthy: health
			.jobs
			.iter()
			.filter(|job| job.status == HealthState::Healthy)
			.count(),
		failing_jobs,
	})
}

/// Database failure is fatal; any other non-healthy component degrades.
pub fn aggregate_status(
	database: &ComponentHealth,
	others: impl IntoIterator<Item = HealthStatus>,
) -> HealthStatus {
	if database.status == HealthStatus::Unhealthy {
		return HealthStatus::Unhealthy;
	}
	let degraded = others
		.into_iter()
		.any(|status| matches!(status, HealthStatus::Unhealthy | HealthStatus::Degraded));
	if degraded {
		HealthStatus::Degraded
	} else {
		HealthStatus::Healthy
	}
}
