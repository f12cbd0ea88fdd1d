// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use idbridge_server_db::{JobRun, JobStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

impl HealthState {
	/// Unhealthy after three failed runs in a row, degraded after one.
	pub fn from_history(last_run: Option<&JobRun>, consecutive_failures: u32) -> Self {
		match last_run.map(|run| run.status) {
			Some(JobStatus::Failed) if consecutive_failures >= 3 => HealthState::Unhealthy,
			Some(JobStatus::Failed) if consecutive_failures >= 1 => HealthState::Degraded,
			_ => HealthState::Healthy,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
	pub run_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
	pub metadata: Option<serde_json::Value>,
}

impl From<JobRun> for LastRun {
	fn from(run: JobRun) -> Self {
		Self {
			run_id: run.id,
			status: run.status,
			started_at: run.started_at,
			duration_ms: run.duration_ms,
			error: run.error_message,
			metadata: run.metadata,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHealth {
	pub job_id: String,
	pub name: String,
	pub status: HealthState,
	pub last_run: Option<LastRun>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
	/// Worst state across all jobs.
	pub status: HealthState,
	pub jobs: Vec<JobHealth>,
}
