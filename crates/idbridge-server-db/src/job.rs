// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job definitions and run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Running => "running",
			JobStatus::Succeeded => "succeeded",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"running" => Ok(JobStatus::Running),
			"succeeded" => Ok(JobStatus::Succeeded),
			"failed" => Ok(JobStatus::Failed),
			"cancelled" => Ok(JobStatus::Cancelled),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
	Schedule,
	Manual,
	Retry,
}

impl TriggerSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerSource::Schedule => "schedule",
			TriggerSource::Manual => "manual",
			TriggerSource::Retry => "retry",
		}
	}
}

impl std::str::FromStr for TriggerSource {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"schedule" => Ok(TriggerSource::Schedule),
			"manual" => Ok(TriggerSource::Manual),
			"retry" => Ok(TriggerSource::Retry),
			_ => Err(format!("unknown trigger source: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
	pub id: String,
	pub name: String,
	pub description: String,
	pub job_type: String,
	pub interval_secs: Option<i64>,
	pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
	pub id: String,
	pub job_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<i64>,
	pub error_message: Option<String>,
	pub retry_count: u32,
	pub triggered_by: TriggerSource,
	pub metadata: Option<serde_json::Value>,
}

const RUN_COLUMNS: &str = "id, job_id, status, started_at, completed_at, duration_ms, \
	error_message, retry_count, triggered_by, metadata";

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, def), fields(job_id = %def.id))]
	pub async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO job_definitions (id, name, description, job_type, interval_secs, enabled, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				name = excluded.name,
				description = excluded.description,
				job_type = excluded.job_type,
				interval_secs = excluded.interval_secs,
				enabled = excluded.enabled,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&def.id)
		.bind(&def.name)
		.bind(&def.description)
		.bind(&def.job_type)
		.bind(def.interval_secs)
		.bind(def.enabled)
		.bind(now)
		.bind(now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, run), fields(run_id = %run.id, job_id = %run.job_id))]
	pub async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_runs (id, job_id, status, started_at, retry_count, triggered_by)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(run.status.as_str())
		.bind(run.started_at)
		.bind(run.retry_count as i64)
		.bind(run.triggered_by.as_str())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, metadata))]
	pub async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET status = ?,
				completed_at = ?,
				duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER),
				error_message = ?,
				metadata = ?
			WHERE id = ?
			"#,
		)
		.bind(status.as_str())
		.bind(now)
		.bind(now)
		.bind(error)
		.bind(metadata.map(|m| m.to_string()))
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("job run {run_id}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		let row = sqlx::query(&format!(
			"SELECT {RUN_COLUMNS} FROM job_runs WHERE job_id = ? ORDER BY started_at DESC LIMIT 1"
		))
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_run_row).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_runs(&self, job_id: &str, limit: u32) -> Result<Vec<JobRun>> {
		let rows = sqlx::query(&format!(
			"SELECT {RUN_COLUMNS} FROM job_runs WHERE job_id = ? ORDER BY started_at DESC LIMIT ?"
		))
		.bind(job_id)
		.bind(limit as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_run_row).collect()
	}

	/// Number of failed runs since the most recent run that did not fail.
	#[tracing::instrument(skip(self))]
	pub async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let row = sqlx::query(
			r#"
			SELECT COUNT(*) AS failures
			FROM job_runs
			WHERE job_id = ?1
				AND status = 'failed'
				AND started_at > COALESCE(
					(SELECT MAX(started_at) FROM job_runs WHERE job_id = ?1 AND status != 'failed'),
					''
				)
			"#,
		)
		.bind(job_id)
		.fetch_one(&self.pool)
		.await?;

		let failures: i64 = row.try_get("failures")?;
		Ok(failures as u32)
	}
}

fn parse_run_row(row: &SqliteRow) -> Result<JobRun> {
	let status: String = row.try_get("status")?;
	let triggered_by: String = row.try_get("triggered_by")?;
	let metadata: Option<String> = row.try_get("metadata")?;
	let retry_count: i64 = row.try_get("retry_count")?;

	Ok(JobRun {
		id: row.try_get("id")?,
		job_id: row.try_get("job_id")?,
		status: status.parse().map_err(DbError::Internal)?,
		started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
		completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
		duration_ms: row.try_get("duration_ms")?,
		error_message: row.try_get("error_message")?,
		retry_count: retry_count as u32,
		triggered_by: triggered_by.parse().map_err(DbError::Internal)?,
		metadata: metadata
			.as_deref()
			.map(serde_json::from_str)
			.transpose()?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_test_pool;

	fn definition() -> JobDefinition {
		JobDefinition {
			id: "migration-reconciliation".to_string(),
			name: "Migration reconciliation".to_string(),
			description: "Closes remote-created, locally-unmarked gaps".to_string(),
			job_type: "periodic".to_string(),
			interval_secs: Some(3600),
			enabled: true,
		}
	}

	fn running(id: &str) -> JobRun {
		JobRun {
			id: id.to_string(),
			job_id: "migration-reconciliation".to_string(),
			status: JobStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error_message: None,
			retry_count: 0,
			triggered_by: TriggerSource::Schedule,
			metadata: None,
		}
	}

	#[tokio::test]
	async fn run_lifecycle_is_recorded() {
		let repo = JobRepository::new(create_migrated_test_pool().await);
		repo.upsert_definition(&definition()).await.unwrap();
		repo.record_run_start(&running("run-1")).await.unwrap();
		repo.record_run_complete(
			"run-1",
			JobStatus::Succeeded,
			None,
			Some(serde_json::json!({"checked": 3, "reconciled": 1})),
		)
		.await
		.unwrap();

		let last = repo
			.get_last_run("migration-reconciliation")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(last.status, JobStatus::Succeeded);
		assert!(last.completed_at.is_some());
		assert_eq!(last.metadata.unwrap()["reconciled"], 1);
	}

	#[tokio::test]
	async fn completing_unknown_run_is_not_found() {
		let repo = JobRepository::new(create_migrated_test_pool().await);
		let err = repo
			.record_run_complete("missing", JobStatus::Failed, None, None)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn consecutive_failures_reset_after_success() {
		let repo = JobRepository::new(create_migrated_test_pool().await);
		repo.upsert_definition(&definition()).await.unwrap();
		assert_eq!(
			repo.count_consecutive_failures("migration-reconciliation")
				.await
				.unwrap(),
			0
		);

		let base = Utc::now();
		let outcomes = [
			JobStatus::Failed,
			JobStatus::Succeeded,
			JobStatus::Failed,
			JobStatus::Failed,
		];
		for (i, status) in outcomes.into_iter().enumerate() {
			let id = format!("run-{i}");
			let mut run = running(&id);
			run.started_at = base + chrono::Duration::seconds(i as i64);
			repo.record_run_start(&run).await.unwrap();
			repo.record_run_complete(&id, status, None, None)
				.await
				.unwrap();
		}

		assert_eq!(
			repo.count_consecutive_failures("migration-reconciliation")
				.await
				.unwrap(),
			2
		);
	}

	#[test]
	fn status_round_trips_through_str() {
		for status in [
			JobStatus::Running,
			JobStatus::Succeeded,
			JobStatus::Failed,
			JobStatus::Cancelled,
		] {
			assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
		}
		assert!("paused".parse::<JobStatus>().is_err());
	}
}
