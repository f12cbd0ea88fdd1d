// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use idbridge_common_http::{retry, RetryConfig};
use idbridge_server_db::{JobDefinition, JobRepository, JobRun, JobStatus, TriggerSource};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{JobError, Result};
use crate::health::{HealthState, JobHealth, SchedulerHealth};
use crate::job::{Job, JobContext, Schedule};

struct RegisteredJob {
	job: Arc<dyn Job>,
	schedule: Schedule,
	/// Token for the in-flight run. `cancel_job` cancels it and installs a
	/// fresh one so later runs proceed.
	cancel: Arc<Mutex<CancellationToken>>,
}

impl RegisteredJob {
	fn current_token(&self) -> CancellationToken {
		current_token(&self.cancel)
	}
}

fn current_token(slot: &Mutex<CancellationToken>) -> CancellationToken {
	slot.lock()
		.unwrap_or_else(|poisoned| poisoned.into_inner())
		.clone()
}

pub struct JobScheduler {
	jobs: BTreeMap<String, RegisteredJob>,
	repository: JobRepository,
	retry: RetryConfig,
	shutdown_tx: broadcast::Sender<()>,
	handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(repository: JobRepository) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: BTreeMap::new(),
			repository,
			retry: RetryConfig {
				max_attempts: 4,
				base_delay: Duration::from_secs(1),
				max_delay: Duration::from_secs(60),
				backoff_factor: 2.0,
				jitter: false,
			},
			shutdown_tx,
			handles: tokio::sync::Mutex::new(Vec::new()),
		}
	}

	pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		self.register(job, Schedule::Periodic(interval));
	}

	pub fn register_one_shot(&mut self, job: Arc<dyn Job>) {
		self.register(job, Schedule::OneShot);
	}

	fn register(&mut self, job: Arc<dyn Job>, schedule: Schedule) {
		self.jobs.insert(
			job.id().to_string(),
			RegisteredJob {
				job,
				schedule,
				cancel: Arc::new(Mutex::new(CancellationToken::new())),
			},
		);
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	/// Persist job definitions and spawn a timer loop per periodic job.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			self.repository
				.upsert_definition(&JobDefinition {
					id: job_id.clone(),
					name: registered.job.name().to_string(),
					description: registered.job.description().to_string(),
					job_type: registered.schedule.kind().to_string(),
					interval_secs: registered.schedule.interval_secs(),
					enabled: true,
				})
				.await?;

			let Schedule::Periodic(interval) = registered.schedule else {
				continue;
			};

			let job = Arc::clone(&registered.job);
			let cancel = Arc::clone(&registered.cancel);
			let repository = self.repository.clone();
			let retry = self.retry.clone();
			let mut shutdown_rx = self.shutdown_tx.subscribe();

			handles.push(tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							let token = current_token(&cancel);
							let _ = execute(&job, &repository, &retry, TriggerSource::Schedule, token).await;
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job.id(), "periodic job stopped");
							break;
						}
					}
				}
			}));
		}

		info!(
			jobs = self.jobs.len(),
			periodic = handles.len(),
			"job scheduler started"
		);
		Ok(())
	}

	/// Run a job now and return the run id.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		execute(
			&registered.job,
			&self.repository,
			&self.retry,
			triggered_by,
			registered.current_token(),
		)
		.await
	}

	/// Cancel the job's in-flight run, if any. Later runs are unaffected.
	#[instrument(skip(self))]
	pub fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		let mut slot = registered
			.cancel
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let previous = std::mem::replace(&mut *slot, CancellationToken::new());
		previous.cancel();
		Ok(())
	}

	/// Stop the timer loops, cancel in-flight runs and wait for the loops to exit.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
		for registered in self.jobs.values() {
			registered.current_token().cancel();
		}

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}
		info!("job scheduler shut down");
	}

	#[instrument(skip(self))]
	pub async fn job_health(&self, job_id: &str) -> Option<JobHealth> {
		let registered = self.jobs.get(job_id)?;

		let last_run = match self.repository.get_last_run(job_id).await {
			Ok(run) => run,
			Err(e) => {
				warn!(job_id, error = %e, "failed to load last job run");
				None
			}
		};
		let consecutive_failures = self
			.repository
			.count_consecutive_failures(job_id)
			.await
			.unwrap_or(0);

		Some(JobHealth {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			status: HealthState::from_history(last_run.as_ref(), consecutive_failures),
			last_run: last_run.map(Into::into),
			consecutive_failures,
		})
	}

	pub async fn health(&self) -> SchedulerHealth {
		let mut jobs = Vec::with_capacity(self.jobs.len());
		for job_id in self.jobs.keys() {
			if let Some(health) = self.job_health(job_id).await {
				jobs.push(health);
			}
		}

		SchedulerHealth {
			status: jobs
				.iter()
				.map(|job| job.status)
				.max()
				.unwrap_or(HealthState::Healthy),
			jobs,
		}
	}
}

/// One recorded run, retrying retryable failures under the same run id.
async fn execute(
	job: &Arc<dyn Job>,
	repository: &JobRepository,
	retry_config: &RetryConfig,
	triggered_by: TriggerSource,
	cancel: CancellationToken,
) -> Result<String> {
	let run_id = uuid::Uuid::new_v4().to_string();
	repository
		.record_run_start(&JobRun {
			id: run_id.clone(),
			job_id: job.id().to_string(),
			status: JobStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error_message: None,
			retry_count: 0,
			triggered_by,
			metadata: None,
		})
		.await?;

	let attempts = AtomicU32::new(0);
	let result = retry(retry_config, || {
		let attempt = attempts.fetch_add(1, Ordering::SeqCst);
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if attempt > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancel: cancel.clone(),
		};
		async move {
			tokio::select! {
				biased;
				_ = ctx.cancel.cancelled() => Err(JobError::Cancelled),
				result = job.run(&ctx) => result,
			}
		}
	})
	.await;

	match result {
		Ok(output) => {
			repository
				.record_run_complete(&run_id, JobStatus::Succeeded, None, output.metadata)
				.await?;
			info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "job completed");
			Ok(run_id)
		}
		Err(JobError::Cancelled) => {
			repository
				.record_run_complete(&run_id, JobStatus::Cancelled, None, None)
				.await?;
			info!(job_id = %job.id(), run_id = %run_id, "job cancelled");
			Err(JobError::Cancelled)
		}
		Err(e) => {
			let message = e.to_string();
			repository
				.record_run_complete(&run_id, JobStatus::Failed, Some(message.clone()), None)
				.await?;
			warn!(
				job_id = %job.id(),
				run_id = %run_id,
				attempts = attempts.load(Ordering::SeqCst),
				error = %message,
				"job failed"
			);
			Err(e)
		}
	}
}
