// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use idbridge_server_db::TriggerSource;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

#[async_trait]
pub trait Job: Send + Sync {
	fn id(&self) -> &str;
	fn name(&self) -> &str;
	fn description(&self) -> &str;
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError>;
}

pub struct JobContext {
	pub run_id: String,
	pub triggered_by: TriggerSource,
	/// Cancelled by `JobScheduler::cancel_job` or scheduler shutdown.
	pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutput {
	pub message: String,
	pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
	Periodic(Duration),
	/// Runs only when triggered.
	OneShot,
}

impl Schedule {
	pub fn kind(&self) -> &'static str {
		match self {
			Schedule::Periodic(_) => "periodic",
			Schedule::OneShot => "one_shot",
		}
	}

	pub fn interval_secs(&self) -> Option<i64> {
		match self {
			Schedule::Periodic(interval) => Some(interval.as_secs() as i64),
			Schedule::OneShot => None,
		}
	}
}
