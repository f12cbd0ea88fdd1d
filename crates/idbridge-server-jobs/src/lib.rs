// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background jobs for the identity bridge.
//!
//! [`JobScheduler`] runs periodic jobs on a timer and any registered job on
//! demand, retrying retryable failures and recording every run through
//! [`JobRepository`](idbridge_server_db::JobRepository).

pub mod error;
pub mod health;
pub mod job;
pub mod reconciliation;
pub mod scheduler;

pub use error::{JobError, Result};
pub use health::{HealthState, JobHealth, LastRun, SchedulerHealth};
pub use job::{Job, JobContext, JobOutput, Schedule};
pub use reconciliation::{ReconciliationJob, RECONCILIATION_JOB_ID};
pub use scheduler::JobScheduler;

pub use idbridge_server_db::{JobRun, JobStatus, TriggerSource};
