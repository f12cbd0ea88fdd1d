// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Temporary-password notifications.
//!
//! Migrations hand notices to a bounded queue and move on. A single worker
//! drains the queue and retries each send with backoff. Nothing here can
//! fail a migration.

use std::sync::Arc;

use async_trait::async_trait;
use idbridge_common_http::{retry, RetryConfig, RetryableError};
use idbridge_common_secret::SecretString;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
	#[error("transient notification failure: {0}")]
	Transient(String),

	#[error("notification rejected: {0}")]
	Permanent(String),
}

impl RetryableError for NotificationError {
	fn is_retryable(&self) -> bool {
		matches!(self, NotificationError::Transient(_))
	}
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
	async fn send_temporary_password_email(
		&self,
		email: &str,
		username: &str,
		password: &SecretString,
	) -> Result<(), NotificationError>;
}

#[derive(Debug)]
pub struct TemporaryPasswordNotice {
	pub email: String,
	pub username: String,
	pub password: SecretString,
}

#[derive(Clone)]
pub struct NotificationQueue {
	tx: mpsc::Sender<TemporaryPasswordNotice>,
}

impl NotificationQueue {
	/// Spawn the worker. It stops once every queue handle is dropped and the
	/// backlog is drained.
	pub fn start(
		sender: Arc<dyn NotificationSender>,
		capacity: usize,
		retry_config: RetryConfig,
	) -> (Self, JoinHandle<()>) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		let worker = tokio::spawn(run_worker(sender, rx, retry_config));
		(Self { tx }, worker)
	}

	/// Hand off a notice without waiting. Returns false if it was dropped.
	pub fn enqueue(&self, notice: TemporaryPasswordNotice) -> bool {
		match self.tx.try_send(notice) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(notice)) => {
				warn!(email = %notice.email, "notification queue full, dropping notice");
				false
			}
			Err(mpsc::error::TrySendError::Closed(notice)) => {
				warn!(email = %notice.email, "notification worker stopped, dropping notice");
				false
			}
		}
	}
}

async fn run_worker(
	sender: Arc<dyn NotificationSender>,
	mut rx: mpsc::Receiver<TemporaryPasswordNotice>,
	retry_config: RetryConfig,
) {
	while let Some(notice) = rx.recv().await {
		let result = retry(&retry_config, || {
			sender.send_temporary_password_email(&notice.email, &notice.username, &notice.password)
		})
		.await;

		match result {
			Ok(()) => debug!(email = %notice.email, "temporary password notice sent"),
			Err(e) => warn!(email = %notice.email, error = %e, "temporary password notice failed"),
		}
	}
	debug!("notification worker stopped");
}
