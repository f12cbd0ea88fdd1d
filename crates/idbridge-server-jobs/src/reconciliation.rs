// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic sweep that marks local users whose remote identity already exists.
//!
//! A migration that created the remote identity but failed to mark the local
//! record leaves the user looking unmigrated. Bulk runs would then skip the
//! user forever as "already exists remotely". This job closes that gap.

use std::sync::Arc;

use async_trait::async_trait;
use idbridge_server_migration::{MigrationError, SingleUserMigrator};
use tracing::{info, warn};

use crate::error::JobError;
use crate::job::{Job, JobContext, JobOutput};

pub const RECONCILIATION_JOB_ID: &str = "migration-reconciliation";

pub struct ReconciliationJob {
	migrator: Arc<SingleUserMigrator>,
}

impl ReconciliationJob {
	pub fn new(migrator: Arc<SingleUserMigrator>) -> Self {
		Self { migrator }
	}
}

#[async_trait]
impl Job for ReconciliationJob {
	fn id(&self) -> &str {
		RECONCILIATION_JOB_ID
	}

	fn name(&self) -> &str {
		"Migration reconciliation"
	}

	fn description(&self) -> &str {
		"Marks unmigrated legacy users that already have a remote identity"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		let candidates = self
			.migrator
			.users()
			.list_unmigrated(None, false)
			.await
			.map_err(|e| JobError::failed(e.to_string(), e.is_unavailable()))?;

		let mut checked = 0u64;
		let mut reconciled = 0u64;
		let mut errors = 0u64;
		for user in &candidates {
			if ctx.cancel.is_cancelled() {
				return Err(JobError::Cancelled);
			}

			checked += 1;
			match self.migrator.reconcile(&user.id).await {
				Ok(Some(_)) => reconciled += 1,
				Ok(None) => {}
				Err(MigrationError::RemoteUnavailable(message)) if errors == 0 && reconciled == 0 => {
					// The identity provider is down; retry the whole sweep later.
					return Err(JobError::failed(message, true));
				}
				Err(e) => {
					errors += 1;
					warn!(user_id = %user.id, error = %e, "reconciliation check failed");
				}
			}
		}

		info!(run_id = %ctx.run_id, checked, reconciled, errors, "reconciliation sweep finished");
		Ok(JobOutput {
			message: format!("reconciled {reconciled} of {checked} unmigrated users"),
			metadata: Some(serde_json::json!({
				"checked": checked,
				"reconciled": reconciled,
				"errors": errors,
			})),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use idbridge_server_db::testing::create_migrated_test_pool;
	use idbridge_server_db::{LegacyUserRepository, NewLegacyUser};
	use idbridge_server_db::TriggerSource;
	use idbridge_server_entra::testing::InMemoryIdentityStore;
	use tokio_util::sync::CancellationToken;

	async fn setup() -> (
		LegacyUserRepository,
		Arc<InMemoryIdentityStore>,
		ReconciliationJob,
	) {
		let users = LegacyUserRepository::new(create_migrated_test_pool().await);
		let identity = InMemoryIdentityStore::new();
		let migrator = SingleUserMigrator::new(Arc::new(users.clone()), identity.clone());
		(users, identity, ReconciliationJob::new(Arc::new(migrator)))
	}

	fn context(cancel: CancellationToken) -> JobContext {
		JobContext {
			run_id: "run-1".to_string(),
			triggered_by: TriggerSource::Manual,
			cancel,
		}
	}

	#[tokio::test]
	async fn marks_users_with_existing_remote_identity() {
		let (users, identity, job) = setup().await;
		let orphaned = users
			.create(&NewLegacyUser::new("orphan@example.com", "orphan", "hash"))
			.await
			.unwrap();
		users
			.create(&NewLegacyUser::new("pending@example.com", "pending", "hash"))
			.await
			.unwrap();
		let remote_id = identity.insert("orphan@example.com", "orphan");

		let output = job.run(&context(CancellationToken::new())).await.unwrap();
		let metadata = output.metadata.unwrap();
		assert_eq!(metadata["checked"], 2);
		assert_eq!(metadata["reconciled"], 1);

		let stored = users.find_by_id(&orphaned.id).await.unwrap().unwrap();
		assert!(stored.migrated_to_entra);
		assert_eq!(stored.entra_user_id, Some(remote_id));
		assert_eq!(identity.create_calls(), 0);
	}

	#[tokio::test]
	async fn unavailable_identity_provider_is_retryable() {
		let (users, identity, job) = setup().await;
		users
			.create(&NewLegacyUser::new("alice@example.com", "alice", "hash"))
			.await
			.unwrap();
		identity.set_unavailable(true);

		let err = job.run(&context(CancellationToken::new())).await.unwrap_err();
		assert!(matches!(
			err,
			JobError::Failed {
				retryable: true,
				..
			}
		));
	}

	#[tokio::test]
	async fn cancelled_sweep_stops() {
		let (users, _, job) = setup().await;
		users
			.create(&NewLegacyUser::new("alice@example.com", "alice", "hash"))
			.await
			.unwrap();
		let cancel = CancellationToken::new();
		cancel.cancel();

		assert!(matches!(
			job.run(&context(cancel)).await,
			Err(JobError::Cancelled)
		));
	}
}
