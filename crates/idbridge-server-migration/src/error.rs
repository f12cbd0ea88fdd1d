// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use idbridge_server_db::DbError;
use idbridge_server_entra::IdentityError;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
	#[error("user not found: {0}")]
	NotFound(String),

	#[error("local store unavailable: {0}")]
	StoreUnavailable(String),

	#[error("remote user creation failed: {0}")]
	RemoteCreateFailed(#[source] IdentityError),

	#[error("identity provider unavailable: {0}")]
	RemoteUnavailable(String),

	#[error("identity provider conflict: {0}")]
	RemoteConflict(String),

	#[error("identity provider rejected request: {0}")]
	RemoteValidation(String),

	/// The remote identity exists but the local record could not be marked.
	/// Needs reconciliation; never self-heals within the operation.
	#[error("remote identity {remote_id} created but user {user_id} not marked migrated")]
	InconsistentState { user_id: String, remote_id: String },

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The candidate list could not be fetched; nothing was touched.
	#[error("datastore unavailable: {0}")]
	DatastoreUnavailable(String),

	#[error("a migration run is already in progress: {0}")]
	RunInProgress(uuid::Uuid),

	#[error("migration cancelled")]
	Cancelled,
}

impl From<DbError> for MigrationError {
	fn from(e: DbError) -> Self {
		match e {
			DbError::NotFound(what) => MigrationError::NotFound(what),
			other => MigrationError::StoreUnavailable(other.to_string()),
		}
	}
}

impl From<IdentityError> for MigrationError {
	fn from(e: IdentityError) -> Self {
		match e {
			IdentityError::Conflict(m) => MigrationError::RemoteConflict(m),
			IdentityError::Validation(m) | IdentityError::NotFound(m) => {
				MigrationError::RemoteValidation(m)
			}
			other @ (IdentityError::Unavailable { .. } | IdentityError::Auth(_)) => {
				MigrationError::RemoteUnavailable(other.to_string())
			}
		}
	}
}

pub type Result<T> = std::result::Result<T, MigrationError>;
