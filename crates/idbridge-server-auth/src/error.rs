// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use idbridge_server_db::DbError;
use idbridge_server_migration::MigrationError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	/// Unknown email or wrong password; deliberately indistinguishable.
	#[error("invalid email or password")]
	InvalidCredentials,

	#[error("account is disabled")]
	AccountDisabled,

	#[error("user not found: {0}")]
	UserNotFound(String),

	#[error("password rejected: {0}")]
	WeakPassword(String),

	#[error("password hashing failed: {0}")]
	Hash(String),

	#[error("session token error: {0}")]
	Token(String),

	#[error(transparent)]
	Store(#[from] DbError),

	#[error(transparent)]
	Migration(#[from] MigrationError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
