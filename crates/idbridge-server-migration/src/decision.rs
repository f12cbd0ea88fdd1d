// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-user migration decision.

use std::fmt;

use idbridge_server_db::LegacyUser;
use idbridge_server_entra::{IdentityError, IdentityStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	AlreadyMigrated,
	AlreadyExistsRemotely,
	UserNotFound,
}

impl SkipReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			SkipReason::AlreadyMigrated => "already migrated",
			SkipReason::AlreadyExistsRemotely => "already exists remotely",
			SkipReason::UserNotFound => "user not found",
		}
	}
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Proceed,
	Skip(SkipReason),
}

/// The local half of the decision; needs no I/O.
pub fn decide_local(user: &LegacyUser) -> Option<SkipReason> {
	user.migrated_to_entra
		.then_some(SkipReason::AlreadyMigrated)
}

/// Decide whether `user` should be migrated. Rules are evaluated in order,
/// first match wins, and nothing is mutated on either side.
pub async fn decide(
	user: &LegacyUser,
	identity: &dyn IdentityStore,
) -> Result<Decision, IdentityError> {
	if let Some(reason) = decide_local(user) {
		return Ok(Decision::Skip(reason));
	}
	if identity.exists(&user.email).await? {
		return Ok(Decision::Skip(SkipReason::AlreadyExistsRemotely));
	}
	Ok(Decision::Proceed)
}
