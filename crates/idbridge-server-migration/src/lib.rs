// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Migration of legacy users to Entra External ID.
//!
//! Two entry points share one per-user primitive, [`SingleUserMigrator`]:
//!
//! - [`JitLoginMigrator`] migrates a user at login with the password they
//!   just proved, and never affects the login result.
//! - [`BatchMigrationOrchestrator`] sweeps unmigrated users in chunks with a
//!   delay between chunks, using generated temporary passwords.
//!
//! A user is migrated at most once: a per-user lock serializes attempts in
//! this process and the local mark is a compare-and-swap.

pub mod decision;
pub mod error;
pub mod jit;
pub mod locks;
pub mod migrator;
pub mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod password;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use decision::{decide, decide_local, Decision, SkipReason};
pub use error::{MigrationError, Result};
pub use jit::JitLoginMigrator;
pub use locks::PerUserLocks;
pub use migrator::{MigrateOptions, MigrationMetrics, SingleUserMigrator};
pub use notify::{
	NotificationError, NotificationQueue, NotificationSender,
	TemporaryPasswordNotice,
};
pub use orchestrator::{BatchMigrationOrchestrator, BatchOptions};
pub use outcome::{BatchResult, MigrationOutcome};
pub use password::{validate_password_strength, SecretGenerator};
pub use registry::{MigrationRunRegistry, RunHandle, RunProgress, RunSnapshot};
pub use tokio_util::sync::CancellationToken;
