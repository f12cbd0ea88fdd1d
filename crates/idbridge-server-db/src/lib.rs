// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence for the identity bridge.
//!
//! - [`LegacyUserRepository`]: the legacy password store being migrated
//! - [`SignInRepository`]: durable first-sign-in tracking for the sign-in webhook
//! - [`JobRepository`]: background job definitions and run history

pub mod error;
pub mod job;
pub mod legacy_user;
pub mod pool;
pub mod sign_in;
pub mod testing;
pub mod types;

pub use error::{DbError, Result};
pub use job::{JobDefinition, JobRepository, JobRun, JobStatus, TriggerSource};
pub use legacy_user::{LegacyUserRepository, LocalUserStore};
pub use pool::{create_pool, health_check, run_migrations};
pub use sign_in::{SignInRepository, SignInStore};
pub use types::{LegacyUser, MigrationStats, NewLegacyUser, SignInRecord};
