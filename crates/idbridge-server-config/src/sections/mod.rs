// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for idbridge-server.

pub mod auth;
pub mod database;
pub mod entra;
pub mod http;
pub mod logging;
pub mod migration;
pub mod smtp;

pub use auth::{AuthConfig, AuthConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use entra::{EntraConfig, EntraConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use migration::{MigrationConfig, MigrationConfigLayer};
pub use smtp::{SmtpConfig, SmtpConfigLayer};
