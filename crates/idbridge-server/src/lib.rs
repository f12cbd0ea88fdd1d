// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server for the identity bridge.
//!
//! Serves legacy login with just-in-time migration, the admin migration and
//! password API, and the sign-in webhook the identity provider calls.

pub mod admin_auth;
pub mod api;
pub mod api_docs;
pub mod error;
pub mod health;
pub mod identity;
pub mod routes;
pub mod validation;

pub use api::{create_app_state, create_job_scheduler, create_router, AppState};
pub use api_docs::ApiDoc;
pub use error::ApiError;
pub use identity::{create_identity_store, DisabledIdentityStore};
pub use idbridge_server_config::ServerConfig;
