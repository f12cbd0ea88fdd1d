// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authentication against the legacy store.
//!
//! - [`LoginService`]: verifies legacy credentials, runs login-time migration
//!   and issues a session token
//! - [`PasswordService`]: admin password updates and resets, mirrored to the
//!   identity provider for migrated users
//! - [`hash_password`] / [`verify_password`]: Argon2 PHC hashes

mod argon2_config;
pub mod error;
pub mod login;
pub mod password;
pub mod password_service;
pub mod session;

pub use error::{AuthError, Result};
pub use login::{LoginResult, LoginService};
pub use password::{hash_password, verify_password};
pub use password_service::{PasswordService, RemoteSync};
pub use session::{SessionClaims, SessionTokens};
