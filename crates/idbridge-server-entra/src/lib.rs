// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity provider adapter for Microsoft Entra External ID.
//!
//! [`IdentityStore`] is the seam the migration engine talks to. [`GraphClient`]
//! implements it against Microsoft Graph with client-credential tokens,
//! retry on throttling, and typed extension attribute lookup.

mod client;
mod error;
pub mod schema;
pub mod testing;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use idbridge_common_secret::SecretString;

pub use client::{identity_filter, GraphClient, GraphConfig};
pub use error::IdentityError;
pub use schema::{ExtensionAttr, ExtensionSchema};
pub use types::{RemoteAttributes, UserDraft};

#[async_trait]
pub trait IdentityStore: Send + Sync {
	/// Remote id of the identity registered under `email`, if any.
	async fn find_by_email(&self, email: &str) -> Result<Option<String>, IdentityError>;

	async fn exists(&self, email: &str) -> Result<bool, IdentityError> {
		Ok(self.find_by_email(email).await?.is_some())
	}

	/// Create an identity and return its remote id.
	async fn create(
		&self,
		draft: &UserDraft,
		initial_password: &SecretString,
		force_change: bool,
	) -> Result<String, IdentityError>;

	async fn patch_password(
		&self,
		remote_id: &str,
		password: &SecretString,
	) -> Result<(), IdentityError>;

	async fn fetch_attributes(&self, remote_id: &str) -> Result<RemoteAttributes, IdentityError>;

	async fn extension_schema(&self) -> Arc<ExtensionSchema> {
		Arc::new(ExtensionSchema::builtin(None))
	}

	async fn health(&self) -> Result<(), IdentityError>;
}
