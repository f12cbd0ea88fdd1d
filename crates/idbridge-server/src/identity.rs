// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity store selection.

use std::sync::Arc;

use async_trait::async_trait;
use idbridge_common_secret::SecretString;
use idbridge_server_config::EntraConfig;
use idbridge_server_entra::{
	GraphClient, GraphConfig, IdentityError, IdentityStore, RemoteAttributes, UserDraft,
};

/// Stands in for the identity provider when `entra.enabled = false`. Every
/// call reports the provider as unavailable, so migrations fail cleanly and
/// the sign-in webhook falls back to payload attributes.
pub struct DisabledIdentityStore;

fn disabled() -> IdentityError {
	IdentityError::unavailable("identity provider is disabled")
}

#[async_trait]
impl IdentityStore for DisabledIdentityStore {
	async fn find_by_email(&self, _email: &str) -> Result<Option<String>, IdentityError> {
		Err(disabled())
	}

	async fn create(
		&self,
		_draft: &UserDraft,
		_initial_password: &SecretString,
		_force_change: bool,
	) -> Result<String, IdentityError> {
		Err(disabled())
	}

	async fn patch_password(
		&self,
		_remote_id: &str,
		_password: &SecretString,
	) -> Result<(), IdentityError> {
		Err(disabled())
	}

	async fn fetch_attributes(&self, _remote_id: &str) -> Result<RemoteAttributes, IdentityError> {
		Err(disabled())
	}

	async fn health(&self) -> Result<(), IdentityError> {
		Err(disabled())
	}
}

/// Build the Graph client from configuration, or the disabled stand-in.
pub fn create_identity_store(config: &EntraConfig) -> Result<Arc<dyn IdentityStore>, IdentityError> {
	if !config.enabled {
		return Ok(Arc::new(DisabledIdentityStore));
	}

	let client = GraphClient::new(GraphConfig {
		tenant_id: config.tenant_id.clone(),
		client_id: config.client_id.clone(),
		client_secret: config.client_secret.clone(),
		tenant_name: config.tenant_name.clone(),
		graph_base_url: config.graph_base_url.clone(),
		token_endpoint: config.token_endpoint(),
		extension_app_id: config.extension_app_id.clone(),
		request_timeout: std::time::Duration::from_secs(config.request_timeout_secs),
	})?;
	Ok(Arc::new(client))
}
