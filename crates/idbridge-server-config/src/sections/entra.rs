// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Microsoft Entra External ID (Graph API) configuration.

use idbridge_common_secret::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_AUTHORITY_BASE_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Resolved identity provider settings.
///
/// When `enabled` is false the server runs without a remote identity
/// provider: JIT migration is skipped and bulk runs fail every user with a
/// remote-unavailable error.
#[derive(Debug, Clone)]
pub struct EntraConfig {
	pub enabled: bool,
	pub tenant_id: String,
	pub client_id: String,
	pub client_secret: SecretString,
	/// Issuer domain used for sign-in identities, e.g. `contoso.onmicrosoft.com`.
	pub tenant_name: String,
	pub graph_base_url: String,
	pub authority_base_url: String,
	/// Application id owning directory schema extensions, without dashes.
	pub extension_app_id: Option<String>,
	pub request_timeout_secs: u64,
}

impl Default for EntraConfig {
	fn default() -> Self {
		EntraConfigLayer::default().finalize()
	}
}

impl EntraConfig {
	pub fn token_endpoint(&self) -> String {
		format!(
			"{}/{}/oauth2/v2.0/token",
			self.authority_base_url.trim_end_matches('/'),
			self.tenant_id
		)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.enabled {
			return Ok(());
		}
		let required = [
			("entra.tenant_id", self.tenant_id.is_empty()),
			("entra.client_id", self.client_id.is_empty()),
			("entra.client_secret", self.client_secret.is_empty()),
			("entra.tenant_name", self.tenant_name.is_empty()),
		];
		let missing: Vec<&str> = required
			.iter()
			.filter(|(_, empty)| *empty)
			.map(|(key, _)| *key)
			.collect();
		if !missing.is_empty() {
			return Err(ConfigError::Validation(format!(
				"identity provider enabled but missing: {}",
				missing.join(", ")
			)));
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::InvalidValue {
				key: "entra.request_timeout_secs".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntraConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub tenant_id: Option<String>,
	#[serde(default)]
	pub client_id: Option<String>,
	#[serde(default)]
	pub client_secret: Option<SecretString>,
	#[serde(default)]
	pub tenant_name: Option<String>,
	#[serde(default)]
	pub graph_base_url: Option<String>,
	#[serde(default)]
	pub authority_base_url: Option<String>,
	#[serde(default)]
	pub extension_app_id: Option<String>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
}

impl EntraConfigLayer {
	pub fn merge(&mut self, other: EntraConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.tenant_id.is_some() {
			self.tenant_id = other.tenant_id;
		}
		if other.client_id.is_some() {
			self.client_id = other.client_id;
		}
		if other.client_secret.is_some() {
			self.client_secret = other.client_secret;
		}
		if other.tenant_name.is_some() {
			self.tenant_name = other.tenant_name;
		}
		if other.graph_base_url.is_some() {
			self.graph_base_url = other.graph_base_url;
		}
		if other.authority_base_url.is_some() {
			self.authority_base_url = other.authority_base_url;
		}
		if other.extension_app_id.is_some() {
			self.extension_app_id = other.extension_app_id;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> EntraConfig {
		EntraConfig {
			enabled: self.enabled.unwrap_or(true),
			tenant_id: self.tenant_id.unwrap_or_default(),
			client_id: self.client_id.unwrap_or_default(),
			client_secret: self
				.client_secret
				.unwrap_or_else(|| SecretString::new(String::new())),
			tenant_name: self.tenant_name.unwrap_or_default(),
			graph_base_url: self
				.graph_base_url
				.unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
			authority_base_url: self
				.authority_base_url
				.unwrap_or_else(|| DEFAULT_AUTHORITY_BASE_URL.to_string()),
			extension_app_id: self
				.extension_app_id
				.map(|id| id.replace('-', ""))
				.filter(|id| !id.is_empty()),
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn complete_layer() -> EntraConfigLayer {
		EntraConfigLayer {
			tenant_id: Some("tenant-guid".to_string()),
			client_id: Some("client-guid".to_string()),
			client_secret: Some(SecretString::from("s3cret")),
			tenant_name: Some("contoso.onmicrosoft.com".to_string()),
			..Default::default()
		}
	}

	#[test]
	fn complete_config_validates() {
		let config = complete_layer().finalize();
		assert!(config.validate().is_ok());
		assert_eq!(config.graph_base_url, DEFAULT_GRAPH_BASE_URL);
		assert_eq!(
			config.token_endpoint(),
			"https://login.microsoftonline.com/tenant-guid/oauth2/v2.0/token"
		);
	}

	#[test]
	fn missing_credentials_are_reported_together() {
		let err = EntraConfigLayer::default()
			.finalize()
			.validate()
			.unwrap_err()
			.to_string();
		assert!(err.contains("entra.tenant_id"));
		assert!(err.contains("entra.client_secret"));
	}

	#[test]
	fn disabled_provider_skips_validation() {
		let config = EntraConfigLayer {
			enabled: Some(false),
			..Default::default()
		}
		.finalize();
		assert!(config.validate().is_ok());
	}

	#[test]
	fn extension_app_id_drops_dashes() {
		let config = EntraConfigLayer {
			extension_app_id: Some("b7d3f1a2-0000-4c1e-9f00-123456789abc".to_string()),
			..complete_layer()
		}
		.finalize();
		assert_eq!(
			config.extension_app_id.as_deref(),
			Some("b7d3f1a200004c1e9f00123456789abc")
		);
	}
}
