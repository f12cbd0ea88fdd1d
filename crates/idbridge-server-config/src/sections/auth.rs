// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session tokens, admin access and local password policy.

use idbridge_common_secret::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone)]
pub struct AuthConfig {
	/// HMAC key for session tokens.
	pub jwt_secret: SecretString,
	pub session_ttl_secs: u64,
	/// Expected value of the `x-admin-api-key` header on admin routes.
	pub admin_api_key: SecretString,
	pub min_password_length: usize,
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfigLayer::default().finalize()
	}
}

impl AuthConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.jwt_secret.is_empty() {
			return Err(ConfigError::Validation(
				"auth.jwt_secret is required (IDBRIDGE_SERVER_AUTH_JWT_SECRET)".to_string(),
			));
		}
		if self.admin_api_key.is_empty() {
			return Err(ConfigError::Validation(
				"auth.admin_api_key is required (IDBRIDGE_SERVER_ADMIN_API_KEY)".to_string(),
			));
		}
		if self.session_ttl_secs == 0 {
			return Err(ConfigError::InvalidValue {
				key: "auth.session_ttl_secs".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfigLayer {
	#[serde(default)]
	pub jwt_secret: Option<SecretString>,
	#[serde(default)]
	pub session_ttl_secs: Option<u64>,
	#[serde(default)]
	pub admin_api_key: Option<SecretString>,
	#[serde(default)]
	pub min_password_length: Option<usize>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: AuthConfigLayer) {
		if other.jwt_secret.is_some() {
			self.jwt_secret = other.jwt_secret;
		}
		if other.session_ttl_secs.is_some() {
			self.session_ttl_secs = other.session_ttl_secs;
		}
		if other.admin_api_key.is_some() {
			self.admin_api_key = other.admin_api_key;
		}
		if other.min_password_length.is_some() {
			self.min_password_length = other.min_password_length;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		AuthConfig {
			jwt_secret: self
				.jwt_secret
				.unwrap_or_else(|| SecretString::new(String::new())),
			session_ttl_secs: self.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
			admin_api_key: self
				.admin_api_key
				.unwrap_or_else(|| SecretString::new(String::new())),
			min_password_length: self
				.min_password_length
				.unwrap_or(DEFAULT_MIN_PASSWORD_LENGTH),
		}
	}
}
