// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HS256 session tokens issued at login.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use idbridge_common_secret::SecretString;
use idbridge_server_db::LegacyUser;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
	/// Legacy user id.
	pub sub: String,
	pub email: String,
	pub username: String,
	pub migrated_to_entra: bool,
	pub iat: u64,
	pub exp: u64,
}

#[derive(Clone)]
pub struct SessionTokens {
	encoding: EncodingKey,
	decoding: DecodingKey,
	ttl: Duration,
}

impl SessionTokens {
	pub fn new(secret: &SecretString, ttl: Duration) -> Self {
		let key = secret.expose().as_bytes();
		Self {
			encoding: EncodingKey::from_secret(key),
			decoding: DecodingKey::from_secret(key),
			ttl,
		}
	}

	pub fn issue(&self, user: &LegacyUser) -> Result<String> {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_err(|e| AuthError::Token(format!("system time error: {e}")))?
			.as_secs();
		let claims = SessionClaims {
			sub: user.id.clone(),
			email: user.email.clone(),
			username: user.username.clone(),
			migrated_to_entra: user.migrated_to_entra,
			iat: now,
			exp: now + self.ttl.as_secs(),
		};
		encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
			.map_err(|e| AuthError::Token(format!("failed to encode session token: {e}")))
	}

	pub fn decode(&self, token: &str) -> Result<SessionClaims> {
		decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
			.map(|data| data.claims)
			.map_err(|e| AuthError::Token(e.to_string()))
	}
}
