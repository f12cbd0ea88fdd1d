// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::warn;

use crate::argon2_config::argon2_instance;
use crate::error::{AuthError, Result};

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check `password` against a stored hash.
///
/// Legacy rows carry bcrypt (`$2a$`, `$2b$`, `$2y$`); hashes written here are
/// argon2 PHC strings. Anything unparseable never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
	if is_bcrypt(stored_hash) {
		return match bcrypt::verify(password, stored_hash) {
			Ok(valid) => valid,
			Err(e) => {
				warn!(error = %e, "stored bcrypt hash is malformed");
				false
			}
		};
	}

	let parsed = match PasswordHash::new(stored_hash) {
		Ok(parsed) => parsed,
		Err(e) => {
			warn!(error = %e, "stored password hash is not a PHC string");
			return false;
		}
	};
	argon2_instance()
		.verify_password(password.as_bytes(), &parsed)
		.is_ok()
}

fn is_bcrypt(stored_hash: &str) -> bool {
	["$2a$", "$2b$", "$2y$"]
		.iter()
		.any(|prefix| stored_hash.starts_with(prefix))
}
