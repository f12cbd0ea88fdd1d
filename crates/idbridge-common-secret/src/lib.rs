// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret wrapper for credentials that flow through the identity bridge.
//!
//! Client secrets for the identity provider, the admin API key, the session
//! signing key and every generated temporary password are carried as
//! [`Secret`] values so that they:
//!
//! - never show up in `Debug`/`Display` output or structured log fields
//! - serialize as `"[REDACTED]"` when a config section is dumped
//! - are zeroized when dropped
//! - can only be read through an explicit [`Secret::expose`] call
//!
//! ```
//! use idbridge_common_secret::SecretString;
//!
//! let temporary = SecretString::new("Xy7#kd9!Qa2@Lm4$".to_string());
//! assert_eq!(format!("{temporary}"), "[REDACTED]");
//! assert_eq!(temporary.expose(), "Xy7#kd9!Qa2@Lm4$");
//! ```

use std::fmt;
use std::path::PathBuf;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Placeholder written wherever a secret would otherwise be rendered.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must not leak through logs, responses or config dumps.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Read the wrapped value. Keep call sites greppable.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Take an owned copy of the value, leaving the original to be zeroized.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl SecretString {
	/// Compare against a candidate without short-circuiting on the first
	/// mismatching byte. Used for API keys presented in request headers.
	pub fn ct_eq_str(&self, candidate: &str) -> bool {
		self.inner.as_bytes().ct_eq(candidate.as_bytes()).into()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self::new(self.inner.clone())
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Serialize + Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

/// Failure to read a secret from the environment or a mounted file.
#[derive(Debug, thiserror::Error)]
pub enum SecretEnvError {
	#[error("both {var} and {var}_FILE are set")]
	Ambiguous { var: String },

	#[error("failed to read {var}_FILE at {path}: {source}")]
	FileRead {
		var: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Load a secret from `VAR`, or from the file named by `VAR_FILE`.
///
/// The `_FILE` form is how container orchestrators mount client secrets.
/// Trailing newlines in the file are stripped. Setting both forms is an error.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let file_var = format!("{var}_FILE");
	let direct = std::env::var(var).ok().filter(|v| !v.is_empty());
	let file = std::env::var(&file_var).ok().filter(|v| !v.is_empty());

	match (direct, file) {
		(Some(_), Some(_)) => Err(SecretEnvError::Ambiguous {
			var: var.to_string(),
		}),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => {
			let path = PathBuf::from(path);
			let mut contents =
				std::fs::read_to_string(&path).map_err(|source| SecretEnvError::FileRead {
					var: var.to_string(),
					path: path.clone(),
					source,
				})?;
			let trimmed_len = contents.trim_end_matches(['\n', '\r']).len();
			contents.truncate(trimmed_len);
			tracing::debug!(var = %var, path = %path.display(), "loaded secret from file");
			Ok(Some(SecretString::new(contents)))
		}
		(None, None) => Ok(None),
	}
}
