// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Argon2 parameters for legacy password hashes.
//!
//! Release builds use `Argon2::default()` (Argon2id, 19 MiB, 2 iterations).
//! Unit tests in this crate use a 1 MiB, single-iteration instance so the
//! suite stays fast. Verification always reads the parameters embedded in
//! the stored PHC string, so hashes from either build verify in both.

use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};

#[inline]
pub(crate) fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}
