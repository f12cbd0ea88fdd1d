// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Temporary password generation and the remote password policy.

use idbridge_common_secret::SecretString;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{MigrationError, Result};

pub const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
pub const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &[u8] = b"0123456789";
pub const SYMBOLS: &[u8] = b"!@#$%^&*";

pub const DEFAULT_LENGTH: usize = 16;
const MIN_LENGTH: usize = 4;

/// Bounds the identity provider enforces on passwords.
pub const POLICY_MIN_LENGTH: usize = 8;
pub const POLICY_MAX_LENGTH: usize = 256;

const CLASSES: [&[u8]; 4] = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];

/// Generates passwords from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretGenerator;

impl SecretGenerator {
	pub fn new() -> Self {
		Self
	}

	/// One character from each class, the rest uniform over the union, then shuffled.
	pub fn generate(&self, length: usize) -> Result<SecretString> {
		if length < MIN_LENGTH {
			return Err(MigrationError::InvalidArgument(format!(
				"password length must be at least {MIN_LENGTH}, got {length}"
			)));
		}

		let mut rng = OsRng;
		let union: Vec<u8> = CLASSES.concat();
		let mut chars: Vec<u8> = Vec::with_capacity(length);

		for class in CLASSES {
			chars.push(class[rng.gen_range(0..class.len())]);
		}
		while chars.len() < length {
			chars.push(union[rng.gen_range(0..union.len())]);
		}
		chars.shuffle(&mut rng);

		// Every byte comes from an ASCII table above.
		let password: String = chars.into_iter().map(char::from).collect();
		Ok(SecretString::new(password))
	}
}

/// Character classes present in `password`, in the order lower, upper, digit, symbol.
fn classes_present(password: &str) -> [bool; 4] {
	let mut present = [false; 4];
	for b in password.bytes() {
		for (i, class) in CLASSES.iter().enumerate() {
			if class.contains(&b) {
				present[i] = true;
			}
		}
	}
	present
}

/// Whether the identity provider would accept `password`: length within
/// policy bounds and at least three of the four character classes.
pub fn validate_password_strength(password: &str) -> bool {
	let len = password.chars().count();
	if !(POLICY_MIN_LENGTH..=POLICY_MAX_LENGTH).contains(&len) {
		return false;
	}
	classes_present(password).iter().filter(|p| **p).count() >= 3
}
