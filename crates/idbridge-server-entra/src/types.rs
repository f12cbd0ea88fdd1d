// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::ExtensionAttr;

/// What the bridge knows about a user before creating them remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
	pub email: String,
	pub username: String,
	pub account_enabled: bool,
}

impl UserDraft {
	pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			username: username.into(),
			account_enabled: true,
		}
	}
}

/// Attributes read back from a remote identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttributes {
	pub id: String,
	pub display_name: Option<String>,
	pub mail: Option<String>,
	pub account_enabled: Option<bool>,
	/// Resolved custom attributes; absent when no candidate property held a value.
	#[serde(default)]
	pub extensions: BTreeMap<ExtensionAttr, String>,
}

impl RemoteAttributes {
	pub fn extension(&self, attr: ExtensionAttr) -> Option<&str> {
		self.extensions.get(&attr).map(String::as_str)
	}
}
