// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Typed lookup of directory extension attributes.
//!
//! Custom attributes live under tenant-specific property names such as
//! `extension_<appId>_extensionAttribute1`. Rather than scanning payloads for
//! anything that looks similar, every [`ExtensionAttr`] resolves to an ordered
//! list of exact property names. Names discovered from the directory come
//! first, then the name derived from the configured extension application,
//! then the bare attribute name, then the on-premises synced attribute.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bumped whenever the candidate ordering rules change.
pub const SCHEMA_VERSION: u32 = 1;

const ON_PREMISES_CONTAINER: &str = "onPremisesExtensionAttributes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionAttr {
	/// `"Y"` marks a placeholder account that must not complete a first sign-in.
	DummyUserFlag,
}

impl ExtensionAttr {
	pub const ALL: [ExtensionAttr; 1] = [ExtensionAttr::DummyUserFlag];

	/// Directory attribute name without any application prefix.
	pub fn attribute_name(&self) -> &'static str {
		match self {
			ExtensionAttr::DummyUserFlag => "extensionAttribute1",
		}
	}
}

/// A property path on a user object or payload attribute map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyPath {
	/// Top-level property, e.g. `extension_abc_extensionAttribute1`.
	Direct(String),
	/// Property nested under a container object.
	Nested { container: String, name: String },
}

impl PropertyPath {
	/// Name to request through `$select`.
	pub fn select_name(&self) -> &str {
		match self {
			PropertyPath::Direct(name) => name,
			PropertyPath::Nested { container, .. } => container,
		}
	}

	fn get<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a Value> {
		match self {
			PropertyPath::Direct(name) => get_exact_or_caseless(object, name),
			PropertyPath::Nested { container, name } => get_exact_or_caseless(object, container)
				.and_then(Value::as_object)
				.and_then(|inner| get_exact_or_caseless(inner, name)),
		}
	}
}

/// Graph property names are case-insensitive; payload keys normally match exactly.
fn get_exact_or_caseless<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
	object.get(key).or_else(|| {
		object
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(key))
			.map(|(_, v)| v)
	})
}

/// Extract a scalar attribute value.
///
/// Sign-in payloads wrap values as `{"value": "Y", "@odata.type": ...}`
/// while user objects carry plain strings.
fn scalar(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Bool(b) => Some(b.to_string()),
		Value::Number(n) => Some(n.to_string()),
		Value::Object(inner) => inner.get("value").and_then(scalar),
		_ => None,
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSchema {
	pub version: u32,
	candidates: BTreeMap<ExtensionAttr, Vec<PropertyPath>>,
}

impl ExtensionSchema {
	/// Schema built from configuration alone.
	pub fn builtin(extension_app_id: Option<&str>) -> Self {
		Self::with_discovered(extension_app_id, &[])
	}

	/// Schema built from names registered in the directory plus the static fallbacks.
	///
	/// Discovered names for the configured application are preferred over
	/// names registered by other applications.
	pub fn with_discovered(extension_app_id: Option<&str>, discovered: &[String]) -> Self {
		let app_prefix = extension_app_id.map(|id| format!("extension_{}_", id.replace('-', "")));
		let mut candidates = BTreeMap::new();

		for attr in ExtensionAttr::ALL {
			let suffix = format!("_{}", attr.attribute_name());
			let mut matching: Vec<&String> = discovered
				.iter()
				.filter(|name| name.starts_with("extension_") && name.ends_with(&suffix))
				.collect();
			matching.sort_by_key(|name| {
				let owned_by_app = app_prefix
					.as_deref()
					.is_some_and(|prefix| name.starts_with(prefix));
				(!owned_by_app, name.to_string())
			});

			let mut paths: Vec<PropertyPath> = Vec::new();
			let mut push = |path: PropertyPath| {
				if !paths.contains(&path) {
					paths.push(path);
				}
			};
			for name in matching {
				push(PropertyPath::Direct(name.clone()));
			}
			if let Some(prefix) = &app_prefix {
				push(PropertyPath::Direct(format!(
					"{prefix}{}",
					attr.attribute_name()
				)));
			}
			push(PropertyPath::Direct(attr.attribute_name().to_string()));
			push(PropertyPath::Nested {
				container: ON_PREMISES_CONTAINER.to_string(),
				name: attr.attribute_name().to_string(),
			});

			candidates.insert(attr, paths);
		}

		Self {
			version: SCHEMA_VERSION,
			candidates,
		}
	}

	pub fn candidates(&self, attr: ExtensionAttr) -> &[PropertyPath] {
		self.candidates
			.get(&attr)
			.map(Vec::as_slice)
			.unwrap_or_default()
	}

	/// Resolve `attr` against a user object or attribute map, first candidate wins.
	pub fn lookup(&self, attr: ExtensionAttr, object: &Map<String, Value>) -> Option<String> {
		self.candidates(attr)
			.iter()
			.find_map(|path| path.get(object).and_then(scalar))
	}

	/// Resolve every known attribute present in `object`.
	pub fn resolve_all(&self, object: &Map<String, Value>) -> BTreeMap<ExtensionAttr, String> {
		ExtensionAttr::ALL
			.iter()
			.filter_map(|attr| self.lookup(*attr, object).map(|v| (*attr, v)))
			.collect()
	}

	/// Property names to request from the directory so that every candidate
	/// present on a user object is returned. The bare attribute name only
	/// occurs in sign-in payloads and is not selectable.
	pub fn select_names(&self) -> Vec<String> {
		let mut names: Vec<String> = Vec::new();
		for paths in self.candidates.values() {
			for path in paths {
				if let PropertyPath::Direct(name) = path {
					if !name.starts_with("extension_") {
						continue;
					}
				}
				let name = path.select_name().to_string();
				if !names.contains(&name) {
					names.push(name);
				}
			}
		}
		names
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn object(value: Value) -> Map<String, Value> {
		value.as_object().cloned().unwrap()
	}

	#[test]
	fn builtin_order_prefers_configured_app() {
		let schema = ExtensionSchema::builtin(Some("1234-abcd"));
		let names: Vec<&str> = schema
			.candidates(ExtensionAttr::DummyUserFlag)
			.iter()
			.map(PropertyPath::select_name)
			.collect();
		assert_eq!(
			names,
			vec![
				"extension_1234abcd_extensionAttribute1",
				"extensionAttribute1",
				"onPremisesExtensionAttributes",
			]
		);
	}

	#[test]
	fn discovered_names_come_first_and_own_app_wins() {
		let discovered = vec![
			"extension_other_extensionAttribute1".to_string(),
			"extension_mine_extensionAttribute1".to_string(),
			"extension_mine_department".to_string(),
		];
		let schema = ExtensionSchema::with_discovered(Some("mine"), &discovered);
		let first = &schema.candidates(ExtensionAttr::DummyUserFlag)[0];
		assert_eq!(
			first,
			&PropertyPath::Direct("extension_mine_extensionAttribute1".to_string())
		);
		assert_eq!(schema.candidates(ExtensionAttr::DummyUserFlag).len(), 4);
	}

	#[test]
	fn select_names_skip_payload_only_name() {
		let schema = ExtensionSchema::builtin(Some("app"));
		assert_eq!(
			schema.select_names(),
			vec![
				"extension_app_extensionAttribute1".to_string(),
				"onPremisesExtensionAttributes".to_string(),
			]
		);
	}

	#[test]
	fn lookup_unwraps_payload_values() {
		let schema = ExtensionSchema::builtin(Some("app"));
		let attrs = object(json!({
			"extension_app_extensionAttribute1": {
				"@odata.type": "microsoft.graph.stringDirectoryAttributeValue",
				"value": "Y"
			}
		}));
		assert_eq!(
			schema.lookup(ExtensionAttr::DummyUserFlag, &attrs).as_deref(),
			Some("Y")
		);
	}

	#[test]
	fn lookup_falls_back_to_on_premises_attributes() {
		let schema = ExtensionSchema::builtin(None);
		let user = object(json!({
			"id": "u1",
			"onPremisesExtensionAttributes": { "extensionAttribute1": "y" }
		}));
		assert_eq!(
			schema.lookup(ExtensionAttr::DummyUserFlag, &user).as_deref(),
			Some("y")
		);
	}

	#[test]
	fn lookup_ignores_lookalike_keys() {
		let schema = ExtensionSchema::builtin(Some("app"));
		let attrs = object(json!({ "customExtensionAttribute10": "Y" }));
		assert!(schema.lookup(ExtensionAttr::DummyUserFlag, &attrs).is_none());
	}

	#[test]
	fn empty_values_fall_through() {
		let schema = ExtensionSchema::builtin(Some("app"));
		let attrs = object(json!({
			"extension_app_extensionAttribute1": "",
			"extensionAttribute1": "N"
		}));
		assert_eq!(
			schema.lookup(ExtensionAttr::DummyUserFlag, &attrs).as_deref(),
			Some("N")
		);
	}
}
