// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	AuthConfigLayer, DatabaseConfigLayer, EntraConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	MigrationConfigLayer, SmtpConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub entra: Option<EntraConfigLayer>,
	#[serde(default)]
	pub migration: Option<MigrationConfigLayer>,
	#[serde(default)]
	pub auth: Option<AuthConfigLayer>,
	#[serde(default)]
	pub smtp: Option<SmtpConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(&mut self.entra, other.entra, EntraConfigLayer::merge);
		merge_option(
			&mut self.migration,
			other.migration,
			MigrationConfigLayer::merge,
		);
		merge_option(&mut self.auth, other.auth, AuthConfigLayer::merge);
		merge_option(&mut self.smtp, other.smtp, SmtpConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_other_preserves_base() {
		let mut base = ServerConfigLayer {
			migration: Some(MigrationConfigLayer {
				batch_size: Some(25),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer::default());
		assert_eq!(base.migration.unwrap().batch_size, Some(25));
	}

	#[test]
	fn other_fields_override_individually() {
		let mut base = ServerConfigLayer {
			migration: Some(MigrationConfigLayer {
				batch_size: Some(25),
				delay_between_batches_ms: Some(5000),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			migration: Some(MigrationConfigLayer {
				batch_size: Some(100),
				..Default::default()
			}),
			..Default::default()
		});
		let migration = base.migration.unwrap();
		assert_eq!(migration.batch_size, Some(100));
		assert_eq!(migration.delay_between_batches_ms, Some(5000));
	}

	#[test]
	fn parses_toml_sections() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
			[entra]
			tenant_id = "tenant"
			tenant_name = "contoso.onmicrosoft.com"

			[migration]
			batch_size = 20
			"#,
		)
		.unwrap();
		assert_eq!(
			layer.entra.unwrap().tenant_name.as_deref(),
			Some("contoso.onmicrosoft.com")
		);
		assert_eq!(layer.migration.unwrap().batch_size, Some(20));
	}
}
