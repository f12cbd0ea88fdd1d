// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration for the identity bridge server.
//!
//! Layers are merged from defaults, a TOML file and the environment
//! (`IDBRIDGE_SERVER_*`), then finalized and validated.
//!
//! ```ignore
//! let config = idbridge_server_config::load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub entra: EntraConfig,
	pub migration: MigrationConfig,
	pub auth: AuthConfig,
	pub smtp: Option<SmtpConfig>,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration with standard precedence:
/// environment, then config file, then built-in defaults.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

/// Load configuration with an explicit config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize a merged layer into a validated configuration.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		entra: layer.entra.unwrap_or_default().finalize(),
		migration: layer.migration.unwrap_or_default().finalize(),
		auth: layer.auth.unwrap_or_default().finalize(),
		smtp: layer.smtp.unwrap_or_default().build()?,
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		entra_enabled = config.entra.enabled,
		tenant_name = %config.entra.tenant_name,
		batch_size = config.migration.batch_size,
		delay_between_batches_ms = config.migration.delay_between_batches_ms,
		reconciliation_interval_secs = config.migration.reconciliation_interval_secs,
		smtp_configured = config.smtp.is_some(),
		"Server configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	config.entra.validate()?;
	config.migration.validate()?;
	config.auth.validate()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use idbridge_common_secret::SecretString;

	fn valid_layer() -> ServerConfigLayer {
		ServerConfigLayer {
			entra: Some(EntraConfigLayer {
				tenant_id: Some("tenant".to_string()),
				client_id: Some("client".to_string()),
				client_secret: Some(SecretString::from("secret")),
				tenant_name: Some("contoso.onmicrosoft.com".to_string()),
				..Default::default()
			}),
			auth: Some(AuthConfigLayer {
				jwt_secret: Some(SecretString::from("jwt")),
				admin_api_key: Some(SecretString::from("admin")),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn finalize_valid_layer() {
		let config = finalize(valid_layer()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:3000");
		assert_eq!(config.migration.batch_size, 50);
		assert!(config.smtp.is_none());
	}

	#[test]
	fn finalize_rejects_out_of_range_batch_size() {
		let mut layer = valid_layer();
		layer.migration = Some(MigrationConfigLayer {
			batch_size: Some(500),
			..Default::default()
		});
		assert!(matches!(
			finalize(layer),
			Err(ConfigError::InvalidValue { .. })
		));
	}

	#[test]
	fn finalize_requires_admin_key() {
		let mut layer = valid_layer();
		layer.auth = Some(AuthConfigLayer {
			jwt_secret: Some(SecretString::from("jwt")),
			..Default::default()
		});
		assert!(matches!(finalize(layer), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn file_values_apply_under_defaults() {
		use std::io::Write;
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
			[http]
			port = 8088

			[entra]
			enabled = false

			[auth]
			jwt_secret = "jwt"
			admin_api_key = "admin"
			"#
		)
		.unwrap();

		let mut merged = ServerConfigLayer::default();
		merged.merge(TomlSource::new(file.path()).load().unwrap());
		let config = finalize(merged).unwrap();
		assert_eq!(config.http.port, 8088);
		assert!(!config.entra.enabled);
		assert_eq!(config.auth.admin_api_key.expose(), "admin");
	}
}
