// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML file and environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use idbridge_common_secret::load_secret_env;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuthConfigLayer, DatabaseConfigLayer, EntraConfigLayer, HttpConfigLayer, LogFormat,
	LoggingConfigLayer, MigrationConfigLayer, SmtpConfigLayer,
};

pub const CONFIG_FILE_ENV: &str = "IDBRIDGE_SERVER_CONFIG_FILE";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/idbridge/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `IDBRIDGE_SERVER_CONFIG_FILE` if set, otherwise the system path.
	pub fn system() -> Self {
		Self::new(env_var(CONFIG_FILE_ENV).unwrap_or_else(|| SYSTEM_CONFIG_PATH.to_string()))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Convention: `IDBRIDGE_SERVER_<SECTION>_<FIELD>`.
///
/// The identity provider settings also accept the bare `ENTRA_*` names
/// used by existing deployments.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			logging: Some(load_logging_from_env()?),
			entra: Some(load_entra_from_env()?),
			migration: Some(load_migration_from_env()?),
			auth: Some(load_auth_from_env()?),
			smtp: Some(load_smtp_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {} value '{v}'", std::any::type_name::<T>()),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("IDBRIDGE_SERVER_HOST"),
		port: env_parse("IDBRIDGE_SERVER_PORT")?,
		base_url: env_var("IDBRIDGE_SERVER_BASE_URL"),
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("IDBRIDGE_SERVER_DATABASE_URL"),
	}
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("IDBRIDGE_SERVER_LOG_LEVEL"),
		format: env_var("IDBRIDGE_SERVER_LOG_FORMAT")
			.map(|v| LogFormat::parse(&v))
			.transpose()?,
	})
}

fn load_entra_from_env() -> Result<EntraConfigLayer, ConfigError> {
	let client_secret = match load_secret_env("IDBRIDGE_SERVER_ENTRA_CLIENT_SECRET")? {
		Some(secret) => Some(secret),
		None => load_secret_env("ENTRA_CLIENT_SECRET")?,
	};

	Ok(EntraConfigLayer {
		enabled: env_bool("IDBRIDGE_SERVER_ENTRA_ENABLED"),
		tenant_id: env_var("IDBRIDGE_SERVER_ENTRA_TENANT_ID")
			.or_else(|| env_var("ENTRA_TENANT_ID")),
		client_id: env_var("IDBRIDGE_SERVER_ENTRA_CLIENT_ID")
			.or_else(|| env_var("ENTRA_CLIENT_ID")),
		client_secret,
		tenant_name: env_var("IDBRIDGE_SERVER_ENTRA_TENANT_NAME")
			.or_else(|| env_var("ENTRA_TENANT_NAME")),
		graph_base_url: env_var("IDBRIDGE_SERVER_ENTRA_GRAPH_BASE_URL"),
		authority_base_url: env_var("IDBRIDGE_SERVER_ENTRA_AUTHORITY_BASE_URL"),
		extension_app_id: env_var("IDBRIDGE_SERVER_ENTRA_EXTENSION_APP_ID"),
		request_timeout_secs: env_parse("IDBRIDGE_SERVER_ENTRA_REQUEST_TIMEOUT_SECS")?,
	})
}

fn load_migration_from_env() -> Result<MigrationConfigLayer, ConfigError> {
	Ok(MigrationConfigLayer {
		batch_size: env_parse("IDBRIDGE_SERVER_MIGRATION_BATCH_SIZE")?,
		delay_between_batches_ms: env_parse("IDBRIDGE_SERVER_MIGRATION_DELAY_BETWEEN_BATCHES_MS")?,
		temporary_password_length: env_parse(
			"IDBRIDGE_SERVER_MIGRATION_TEMPORARY_PASSWORD_LENGTH",
		)?,
		notification_queue_capacity: env_parse(
			"IDBRIDGE_SERVER_MIGRATION_NOTIFICATION_QUEUE_CAPACITY",
		)?,
		notification_max_attempts: env_parse("IDBRIDGE_SERVER_MIGRATION_NOTIFICATION_MAX_ATTEMPTS")?,
		reconciliation_interval_secs: env_parse(
			"IDBRIDGE_SERVER_MIGRATION_RECONCILIATION_INTERVAL_SECS",
		)?,
	})
}

fn load_auth_from_env() -> Result<AuthConfigLayer, ConfigError> {
	Ok(AuthConfigLayer {
		jwt_secret: load_secret_env("IDBRIDGE_SERVER_AUTH_JWT_SECRET")?,
		session_ttl_secs: env_parse("IDBRIDGE_SERVER_AUTH_SESSION_TTL_SECS")?,
		admin_api_key: load_secret_env("IDBRIDGE_SERVER_ADMIN_API_KEY")?,
		min_password_length: env_parse("IDBRIDGE_SERVER_AUTH_MIN_PASSWORD_LENGTH")?,
	})
}

fn load_smtp_from_env() -> Result<SmtpConfigLayer, ConfigError> {
	Ok(SmtpConfigLayer {
		host: env_var("IDBRIDGE_SERVER_SMTP_HOST"),
		port: env_parse("IDBRIDGE_SERVER_SMTP_PORT")?,
		username: env_var("IDBRIDGE_SERVER_SMTP_USERNAME"),
		password: load_secret_env("IDBRIDGE_SERVER_SMTP_PASSWORD")?,
		from_address: env_var("IDBRIDGE_SERVER_SMTP_FROM_ADDRESS"),
		from_name: env_var("IDBRIDGE_SERVER_SMTP_FROM_NAME"),
		use_tls: env_bool("IDBRIDGE_SERVER_SMTP_USE_TLS"),
	})
}
