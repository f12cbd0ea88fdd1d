// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SMTP client for the identity bridge.
//!
//! [`SmtpClient`] sends multipart (plain text + HTML) mail over STARTTLS or
//! plain SMTP. [`SmtpNotificationSender`] plugs it into the migration
//! notification queue to deliver temporary passwords.

mod template;

use std::sync::Arc;

use async_trait::async_trait;
use idbridge_common_secret::SecretString;
use idbridge_server_config::SmtpConfig;
use idbridge_server_migration::{NotificationError, NotificationSender};
use lettre::{
	message::{header::ContentType, Mailbox, MultiPart, SinglePart},
	transport::smtp::authentication::Credentials,
	AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

pub use template::{temporary_password_email, RenderedEmail};

#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
	#[error("connection failed: {0}")]
	Connection(String),

	#[error("authentication failed: {0}")]
	Auth(String),

	#[error("send failed: {0}")]
	Send(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("invalid email address: {0}")]
	Address(String),

	/// The server permanently refused the message (5xx).
	#[error("message rejected: {0}")]
	Rejected(String),
}

impl From<SmtpError> for NotificationError {
	fn from(e: SmtpError) -> Self {
		match e {
			SmtpError::Connection(_) | SmtpError::Send(_) => {
				NotificationError::Transient(e.to_string())
			}
			SmtpError::Auth(_)
			| SmtpError::Config(_)
			| SmtpError::Address(_)
			| SmtpError::Rejected(_) => {
				NotificationError::Permanent(e.to_string())
			}
		}
	}
}

pub struct SmtpClient {
	transport: AsyncSmtpTransport<Tokio1Executor>,
	from_mailbox: Mailbox,
}

impl SmtpClient {
	/// Build the transport. No connection is made until the first send.
	#[tracing::instrument(
		name = "smtp_client_new",
		skip(config),
		fields(host = %config.host, port = config.port, use_tls = config.use_tls)
	)]
	pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
		let from_mailbox: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
			.parse()
			.map_err(|e| SmtpError::Address(format!("{e}")))?;

		let builder = if config.use_tls {
			AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
				.map_err(|e| SmtpError::Connection(format!("{e}")))?
		} else {
			AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
		};
		let mut builder = builder.port(config.port);

		match (&config.username, &config.password) {
			(Some(username), Some(password)) => {
				let credentials = Credentials::new(username.clone(), password.expose().clone());
				builder = builder.credentials(credentials);
			}
			(Some(_), None) | (None, Some(_)) => {
				return Err(SmtpError::Config(
					"username and password must be set together".to_string(),
				));
			}
			(None, None) => {}
		}

		tracing::debug!("SMTP client initialized");
		Ok(Self {
			transport: builder.build(),
			from_mailbox,
		})
	}

	#[tracing::instrument(name = "smtp_check_health", skip(self))]
	pub async fn check_health(&self) -> Result<(), SmtpError> {
		let reachable = self
			.transport
			.test_connection()
			.await
			.map_err(|e| SmtpError::Connection(format!("{e}")))?;
		if !reachable {
			return Err(SmtpError::Connection("server did not respond to NOOP".to_string()));
		}
		Ok(())
	}

	#[tracing::instrument(
		name = "smtp_send_email",
		skip(self, body_html, body_text),
		fields(to = %to, subject = %subject)
	)]
	pub async fn send_email(
		&self,
		to: &str,
		subject: &str,
		body_html: &str,
		body_text: &str,
	) -> Result<(), SmtpError> {
		let to_mailbox: Mailbox = to.parse().map_err(|e| SmtpError::Address(format!("{e}")))?;

		let message = Message::builder()
			.from(self.from_mailbox.clone())
			.to(to_mailbox)
			.subject(subject)
			.multipart(
				MultiPart::alternative()
					.singlepart(
						SinglePart::builder()
							.header(ContentType::TEXT_PLAIN)
							.body(body_text.to_string()),
					)
					.singlepart(
						SinglePart::builder()
							.header(ContentType::TEXT_HTML)
							.body(body_html.to_string()),
					),
			)
			.map_err(|e| SmtpError::Send(format!("failed to build message: {e}")))?;

		self.transport.send(message).await.map_err(|e| {
			if e.is_permanent() {
				SmtpError::Rejected(format!("{e}"))
			} else {
				SmtpError::Send(format!("{e}"))
			}
		})?;

		tracing::info!("email sent");
		Ok(())
	}
}

/// Delivers temporary passwords issued by bulk migration.
pub struct SmtpNotificationSender {
	client: Arc<SmtpClient>,
	sign_in_url: Option<String>,
}

impl SmtpNotificationSender {
	pub fn new(client: Arc<SmtpClient>, sign_in_url: Option<String>) -> Self {
		Self {
			client,
			sign_in_url,
		}
	}
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
	async fn send_temporary_password_email(
		&self,
		email: &str,
		username: &str,
		password: &SecretString,
	) -> Result<(), NotificationError> {
		let rendered = temporary_password_email(username, password, self.sign_in_url.as_deref());
		self.client
			.send_email(email, &rendered.subject, &rendered.html, &rendered.text)
			.await
			.map_err(NotificationError::from)
	}
}

pub fn is_valid_email(email: &str) -> bool {
	email.parse::<Mailbox>().is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn config() -> SmtpConfig {
		SmtpConfig {
			host: "smtp.example.com".to_string(),
			port: 587,
			username: Some("mailer".to_string()),
			password: Some(SecretString::from("super-secret-password")),
			from_address: "noreply@example.com".to_string(),
			from_name: "Account Migration".to_string(),
			use_tls: true,
		}
	}

	#[tokio::test]
	async fn client_builds_from_config() {
		assert!(SmtpClient::new(&config()).is_ok());
	}

	#[tokio::test]
	async fn half_configured_credentials_are_rejected() {
		let mut cfg = config();
		cfg.password = None;
		assert!(matches!(SmtpClient::new(&cfg), Err(SmtpError::Config(_))));
	}

	#[tokio::test]
	async fn bad_sender_address_is_rejected() {
		let mut cfg = config();
		cfg.from_address = "not-an-address".to_string();
		assert!(matches!(SmtpClient::new(&cfg), Err(SmtpError::Address(_))));
	}

	#[test]
	fn delivery_failures_are_retryable_but_bad_addresses_are_not() {
		assert!(matches!(
			NotificationError::from(SmtpError::Connection("refused".into())),
			NotificationError::Transient(_)
		));
		assert!(matches!(
			NotificationError::from(SmtpError::Address("x".into())),
			NotificationError::Permanent(_)
		));
		assert!(matches!(
			NotificationError::from(SmtpError::Rejected("550".into())),
			NotificationError::Permanent(_)
		));
	}

	#[test]
	fn config_debug_does_not_leak_password() {
		let debug = format!("{:?}", config());
		assert!(!debug.contains("super-secret-password"));
	}

	proptest! {
		#[test]
		fn simple_addresses_are_valid(
			local in "[a-zA-Z][a-zA-Z0-9]{0,30}",
			domain in "[a-zA-Z][a-zA-Z0-9]{0,20}",
			tld in "(com|org|net|io)"
		) {
			let email = format!("{local}@{domain}.{tld}");
			prop_assert!(is_valid_email(&email));
		}

		#[test]
		fn strings_without_at_are_invalid(s in "[a-zA-Z0-9._%+-]{1,50}") {
			prop_assert!(!is_valid_email(&s));
		}
	}
}
