// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Microsoft Graph client for Entra External ID.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use idbridge_common_http::{new_client_with_timeout, retry, RetryConfig};
use idbridge_common_secret::SecretString;
use reqwest::{header::RETRY_AFTER, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::error::IdentityError;
use crate::schema::ExtensionSchema;
use crate::types::{RemoteAttributes, UserDraft};
use crate::IdentityStore;

const TOKEN_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Tokens are refreshed this long before their reported expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GraphConfig {
	pub tenant_id: String,
	pub client_id: String,
	pub client_secret: SecretString,
	pub tenant_name: String,
	pub graph_base_url: String,
	pub token_endpoint: String,
	pub extension_app_id: Option<String>,
	pub request_timeout: Duration,
}

struct CachedToken {
	access_token: SecretString,
	refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: u64,
}

#[derive(Deserialize)]
struct UserList {
	value: Vec<UserId>,
}

#[derive(Deserialize)]
struct UserId {
	id: String,
}

#[derive(Deserialize)]
struct ExtensionPropertyList {
	value: Vec<ExtensionProperty>,
}

#[derive(Deserialize)]
struct ExtensionProperty {
	name: String,
}

pub struct GraphClient {
	http: reqwest::Client,
	config: GraphConfig,
	retry: RetryConfig,
	token: Mutex<Option<CachedToken>>,
	schema: OnceCell<Arc<ExtensionSchema>>,
}

impl GraphClient {
	pub fn new(config: GraphConfig) -> Result<Self, IdentityError> {
		let http = new_client_with_timeout(config.request_timeout)
			.map_err(|e| IdentityError::unavailable(format!("failed to build HTTP client: {e}")))?;
		Ok(Self {
			http,
			config,
			retry: RetryConfig::default(),
			token: Mutex::new(None),
			schema: OnceCell::new(),
		})
	}

	pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.config.graph_base_url.trim_end_matches('/'), path)
	}

	async fn access_token(&self) -> Result<SecretString, IdentityError> {
		let mut guard = self.token.lock().await;
		if let Some(cached) = guard.as_ref() {
			if Instant::now() < cached.refresh_at {
				return Ok(cached.access_token.clone());
			}
		}

		debug!("acquiring Graph access token");
		let response = self
			.http
			.post(&self.config.token_endpoint)
			.form(&[
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.expose().as_str()),
				("scope", TOKEN_SCOPE),
				("grant_type", "client_credentials"),
			])
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
				return Err(IdentityError::from_response(status, &body, None));
			}
			warn!(%status, "token request rejected");
			return Err(IdentityError::Auth(format!("token request failed with HTTP {status}")));
		}

		let token: TokenResponse = response.json().await?;
		let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
		let access_token = SecretString::new(token.access_token);
		*guard = Some(CachedToken {
			access_token: access_token.clone(),
			refresh_at: Instant::now() + lifetime,
		});
		Ok(access_token)
	}

	async fn invalidate_token(&self) {
		*self.token.lock().await = None;
	}

	/// Send one authorized request and classify failures.
	async fn send_once(
		&self,
		build: impl Fn(&reqwest::Client) -> RequestBuilder,
	) -> Result<Response, IdentityError> {
		let token = self.access_token().await?;
		let response = build(&self.http)
			.bearer_auth(token.expose())
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let retry_after = response
			.headers()
			.get(RETRY_AFTER)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.trim().parse::<u64>().ok())
			.map(Duration::from_secs);
		let body = response.text().await.unwrap_or_default();
		if status == reqwest::StatusCode::UNAUTHORIZED {
			self.invalidate_token().await;
		}
		Err(IdentityError::from_response(status, &body, retry_after))
	}

	/// `send_once` under the retry policy; only `Unavailable` is retried.
	async fn send(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, &str)],
		body: Option<&Value>,
	) -> Result<Response, IdentityError> {
		let url = self.url(path);
		retry(&self.retry, || {
			self.send_once(|http| {
				let mut request = http.request(method.clone(), &url);
				if !query.is_empty() {
					request = request.query(query);
				}
				if let Some(body) = body {
					request = request.json(body);
				}
				request
			})
		})
		.await
	}

	/// Remote id of the identity whose email sign-in name matches, if any.
	#[instrument(skip(self, email))]
	pub async fn find_by_email(&self, email: &str) -> Result<Option<String>, IdentityError> {
		let filter = identity_filter(&self.config.tenant_name, email);
		let response = self
			.send(
				Method::GET,
				"/users",
				&[("$filter", filter.as_str()), ("$select", "id")],
				None,
			)
			.await?;
		let users: UserList = response.json().await?;
		Ok(users.value.into_iter().next().map(|u| u.id))
	}

	/// Create an identity. Sent once: a timed-out POST may still have
	/// committed, and a repeat would hit the duplicate it created.
	#[instrument(skip(self, draft, initial_password), fields(email = %draft.email))]
	pub async fn create_user(
		&self,
		draft: &UserDraft,
		initial_password: &SecretString,
		force_change: bool,
	) -> Result<String, IdentityError> {
		let body = create_user_body(
			&self.config.tenant_name,
			draft,
			initial_password,
			force_change,
			chrono::Utc::now().timestamp_millis(),
		);
		let url = self.url("/users");
		let response = self.send_once(|http| http.post(&url).json(&body)).await?;
		let created: UserId = response.json().await?;
		info!(remote_id = %created.id, "created remote identity");
		Ok(created.id)
	}

	#[instrument(skip(self, password))]
	pub async fn patch_password(
		&self,
		remote_id: &str,
		password: &SecretString,
	) -> Result<(), IdentityError> {
		let body = json!({
			"passwordProfile": {
				"forceChangePasswordNextSignIn": false,
				"password": password.expose(),
			}
		});
		self.send(
			Method::PATCH,
			&format!("/users/{remote_id}"),
			&[],
			Some(&body),
		)
		.await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn fetch_attributes(&self, remote_id: &str) -> Result<RemoteAttributes, IdentityError> {
		let schema = self.schema().await;
		let mut select = vec![
			"id".to_string(),
			"displayName".to_string(),
			"mail".to_string(),
			"accountEnabled".to_string(),
		];
		select.extend(schema.select_names());
		let select = select.join(",");

		let response = self
			.send(
				Method::GET,
				&format!("/users/{remote_id}"),
				&[("$select", select.as_str())],
				None,
			)
			.await?;
		let user: Map<String, Value> = response.json().await?;

		Ok(RemoteAttributes {
			id: user
				.get("id")
				.and_then(Value::as_str)
				.unwrap_or(remote_id)
				.to_string(),
			display_name: user
				.get("displayName")
				.and_then(Value::as_str)
				.map(str::to_string),
			mail: user.get("mail").and_then(Value::as_str).map(str::to_string),
			account_enabled: user.get("accountEnabled").and_then(Value::as_bool),
			extensions: schema.resolve_all(&user),
		})
	}

	#[instrument(skip(self))]
	pub async fn health_check(&self) -> Result<(), IdentityError> {
		self.send(Method::GET, "/organization", &[("$select", "id")], None)
			.await?;
		Ok(())
	}

	/// Extension schema, discovered from the directory on first use.
	///
	/// A failed discovery is not cached; the static fallbacks are returned
	/// and the next call tries again.
	pub async fn schema(&self) -> Arc<ExtensionSchema> {
		let app_id = self.config.extension_app_id.as_deref();
		let result = self
			.schema
			.get_or_try_init(|| async {
				let names = self.discover_extension_names().await?;
				debug!(count = names.len(), "discovered extension properties");
				Ok::<_, IdentityError>(Arc::new(ExtensionSchema::with_discovered(app_id, &names)))
			})
			.await;

		match result {
			Ok(schema) => Arc::clone(schema),
			Err(e) => {
				warn!(error = %e, "extension schema discovery failed, using static fallbacks");
				Arc::new(ExtensionSchema::builtin(app_id))
			}
		}
	}

	async fn discover_extension_names(&self) -> Result<Vec<String>, IdentityError> {
		let body = json!({ "isSyncedFromOnPremises": false });
		let response = self
			.send(
				Method::POST,
				"/directoryObjects/getAvailableExtensionProperties",
				&[],
				Some(&body),
			)
			.await?;
		let list: ExtensionPropertyList = response.json().await?;
		Ok(list.value.into_iter().map(|p| p.name).collect())
	}
}

#[async_trait]
impl IdentityStore for GraphClient {
	async fn find_by_email(&self, email: &str) -> Result<Option<String>, IdentityError> {
		GraphClient::find_by_email(self, email).await
	}

	async fn create(
		&self,
		draft: &UserDraft,
		initial_password: &SecretString,
		force_change: bool,
	) -> Result<String, IdentityError> {
		self.create_user(draft, initial_password, force_change).await
	}

	async fn patch_password(
		&self,
		remote_id: &str,
		password: &SecretString,
	) -> Result<(), IdentityError> {
		GraphClient::patch_password(self, remote_id, password).await
	}

	async fn fetch_attributes(&self, remote_id: &str) -> Result<RemoteAttributes, IdentityError> {
		GraphClient::fetch_attributes(self, remote_id).await
	}

	async fn extension_schema(&self) -> Arc<ExtensionSchema> {
		self.schema().await
	}

	async fn health(&self) -> Result<(), IdentityError> {
		self.health_check().await
	}
}

/// OData filter matching an email sign-in identity issued by the tenant.
pub fn identity_filter(tenant_name: &str, email: &str) -> String {
	format!(
		"identities/any(id:id/issuer eq '{}' and id/issuerAssignedId eq '{}')",
		escape_odata(tenant_name),
		escape_odata(email)
	)
}

/// OData string literals escape a single quote by doubling it.
fn escape_odata(value: &str) -> String {
	value.replace('\'', "''")
}

/// Graph rejects most punctuation in `mailNickname`.
fn mail_nickname(username: &str, timestamp_ms: i64) -> String {
	let mut base: String = username
		.chars()
		.filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
		.collect();
	if base.is_empty() {
		base.push_str("user");
	}
	format!("{base}_{timestamp_ms}")
}

fn create_user_body(
	tenant_name: &str,
	draft: &UserDraft,
	initial_password: &SecretString,
	force_change: bool,
	timestamp_ms: i64,
) -> Value {
	let nickname = mail_nickname(&draft.username, timestamp_ms);
	json!({
		"accountEnabled": draft.account_enabled,
		"displayName": draft.username,
		"mailNickname": nickname,
		"userPrincipalName": format!("{nickname}@{tenant_name}"),
		"identities": [{
			"signInType": "emailAddress",
			"issuer": tenant_name,
			"issuerAssignedId": draft.email,
		}],
		"passwordProfile": {
			"forceChangePasswordNextSignIn": force_change,
			"password": initial_password.expose(),
		},
		"passwordPolicies": "DisablePasswordExpiration",
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::ExtensionAttr;
	use wiremock::matchers::{body_partial_json, header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const TENANT: &str = "contoso.onmicrosoft.com";

	async fn client_for(server: &MockServer) -> GraphClient {
		Mock::given(method("POST"))
			.and(path("/tenant/oauth2/v2.0/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "graph-token",
				"expires_in": 3600,
				"token_type": "Bearer"
			})))
			.mount(server)
			.await;

		GraphClient::new(GraphConfig {
			tenant_id: "tenant".to_string(),
			client_id: "client".to_string(),
			client_secret: SecretString::from("secret"),
			tenant_name: TENANT.to_string(),
			graph_base_url: server.uri(),
			token_endpoint: format!("{}/tenant/oauth2/v2.0/token", server.uri()),
			extension_app_id: Some("app".to_string()),
			request_timeout: Duration::from_secs(5),
		})
		.unwrap()
		.with_retry_config(RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			backoff_factor: 2.0,
			jitter: false,
		})
	}

	#[test]
	fn filter_escapes_quotes() {
		assert_eq!(
			identity_filter(TENANT, "o'brien@example.com"),
			"identities/any(id:id/issuer eq 'contoso.onmicrosoft.com' and id/issuerAssignedId eq 'o''brien@example.com')"
		);
	}

	#[test]
	fn create_body_carries_identity_and_password_profile() {
		let draft = UserDraft::new("alice@example.com", "alice smith");
		let body = create_user_body(TENANT, &draft, &SecretString::from("Tmp#Pass123word!"), true, 42);
		assert_eq!(body["mailNickname"], "alicesmith_42");
		assert_eq!(body["userPrincipalName"], "alicesmith_42@contoso.onmicrosoft.com");
		assert_eq!(body["identities"][0]["issuerAssignedId"], "alice@example.com");
		assert_eq!(body["passwordProfile"]["forceChangePasswordNextSignIn"], true);
	}

	#[tokio::test]
	async fn find_by_email_returns_first_match() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("GET"))
			.and(path("/users"))
			.and(header("authorization", "Bearer graph-token"))
			.and(query_param(
				"$filter",
				identity_filter(TENANT, "alice@example.com").as_str(),
			))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "id": "remote-1" }] })),
			)
			.mount(&server)
			.await;

		let found = client.find_by_email("alice@example.com").await.unwrap();
		assert_eq!(found.as_deref(), Some("remote-1"));
	}

	#[tokio::test]
	async fn create_user_returns_remote_id() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("POST"))
			.and(path("/users"))
			.and(body_partial_json(json!({
				"displayName": "alice",
				"passwordProfile": { "forceChangePasswordNextSignIn": false }
			})))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "remote-7" })))
			.expect(1)
			.mount(&server)
			.await;

		let id = client
			.create_user(
				&UserDraft::new("alice@example.com", "alice"),
				&SecretString::from("Legacy#Pass1"),
				false,
			)
			.await
			.unwrap();
		assert_eq!(id, "remote-7");
	}

	#[tokio::test]
	async fn duplicate_create_is_conflict_and_not_retried() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("POST"))
			.and(path("/users"))
			.respond_with(ResponseTemplate::new(400).set_body_json(json!({
				"error": {
					"code": "Request_BadRequest",
					"message": "Another object with the same value for property userPrincipalName already exists."
				}
			})))
			.expect(1)
			.mount(&server)
			.await;

		let err = client
			.create_user(
				&UserDraft::new("alice@example.com", "alice"),
				&SecretString::from("Legacy#Pass1"),
				false,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, IdentityError::Conflict(_)));
	}

	#[tokio::test]
	async fn failed_create_is_sent_once() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("POST"))
			.and(path("/users"))
			.respond_with(ResponseTemplate::new(503))
			.expect(1)
			.mount(&server)
			.await;

		let err = client
			.create_user(
				&UserDraft::new("alice@example.com", "alice"),
				&SecretString::from("Legacy#Pass1"),
				false,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, IdentityError::Unavailable { .. }));
	}

	#[tokio::test]
	async fn throttled_requests_are_retried() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("GET"))
			.and(path("/organization"))
			.respond_with(ResponseTemplate::new(503))
			.up_to_n_times(2)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/organization"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
			.mount(&server)
			.await;

		client.health_check().await.unwrap();
	}

	#[tokio::test]
	async fn persistent_outage_is_unavailable() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("GET"))
			.and(path("/organization"))
			.respond_with(ResponseTemplate::new(500))
			.expect(3)
			.mount(&server)
			.await;

		let err = client.health_check().await.unwrap_err();
		assert!(matches!(err, IdentityError::Unavailable { .. }));
	}

	#[tokio::test]
	async fn token_is_cached_between_calls() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tenant/oauth2/v2.0/token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "graph-token",
				"expires_in": 3600
			})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/organization"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
			.mount(&server)
			.await;

		let client = GraphClient::new(GraphConfig {
			tenant_id: "tenant".to_string(),
			client_id: "client".to_string(),
			client_secret: SecretString::from("secret"),
			tenant_name: TENANT.to_string(),
			graph_base_url: server.uri(),
			token_endpoint: format!("{}/tenant/oauth2/v2.0/token", server.uri()),
			extension_app_id: None,
			request_timeout: Duration::from_secs(5),
		})
		.unwrap();

		client.health_check().await.unwrap();
		client.health_check().await.unwrap();
	}

	#[tokio::test]
	async fn rejected_credentials_are_auth_errors() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/tenant/oauth2/v2.0/token"))
			.respond_with(ResponseTemplate::new(401).set_body_json(json!({
				"error": "invalid_client"
			})))
			.mount(&server)
			.await;

		let client = GraphClient::new(GraphConfig {
			tenant_id: "tenant".to_string(),
			client_id: "client".to_string(),
			client_secret: SecretString::from("wrong"),
			tenant_name: TENANT.to_string(),
			graph_base_url: server.uri(),
			token_endpoint: format!("{}/tenant/oauth2/v2.0/token", server.uri()),
			extension_app_id: None,
			request_timeout: Duration::from_secs(5),
		})
		.unwrap();

		assert!(matches!(
			client.health_check().await,
			Err(IdentityError::Auth(_))
		));
	}

	#[tokio::test]
	async fn fetch_attributes_resolves_discovered_extension() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("POST"))
			.and(path("/directoryObjects/getAvailableExtensionProperties"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"value": [{ "name": "extension_app_extensionAttribute1" }]
			})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/users/remote-1"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"id": "remote-1",
				"displayName": "alice",
				"mail": "alice@example.com",
				"accountEnabled": true,
				"extension_app_extensionAttribute1": "Y"
			})))
			.mount(&server)
			.await;

		let attrs = client.fetch_attributes("remote-1").await.unwrap();
		assert_eq!(attrs.extension(ExtensionAttr::DummyUserFlag), Some("Y"));
		assert_eq!(attrs.account_enabled, Some(true));

		// Second lookup reuses the cached schema.
		client.fetch_attributes("remote-1").await.unwrap();
	}

	#[tokio::test]
	async fn missing_user_is_not_found() {
		let server = MockServer::start().await;
		let client = client_for(&server).await;

		Mock::given(method("PATCH"))
			.and(path("/users/gone"))
			.respond_with(ResponseTemplate::new(404).set_body_json(json!({
				"error": { "code": "Request_ResourceNotFound", "message": "Resource 'gone' does not exist." }
			})))
			.mount(&server)
			.await;

		let err = client
			.patch_password("gone", &SecretString::from("N3w#Password"))
			.await
			.unwrap_err();
		assert!(matches!(err, IdentityError::NotFound(_)));
	}
}
