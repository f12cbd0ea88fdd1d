// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sign-in webhook called by the identity provider.
//!
//! Dummy accounts (extension attribute 1 set to `Y`) are blocked on their
//! first sign-in. Every other case lets the flow continue, including
//! malformed payloads and internal failures, so that the webhook can never
//! lock ordinary users out.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use idbridge_server_entra::ExtensionAttr;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::api::AppState;

const SUBMIT_RESPONSE_TYPE: &str = "microsoft.graph.onAttributeCollectionSubmitResponseData";
const SHOW_BLOCK_PAGE: &str = "microsoft.graph.attributeCollectionSubmit.showBlockPage";
const CONTINUE_DEFAULT: &str = "microsoft.graph.attributeCollectionSubmit.continueWithDefaultBehavior";
const BLOCK_TITLE: &str = "Access Denied";
const BLOCK_MESSAGE: &str = "Dummy user accounts are restricted from signing in for the first time. Please contact your system administrator for assistance.";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookUser {
	pub id: String,
	pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
	pub status: String,
	pub status_code: u16,
	pub message: String,
	pub user: WebhookUser,
	#[schema(value_type = Object)]
	pub data: Value,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
	Block,
	Continue,
}

/// Fields pulled out of the callback payload.
#[derive(Debug)]
struct SignInEvent {
	user_id: String,
	email: Option<String>,
	attributes: Map<String, Value>,
}

fn parse_event(body: &[u8]) -> Option<SignInEvent> {
	let payload: Value = serde_json::from_slice(body).ok()?;
	let data = payload.get("data")?;
	let user = data.pointer("/authenticationContext/user")?;
	let user_id = user.get("id")?.as_str()?.trim();
	if user_id.is_empty() {
		return None;
	}
	let email = user.get("mail").and_then(Value::as_str).map(str::to_string);
	let attributes = data
		.pointer("/userSignUpInfo/attributes")
		.and_then(Value::as_object)
		.cloned()
		.unwrap_or_default();

	Some(SignInEvent {
		user_id: user_id.to_string(),
		email,
		attributes,
	})
}

fn is_dummy_flag(value: &str) -> bool {
	value.trim().eq_ignore_ascii_case("y")
}

fn action_data(action: Value) -> Value {
	json!({
		"@odata.type": SUBMIT_RESPONSE_TYPE,
		"actions": [action],
	})
}

fn continue_data() -> Value {
	action_data(json!({ "@odata.type": CONTINUE_DEFAULT }))
}

fn block_data() -> Value {
	action_data(json!({
		"@odata.type": SHOW_BLOCK_PAGE,
		"title": BLOCK_TITLE,
		"message": BLOCK_MESSAGE,
	}))
}

/// The bare continue action, used when the event could not be evaluated.
fn fallback_continue() -> axum::response::Response {
	(StatusCode::OK, Json(json!({ "data": continue_data() }))).into_response()
}

async fn dummy_flag(state: &AppState, event: &SignInEvent) -> Option<String> {
	let schema = state.identity.extension_schema().await;
	if let Some(value) = schema.lookup(ExtensionAttr::DummyUserFlag, &event.attributes) {
		return Some(value);
	}
	if !state.identity_enabled {
		return None;
	}
	match state.identity.fetch_attributes(&event.user_id).await {
		Ok(attributes) => attributes
			.extension(ExtensionAttr::DummyUserFlag)
			.map(str::to_string),
		Err(e) => {
			warn!(user_id = %event.user_id, error = %e, "could not read remote attributes for sign-in");
			None
		}
	}
}

async fn decide(state: &AppState, event: &SignInEvent) -> Result<Decision, idbridge_server_db::DbError> {
	let is_dummy = dummy_flag(state, event)
		.await
		.is_some_and(|value| is_dummy_flag(&value));
	if !is_dummy {
		return Ok(Decision::Continue);
	}

	if !state.sign_ins.has_signed_in(&event.user_id).await? {
		return Ok(Decision::Block);
	}
	state.sign_ins.record_sign_in(&event.user_id).await?;
	Ok(Decision::Continue)
}

#[utoipa::path(
	post,
	path = "/api/auth/check-dummy-user-first-sign-in",
	request_body(content = Object, content_type = "application/json", description = "Identity provider sign-in callback payload"),
	responses(
		(status = 200, description = "Continue with the default sign-in flow", body = WebhookResponse),
		(status = 403, description = "First sign-in of a dummy account is blocked", body = WebhookResponse)
	),
	tag = "webhook"
)]
pub async fn check_dummy_user_first_sign_in(
	State(state): State<AppState>,
	body: Bytes,
) -> axum::response::Response {
	let Some(event) = parse_event(&body) else {
		warn!("sign-in webhook payload missing user id");
		return fallback_continue();
	};

	let decision = match decide(&state, &event).await {
		Ok(decision) => decision,
		Err(e) => {
			warn!(user_id = %event.user_id, error = %e, "sign-in check failed, allowing sign-in");
			return fallback_continue();
		}
	};

	let user = WebhookUser {
		id: event.user_id,
		email: event.email,
	};
	match decision {
		Decision::Block => {
			info!(user_id = %user.id, "blocked first sign-in of dummy account");
			let body = WebhookResponse {
				status: "blocked".to_string(),
				status_code: StatusCode::FORBIDDEN.as_u16(),
				message: BLOCK_MESSAGE.to_string(),
				user,
				data: block_data(),
			};
			(StatusCode::FORBIDDEN, Json(body)).into_response()
		}
		Decision::Continue => {
			debug!(user_id = %user.id, "sign-in allowed");
			let body = WebhookResponse {
				status: "success".to_string(),
				status_code: StatusCode::OK.as_u16(),
				message: "Authentication allowed".to_string(),
				user,
				data: continue_data(),
			};
			(StatusCode::OK, Json(body)).into_response()
		}
	}
}
