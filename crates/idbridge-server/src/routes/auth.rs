// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Legacy login, with just-in-time migration behind it.

use axum::{body::Bytes, extract::State, Json};
use idbridge_common_secret::SecretString;
use idbridge_server_db::LegacyUser;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{ApiError, ErrorResponse};
use crate::validation::parse_json_or_default;

#[derive(Default, Deserialize, ToSchema)]
pub struct LoginRequest {
	pub email: Option<String>,
	#[schema(value_type = Option<String>)]
	pub password: Option<SecretString>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
	pub id: String,
	pub email: String,
	pub username: String,
	pub migrated_to_entra: bool,
	pub entra_user_id: Option<String>,
}

impl From<LegacyUser> for UserView {
	fn from(user: LegacyUser) -> Self {
		Self {
			id: user.id,
			email: user.email,
			username: user.username,
			migrated_to_entra: user.migrated_to_entra,
			entra_user_id: user.entra_user_id,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
	pub message: String,
	pub token: String,
	pub user: UserView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
	pub message: String,
}

#[utoipa::path(
	post,
	path = "/api/auth/login",
	request_body = LoginRequest,
	responses(
		(status = 200, description = "Credentials accepted", body = LoginResponse),
		(status = 400, description = "Email or password missing", body = ErrorResponse),
		(status = 401, description = "Invalid credentials", body = ErrorResponse),
		(status = 403, description = "Account disabled", body = ErrorResponse)
	),
	tag = "auth"
)]
pub async fn login(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
	let request: LoginRequest = parse_json_or_default(&body)?;
	let (Some(email), Some(password)) = (request.email, request.password) else {
		return Err(ApiError::BadRequest(
			"Email and password are required".to_string(),
		));
	};
	if email.trim().is_empty() || password.is_empty() {
		return Err(ApiError::BadRequest(
			"Email and password are required".to_string(),
		));
	}

	let result = state.login.login(email.trim(), &password).await?;
	Ok(Json(LoginResponse {
		message: "Login successful".to_string(),
		token: result.token,
		user: result.user.into(),
	}))
}

/// Sessions are stateless tokens; logout only tells the client to drop its copy.
#[utoipa::path(
	post,
	path = "/api/auth/logout",
	responses((status = 200, description = "Logged out", body = MessageResponse)),
	tag = "auth"
)]
pub async fn logout() -> Json<MessageResponse> {
	Json(MessageResponse {
		message: "Logout successful".to_string(),
	})
}
