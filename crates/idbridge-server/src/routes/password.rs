// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	body::Bytes,
	extract::{Path, State},
	Json,
};
use idbridge_common_secret::SecretString;
use idbridge_server_auth::RemoteSync;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{ApiError, ErrorResponse};
use crate::validation::parse_json_or_default;

#[derive(Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
	#[schema(value_type = Option<String>)]
	pub new_password: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum EntraSync {
	NotMigrated,
	Synced,
	Failed,
}

impl From<RemoteSync> for EntraSync {
	fn from(sync: RemoteSync) -> Self {
		match sync {
			RemoteSync::NotMigrated => EntraSync::NotMigrated,
			RemoteSync::Synced => EntraSync::Synced,
			RemoteSync::Failed => EntraSync::Failed,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordResponse {
	pub message: String,
	pub entra_sync: EntraSync,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordResponse {
	pub message: String,
	/// Returned once; only its hash is stored.
	pub temporary_password: String,
	pub entra_sync: EntraSync,
}

#[utoipa::path(
	post,
	path = "/api/password/update/{id}",
	params(("id" = String, Path, description = "Legacy user id")),
	request_body = UpdatePasswordRequest,
	responses(
		(status = 200, description = "Password updated", body = UpdatePasswordResponse),
		(status = 400, description = "Password missing or too short", body = ErrorResponse),
		(status = 404, description = "User not found", body = ErrorResponse)
	),
	tag = "password"
)]
#[instrument(skip(state, body))]
pub async fn update(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Bytes,
) -> Result<Json<UpdatePasswordResponse>, ApiError> {
	let request: UpdatePasswordRequest = parse_json_or_default(&body)?;
	let Some(new_password) = request.new_password else {
		return Err(ApiError::BadRequest("newPassword is required".to_string()));
	};

	let sync = state.passwords.update_password(&id, &new_password).await?;
	Ok(Json(UpdatePasswordResponse {
		message: "Password updated successfully".to_string(),
		entra_sync: sync.into(),
	}))
}

#[utoipa::path(
	post,
	path = "/api/password/reset/{id}",
	params(("id" = String, Path, description = "Legacy user id")),
	responses(
		(status = 200, description = "Temporary password issued", body = ResetPasswordResponse),
		(status = 404, description = "User not found", body = ErrorResponse)
	),
	tag = "password"
)]
#[instrument(skip(state))]
pub async fn reset(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<ResetPasswordResponse>, ApiError> {
	let (temporary, sync) = state.passwords.reset_password(&id).await?;
	Ok(Json(ResetPasswordResponse {
		message: "Password reset successfully".to_string(),
		temporary_password: temporary.expose().clone(),
		entra_sync: sync.into(),
	}))
}
