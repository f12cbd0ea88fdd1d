// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared-key authentication for the admin API.

use axum::{
	extract::{Request, State},
	middleware::Next,
	response::{IntoResponse, Response},
};
use tracing::warn;

use crate::api::AppState;
use crate::error::ApiError;

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

pub async fn require_admin_key(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Response {
	let provided = request
		.headers()
		.get(ADMIN_API_KEY_HEADER)
		.and_then(|value| value.to_str().ok());

	match provided {
		Some(key) if !state.admin_api_key.is_empty() && state.admin_api_key.ct_eq_str(key) => {
			next.run(request).await
		}
		Some(_) => {
			warn!(path = %request.uri().path(), "admin request with invalid API key");
			ApiError::Unauthorized("Invalid admin API key".to_string()).into_response()
		}
		None => {
			warn!(path = %request.uri().path(), "admin request without API key");
			ApiError::Unauthorized("Admin API key required".to_string()).into_response()
		}
	}
}
