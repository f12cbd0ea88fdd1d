// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::Json;
use utoipa::OpenApi;

use crate::api_docs::ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
	Json(ApiDoc::openapi())
}
