// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenAPI document for the bridge, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::{error, health, routes};

#[derive(OpenApi)]
#[openapi(
	info(
		title = "Identity Bridge API",
		version = "1.0.0",
		description = "Migrates users from the legacy password store to Microsoft Entra External ID.",
		license(name = "Proprietary")
	),
	servers((url = "/", description = "Local server")),
	tags(
		(name = "health", description = "Service and dependency health"),
		(name = "auth", description = "Legacy login with just-in-time migration"),
		(name = "webhook", description = "Sign-in callbacks from the identity provider"),
		(name = "migration", description = "Bulk and single-user migration (admin)"),
		(name = "password", description = "Password update and reset (admin)"),
		(name = "jobs", description = "Background jobs (admin)")
	),
	paths(
		routes::health::health_check,
		routes::auth::login,
		routes::auth::logout,
		routes::webhook::check_dummy_user_first_sign_in,
		routes::migration::status,
		routes::migration::progress,
		routes::migration::start,
		routes::migration::cancel,
		routes::migration::migrate_user,
		routes::password::update,
		routes::password::reset,
		routes::jobs::list,
		routes::jobs::trigger,
		routes::jobs::cancel,
	),
	components(schemas(
		error::ErrorResponse,
		health::HealthResponse,
		health::ComponentHealth,
		health::JobsHealth,
		health::HealthStatus,
		routes::auth::LoginRequest,
		routes::auth::LoginResponse,
		routes::auth::UserView,
		routes::auth::MessageResponse,
		routes::webhook::WebhookResponse,
		routes::webhook::WebhookUser,
		routes::migration::StartMigrationRequest,
		routes::migration::StartMigrationResponse,
		routes::migration::MigrateUserRequest,
		routes::migration::MigrateUserResponse,
		routes::migration::MigrationStatusResponse,
		routes::migration::OutcomeView,
		routes::migration::OutcomeStatus,
		routes::migration::BatchSummary,
		routes::migration::CancelResponse,
		routes::password::UpdatePasswordRequest,
		routes::password::UpdatePasswordResponse,
		routes::password::ResetPasswordResponse,
		routes::password::EntraSync,
		routes::jobs::TriggerJobResponse,
		routes::jobs::CancelJobResponse,
		idbridge_server_db::MigrationStats,
	))
)]
pub struct ApiDoc;
