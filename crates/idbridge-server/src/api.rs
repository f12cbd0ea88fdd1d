// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	middleware,
	routing::{get, post},
	Router,
};
use idbridge_common_secret::SecretString;
use idbridge_server_auth::{LoginService, PasswordService, SessionTokens};
use idbridge_server_config::{MigrationConfig, ServerConfig};
use idbridge_server_db::{
	JobRepository, LegacyUserRepository, LocalUserStore, SignInRepository, SignInStore,
};
use idbridge_server_entra::IdentityStore;
use idbridge_server_jobs::{JobScheduler, ReconciliationJob};
use idbridge_server_migration::{
	BatchMigrationOrchestrator, JitLoginMigrator, MigrationRunRegistry, NotificationQueue,
	SingleUserMigrator,
};
use idbridge_server_smtp::SmtpClient;
use sqlx::SqlitePool;

use crate::admin_auth::require_admin_key;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub users: Arc<dyn LocalUserStore>,
	pub sign_ins: Arc<dyn SignInStore>,
	pub identity: Arc<dyn IdentityStore>,
	/// False when the server runs without an identity provider configured.
	pub identity_enabled: bool,
	pub migrator: Arc<SingleUserMigrator>,
	pub orchestrator: Arc<BatchMigrationOrchestrator>,
	pub runs: Arc<MigrationRunRegistry>,
	pub login: Arc<LoginService>,
	pub passwords: Arc<PasswordService>,
	pub scheduler: Option<Arc<JobScheduler>>,
	pub smtp: Option<Arc<SmtpClient>>,
	pub admin_api_key: SecretString,
	pub migration: MigrationConfig,
}

impl AppState {
	pub fn with_scheduler(mut self, scheduler: Arc<JobScheduler>) -> Self {
		self.scheduler = Some(scheduler);
		self
	}

	pub fn with_smtp(mut self, smtp: Arc<SmtpClient>) -> Self {
		self.smtp = Some(smtp);
		self
	}
}

/// Wire repositories, the identity store and the migration services together.
pub fn create_app_state(
	config: &ServerConfig,
	pool: SqlitePool,
	identity: Arc<dyn IdentityStore>,
	notifications: Option<NotificationQueue>,
) -> AppState {
	let users: Arc<dyn LocalUserStore> = Arc::new(LegacyUserRepository::new(pool.clone()));
	let sign_ins: Arc<dyn SignInStore> = Arc::new(SignInRepository::new(pool.clone()));

	let mut migrator = SingleUserMigrator::new(Arc::clone(&users), Arc::clone(&identity))
		.with_temporary_password_length(config.migration.temporary_password_length);
	if let Some(queue) = notifications {
		migrator = migrator.with_notifications(queue);
	}
	let migrator = Arc::new(migrator);

	let sessions = SessionTokens::new(
		&config.auth.jwt_secret,
		Duration::from_secs(config.auth.session_ttl_secs),
	);
	let mut login = LoginService::new(Arc::clone(&users), sessions);
	let mut passwords = PasswordService::new(
		Arc::clone(&users),
		config.auth.min_password_length,
		config.migration.temporary_password_length,
	);
	if config.entra.enabled {
		login = login.with_jit_migration(Arc::new(JitLoginMigrator::new(Arc::clone(&migrator))));
		passwords = passwords.with_identity_store(Arc::clone(&identity));
	}

	AppState {
		pool,
		users,
		sign_ins,
		identity,
		identity_enabled: config.entra.enabled,
		orchestrator: Arc::new(BatchMigrationOrchestrator::new(Arc::clone(&migrator))),
		migrator,
		runs: MigrationRunRegistry::new(),
		login: Arc::new(login),
		passwords: Arc::new(passwords),
		scheduler: None,
		smtp: None,
		admin_api_key: config.auth.admin_api_key.clone(),
		migration: config.migration.clone(),
	}
}

/// Register background jobs. The caller starts the scheduler.
pub fn create_job_scheduler(state: &AppState) -> JobScheduler {
	let mut scheduler = JobScheduler::new(JobRepository::new(state.pool.clone()));

	let interval = state.migration.reconciliation_interval_secs;
	if state.identity_enabled && interval > 0 {
		scheduler.register_periodic(
			Arc::new(ReconciliationJob::new(Arc::clone(&state.migrator))),
			Duration::from_secs(interval),
		);
	}

	scheduler
}

pub fn create_router(state: AppState) -> Router {
	let admin = Router::new()
		.route("/migration/status", get(routes::migration::status))
		.route("/migration/progress", get(routes::migration::progress))
		.route("/migration/start", post(routes::migration::start))
		.route("/migration/cancel", post(routes::migration::cancel))
		.route("/migration/user/{id}", post(routes::migration::migrate_user))
		.route("/password/update/{id}", post(routes::password::update))
		.route("/password/reset/{id}", post(routes::password::reset))
		.route("/jobs", get(routes::jobs::list))
		.route("/jobs/{id}/run", post(routes::jobs::trigger))
		.route("/jobs/{id}/cancel", post(routes::jobs::cancel))
		.route_layer(middleware::from_fn_with_state(
			state.clone(),
			require_admin_key,
		));

	let public = Router::new()
		.route("/auth/login", post(routes::auth::login))
		.route("/auth/logout", post(routes::auth::logout))
		.route(
			"/auth/check-dummy-user-first-sign-in",
			post(routes::webhook::check_dummy_user_first_sign_in),
		)
		.route(
			"/auth/check-dummy-user-first-sign-in-token-issuance-start",
			post(routes::webhook::check_dummy_user_first_sign_in),
		)
		.route("/openapi.json", get(routes::docs::openapi));

	Router::new()
		.route("/health", get(routes::health::health_check))
		.nest("/api", public.merge(admin))
		.with_state(state)
}
