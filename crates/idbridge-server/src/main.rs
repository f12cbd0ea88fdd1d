// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity bridge server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use idbridge_common_http::RetryConfig;
use idbridge_server::routes::migration::{BatchSummary, OutcomeView, StartMigrationRequest};
use idbridge_server::{
	create_app_state, create_identity_store, create_job_scheduler, create_router, AppState,
};
use idbridge_server_config::{LogFormat, ServerConfig};
use idbridge_server_migration::{BatchOptions, NotificationQueue};
use idbridge_server_smtp::{SmtpClient, SmtpNotificationSender};
use tokio::task::JoinHandle;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
	name = "idbridge-server",
	about = "Migrates legacy users to Microsoft Entra External ID",
	version
)]
struct Cli {
	/// Configuration file, overriding the system default path.
	#[arg(long, env = "IDBRIDGE_SERVER_CONFIG_FILE")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server (default)
	Serve,
	/// Run one bulk migration and exit
	Migrate(MigrateArgs),
	/// Show version information
	Version,
}

#[derive(Args, Debug)]
struct MigrateArgs {
	#[arg(long)]
	batch_size: Option<u64>,
	/// Delay between batches in milliseconds.
	#[arg(long)]
	delay_ms: Option<u64>,
	#[arg(long)]
	limit: Option<u64>,
	#[arg(long)]
	send_emails: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let command = cli.command.unwrap_or(Command::Serve);

	if let Command::Version = command {
		println!("idbridge-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &cli.config {
		Some(path) => idbridge_server_config::load_config_with_file(path.clone())?,
		None => idbridge_server_config::load_config()?,
	};
	init_tracing(&config);

	let pool = idbridge_server_db::create_pool(&config.database.url)
		.await
		.context("failed to open database")?;
	idbridge_server_db::run_migrations(&pool)
		.await
		.context("failed to apply database migrations")?;

	let identity = create_identity_store(&config.entra).context("failed to build Graph client")?;
	let smtp = match &config.smtp {
		Some(smtp) => Some(Arc::new(
			SmtpClient::new(smtp).context("invalid SMTP configuration")?,
		)),
		None => None,
	};
	let (notifications, notification_worker) = match &smtp {
		Some(client) => {
			let (queue, worker) = start_notifications(&config, Arc::clone(client));
			(Some(queue), Some(worker))
		}
		None => {
			tracing::warn!("SMTP not configured, temporary passwords are returned in migration results");
			(None, None)
		}
	};

	let mut state = create_app_state(&config, pool, identity, notifications);
	if let Some(smtp) = smtp {
		state = state.with_smtp(smtp);
	}

	match command {
		Command::Migrate(migrate) => run_migration(state, &config, migrate).await?,
		Command::Serve | Command::Version => serve(state, &config).await?,
	}

	// Dropping the state closed the queue; give the worker time to drain it.
	if let Some(worker) = notification_worker {
		if tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, worker)
			.await
			.is_err()
		{
			tracing::warn!("notification queue not drained before shutdown");
		}
	}
	tracing::info!("shutdown complete");
	Ok(())
}

fn init_tracing(config: &ServerConfig) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Json => registry.with(fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(fmt::layer()).init(),
	}
}

fn start_notifications(
	config: &ServerConfig,
	smtp: Arc<SmtpClient>,
) -> (NotificationQueue, JoinHandle<()>) {
	let sender = Arc::new(SmtpNotificationSender::new(
		smtp,
		Some(config.http.base_url.clone()),
	));
	let retry = RetryConfig {
		max_attempts: config.migration.notification_max_attempts,
		..RetryConfig::default()
	};
	NotificationQueue::start(sender, config.migration.notification_queue_capacity, retry)
}

async fn serve(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		identity_provider = config.entra.enabled,
		"starting idbridge-server"
	);

	let scheduler = Arc::new(create_job_scheduler(&state));
	if let Err(e) = scheduler.start().await {
		tracing::error!(error = %e, "failed to start job scheduler");
	}
	let runs = Arc::clone(&state.runs);

	let app = create_router(state.with_scheduler(Arc::clone(&scheduler)))
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	tracing::info!(%addr, "listening");

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received shutdown signal");
			if runs.cancel_active() {
				tracing::info!("cancelled active migration run");
			}
			scheduler.shutdown().await;
		}
	}
	Ok(())
}

async fn run_migration(
	state: AppState,
	config: &ServerConfig,
	args: MigrateArgs,
) -> anyhow::Result<()> {
	let request = StartMigrationRequest {
		batch_size: args.batch_size,
		delay_between_batches: args.delay_ms,
		limit: args.limit,
		send_emails: Some(args.send_emails),
	};
	let options: BatchOptions =
		idbridge_server::validation::batch_options(&request, &config.migration)?;

	let run = state.runs.begin()?;
	let cancel = run.cancel_token().clone();
	let ctrl_c = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("received interrupt, finishing in-flight migrations");
			cancel.cancel();
		}
	});

	let result = state
		.orchestrator
		.run_tracked(&options, run.cancel_token(), Some(run.progress()))
		.await?;
	ctrl_c.abort();

	tracing::info!(
		total = result.total_processed(),
		successful = result.successful(),
		failed = result.failed(),
		skipped = result.skipped(),
		cancelled = result.cancelled,
		"bulk migration finished"
	);

	// Results go to stdout so unsent temporary passwords can be handed over.
	let report = serde_json::json!({
		"summary": BatchSummary::from(&result),
		"results": result.outcomes().iter().map(OutcomeView::from).collect::<Vec<_>>(),
	});
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}
