//! Task Sync Server — the synchronization backend for a multi-device,
//! offline-first task manager: vector-clock conflict resolution, a
//! push/pull protocol, and tombstone/audit bookkeeping.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod request_timing;
mod routes;
mod throttle;

use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Pool;
use crate::throttle::RateLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Parser)]
#[command(name = "task-sync-server", about = "Sync server for a multi-device task manager")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default if no subcommand is given).
    Serve,
    /// Delete expired tombstones and stale sync logs.
    Cleanup {
        /// Report what would be deleted without deleting it.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_sync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::Cleanup { dry_run } => cleanup(pool, config, dry_run).await,
    }
}

async fn serve(pool: Pool, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Task Sync Server on {}:{}", config.host, config.port);

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        rate_limiter: Arc::new(RateLimiter::new()),
    };

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(axum::middleware::from_fn(request_timing::request_timing))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Delete expired tombstones and sync logs older than their configured
/// retention windows.
async fn cleanup(pool: Pool, config: Config, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let tombstones = db::tombstones::delete_expired(&pool, dry_run).await?;
    let sync_logs =
        db::sync_logs::delete_older_than(&pool, config.sync_log_retention_days, dry_run).await?;

    if dry_run {
        tracing::info!(
            tombstones,
            sync_logs,
            "cleanup dry run: would delete {} tombstones, {} sync logs",
            tombstones,
            sync_logs
        );
    } else {
        tracing::info!(tombstones, sync_logs, "cleanup: deleted rows");
    }

    Ok(())
}
