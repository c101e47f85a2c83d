//! Configuration management for the server.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Secret key for token validation (placeholder for auth)
    pub auth_secret: Option<String>,
    /// Per-minute rate limit for `POST /api/sync/push/`
    pub rate_limit_sync_push: u32,
    /// Per-minute rate limit for `GET /api/sync/pull/`
    pub rate_limit_sync_pull: u32,
    /// Per-minute rate limit for `POST /api/sync/conflicts/{id}/resolve/`
    pub rate_limit_conflict_resolution: u32,
    /// Days a tombstone is retained before the cleanup job deletes it
    pub tombstone_retention_days: i64,
    /// Days a sync log row is retained before the cleanup job deletes it
    pub sync_log_retention_days: i64,
    /// Deadline after which an in-flight push or pull is aborted
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let auth_secret = env::var("AUTH_SECRET").ok();

        let rate_limit_sync_push = parse_env_or("RATE_LIMIT_SYNC_PUSH", 30)?;
        let rate_limit_sync_pull = parse_env_or("RATE_LIMIT_SYNC_PULL", 60)?;
        let rate_limit_conflict_resolution = parse_env_or("RATE_LIMIT_CONFLICT_RESOLUTION", 20)?;
        let tombstone_retention_days = parse_env_or("TOMBSTONE_RETENTION_DAYS", 90)?;
        let sync_log_retention_days = parse_env_or("SYNC_LOG_RETENTION_DAYS", 30)?;
        let request_timeout_secs: u64 = parse_env_or("REQUEST_TIMEOUT_SECS", 30)?;

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            rate_limit_sync_push,
            rate_limit_sync_pull,
            rate_limit_conflict_resolution,
            tombstone_retention_days,
            sync_log_retention_days,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidSetting(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid value for {0}")]
    InvalidSetting(String),
}
