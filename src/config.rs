// =============================================================================
// CONFIGURATION MODULE
// =============================================================================
// This module handles loading configuration from environment variables.
//
// VARIABLES:
// - PORT                         HTTP port (default 8003)
// - ALERT_LOG_BACKEND            file | memory | redis (default file)
// - ALERT_LOG_PATH               file backend location
//                                (default data/alert_logs.json)
// - REDIS_URL                    required when the backend is redis
// - ALERT_LOG_KEY                redis key holding the log
//                                (default toilet_paper_alert_logs)
// - NOTIFICATION_QUEUE_CAPACITY  pending theft notifications (default 64)
// - STREAM_BUFFER_CAPACITY       pending snapshot batches (default 256)
// - BOARD_MODE                   upsert | replace (default upsert)
// =============================================================================

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::monitor::BoardMode;
use crate::store::LOG_STORAGE_KEY;

/// Where the alert log is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBackendConfig {
    Memory,
    File { path: PathBuf },
    Redis { url: String, key: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 8003)
    pub port: u16,

    pub alert_log: LogBackendConfig,

    /// Bound of the theft notification queue
    pub notification_queue_capacity: usize,

    /// Bound of the snapshot batch queue between ingest and the monitor
    pub stream_buffer_capacity: usize,

    /// Whether a snapshot batch patches the stall board or replaces it
    pub board_mode: BoardMode,
}

impl Config {
    /// Creates a Config by reading environment variables.
    ///
    /// # Returns
    /// - `Ok(Config)` if every variable that is set parses
    /// - `Err` naming the offending variable otherwise
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8003".to_string())
            .parse()
            .context("Failed to parse PORT as a number")?;

        let backend = env::var("ALERT_LOG_BACKEND").unwrap_or_else(|_| "file".to_string());
        let alert_log = match backend.to_ascii_lowercase().as_str() {
            "memory" => LogBackendConfig::Memory,
            "file" => LogBackendConfig::File {
                path: env::var("ALERT_LOG_PATH")
                    .unwrap_or_else(|_| "data/alert_logs.json".to_string())
                    .into(),
            },
            "redis" => LogBackendConfig::Redis {
                url: env::var("REDIS_URL")
                    .context("REDIS_URL environment variable is required for the redis backend")?,
                key: env::var("ALERT_LOG_KEY").unwrap_or_else(|_| LOG_STORAGE_KEY.to_string()),
            },
            other => bail!("Unknown ALERT_LOG_BACKEND {other:?} (expected file, memory or redis)"),
        };

        let board_mode = match env::var("BOARD_MODE")
            .unwrap_or_else(|_| "upsert".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "upsert" => BoardMode::Upsert,
            "replace" => BoardMode::Replace,
            other => bail!("Unknown BOARD_MODE {other:?} (expected upsert or replace)"),
        };

        Ok(Self {
            port,
            board_mode,
            alert_log,
            notification_queue_capacity: capacity("NOTIFICATION_QUEUE_CAPACITY", 64)?,
            stream_buffer_capacity: capacity("STREAM_BUFFER_CAPACITY", 256)?,
        })
    }
}

/// Read a positive queue bound. tokio channels panic on a zero capacity.
fn capacity(name: &str, default: usize) -> Result<usize> {
    let value = match env::var(name) {
        Ok(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("Failed to parse {name} as a number"))?,
        Err(_) => default,
    };
    if value == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(value)
}
