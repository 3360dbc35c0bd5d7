//! Console configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_TIMEOUT;

/// Connection and polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Backend base URL, without the `/api/v1` prefix
    pub api_url: String,

    /// SQLite URL for the session and snapshot history
    pub database: String,

    /// Dashboard refresh interval in milliseconds (0 disables polling)
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Snapshots kept in the local history
    pub history_keep: u32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            database: "sqlite:./copydesk.db?mode=rwc".to_string(),
            poll_interval_ms: 3000,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            history_keep: 500,
        }
    }
}

impl DeskConfig {
    /// Defaults overridden by environment variables:
    /// - COPYDESK_API_URL
    /// - COPYDESK_DATABASE
    /// - COPYDESK_POLL_INTERVAL_MS
    /// - COPYDESK_TIMEOUT_SECS
    /// - COPYDESK_HISTORY_KEEP
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("COPYDESK_API_URL") {
            config.api_url = url;
        }
        if let Some(db) = lookup("COPYDESK_DATABASE") {
            config.database = db;
        }
        if let Some(ms) = lookup("COPYDESK_POLL_INTERVAL_MS") {
            config.poll_interval_ms = ms
                .trim()
                .parse()
                .context("Invalid COPYDESK_POLL_INTERVAL_MS")?;
        }
        if let Some(secs) = lookup("COPYDESK_TIMEOUT_SECS") {
            config.timeout_secs = secs.trim().parse().context("Invalid COPYDESK_TIMEOUT_SECS")?;
        }
        if let Some(keep) = lookup("COPYDESK_HISTORY_KEEP") {
            config.history_keep = keep.trim().parse().context("Invalid COPYDESK_HISTORY_KEEP")?;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
