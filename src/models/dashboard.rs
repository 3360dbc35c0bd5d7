//! Dashboard summary snapshot produced by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::de_utc;
use super::{Position, Trade};

/// Follower engine status as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineStatus {
    pub is_running: bool,
    /// "Running" or "Stopped"
    pub status: String,
    /// Backend reconciliation interval in seconds
    pub poll_interval: u64,
}

/// Most recently updated master position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterActivity {
    pub symbol: String,
    #[serde(default)]
    pub action: String,
    pub position_size: f64,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(deserialize_with = "de_utc")]
    pub timestamp: DateTime<Utc>,
}

/// Read-only snapshot of the follower's account.
///
/// Never mutated locally: actions request changes and then re-fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub user_id: i64,
    pub username: String,

    // Follow settings
    pub is_active: bool,
    pub follow_ratio: f64,
    pub master_user_id: Option<i64>,

    // Holdings
    pub total_position_value: f64,
    pub my_positions: Vec<Position>,
    pub master_positions: Vec<Position>,
    pub master_latest_activity: Option<MasterActivity>,

    pub engine_status: EngineStatus,
    pub recent_successful_trades: Vec<Trade>,

    // Unresolved trade errors
    pub has_unresolved_errors: bool,
    pub unresolved_error_count: u32,

    // P&L
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub realized_pnl: f64,
    pub realized_pnl_percent: f64,
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
}

impl DashboardSummary {
    /// Master positions the follower has no position in.
    pub fn unmatched_master_symbols(&self) -> Vec<&str> {
        self.master_positions
            .iter()
            .filter(|m| m.position_size != 0.0)
            .filter(|m| {
                !self
                    .my_positions
                    .iter()
                    .any(|p| p.symbol == m.symbol && p.position_size != 0.0)
            })
            .map(|m| m.symbol.as_str())
            .collect()
    }
}
