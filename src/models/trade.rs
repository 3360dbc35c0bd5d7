//! Trade model for the follower's recent successful copy trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::de_utc;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "BUY")]
    Buy,
    #[serde(alias = "SELL")]
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// Executed copy trade as listed on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Backend trade log id
    pub id: i64,

    /// When the follower order was executed
    #[serde(deserialize_with = "de_utc")]
    pub timestamp: DateTime<Utc>,

    /// Trading pair copied from the master
    pub symbol: String,

    /// Follower action label (e.g., "open_long", "reduce")
    #[serde(default)]
    pub action: String,

    /// Trade direction
    pub side: TradeSide,

    /// Executed amount in base units
    pub amount: f64,

    /// Backend execution status
    #[serde(default)]
    pub status: String,

    /// Round trip from master change to follower fill
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
}

impl Trade {
    /// Execution latency for display, "N/A" when unknown.
    pub fn latency_label(&self) -> String {
        match self.execution_time_ms {
            Some(ms) => format!("{}ms", ms),
            None => "N/A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_trade() {
        let json = r#"{
            "id": 42,
            "timestamp": "2025-02-11T09:30:00.500000",
            "symbol": "BTC/USDT",
            "action": "open_long",
            "side": "buy",
            "amount": 0.1,
            "status": "success",
            "execution_time_ms": 180
        }"#;

        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.id, 42);
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.latency_label(), "180ms");
    }

    #[test]
    fn test_latency_unknown() {
        let json = r#"{"id":1,"timestamp":"2025-02-11T09:30:00Z","symbol":"ETH/USDT","side":"SELL","amount":2.0,"execution_time_ms":null}"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.latency_label(), "N/A");
    }
}
