//! Position model shared by the master and follower sides of the dashboard.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction implied by the sign of a position size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionDirection {
    Long,
    Short,
    Flat,
}

impl PositionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionDirection::Long => "LONG",
            PositionDirection::Short => "SHORT",
            PositionDirection::Flat => "FLAT",
        }
    }
}

/// A single open position as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair (e.g., "BTC/USDT")
    pub symbol: String,

    /// Signed size: positive is long, negative is short, zero is flat
    pub position_size: f64,

    /// Average entry price, absent when the backend has none recorded
    #[serde(default)]
    pub entry_price: Option<f64>,

    /// Notional value in USDT
    #[serde(default)]
    pub current_value: f64,
}

impl Position {
    pub fn direction(&self) -> PositionDirection {
        if self.position_size > 0.0 {
            PositionDirection::Long
        } else if self.position_size < 0.0 {
            PositionDirection::Short
        } else {
            PositionDirection::Flat
        }
    }

    /// Size the follower is expected to hold for this master position,
    /// rounded to 4 decimal places.
    pub fn expected_follow_size(&self, follow_ratio: f64) -> Decimal {
        let size = Decimal::try_from(self.position_size).unwrap_or(Decimal::ZERO);
        let ratio = Decimal::try_from(follow_ratio).unwrap_or(Decimal::ZERO);
        (size * ratio).round_dp(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(size: f64) -> Position {
        Position {
            symbol: "BTC/USDT".to_string(),
            position_size: size,
            entry_price: Some(50000.0),
            current_value: size.abs() * 50000.0,
        }
    }

    #[test]
    fn test_direction_from_sign() {
        assert_eq!(position(1.5).direction(), PositionDirection::Long);
        assert_eq!(position(-0.2).direction(), PositionDirection::Short);
        assert_eq!(position(0.0).direction(), PositionDirection::Flat);
    }

    #[test]
    fn test_expected_follow_size() {
        assert_eq!(position(2.0).expected_follow_size(0.1), dec!(0.2));
        assert_eq!(position(-1.0).expected_follow_size(0.5), dec!(-0.5));
        // 0.33333 * 1.0 rounds to 4 places
        assert_eq!(position(0.33333).expected_follow_size(1.0), dec!(0.3333));
    }

    #[test]
    fn test_missing_entry_price_deserializes() {
        let json = r#"{"symbol":"ETH/USDT","position_size":-3.0,"current_value":0.0}"#;
        let pos: Position = serde_json::from_str(json).unwrap();
        assert!(pos.entry_price.is_none());
        assert_eq!(pos.direction(), PositionDirection::Short);
    }
}
