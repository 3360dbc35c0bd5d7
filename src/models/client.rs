//! Client relation model for the trader-admin view.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::de_opt_utc;

/// Lifecycle status of a follower relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Active,
    Pending,
    Blocked,
}

impl RelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationStatus::Active => "active",
            RelationStatus::Pending => "pending",
            RelationStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RelationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(RelationStatus::Active),
            "pending" => Ok(RelationStatus::Pending),
            "blocked" => Ok(RelationStatus::Blocked),
            other => Err(format!("unknown relation status: {}", other)),
        }
    }
}

/// A follower attached to the logged-in trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRelation {
    /// Follower user id
    pub id: i64,

    /// Relation id, the key for updates
    pub relation_id: i64,

    /// Follower display name
    #[serde(alias = "username")]
    pub name: String,

    #[serde(default)]
    pub email: String,

    /// Multiplier applied to the master's position size
    pub copy_ratio: f64,

    pub status: RelationStatus,

    /// Account net value in USDT
    #[serde(default)]
    pub net_value: f64,

    #[serde(default)]
    pub pnl: f64,

    #[serde(default)]
    pub pnl_percentage: f64,

    #[serde(default, deserialize_with = "de_opt_utc")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "de_opt_utc")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Seen within this window counts as online.
pub const ONLINE_WINDOW_MINUTES: i64 = 5;
/// Seen within this window counts as recently offline.
pub const RECENT_WINDOW_MINUTES: i64 = 30;

/// Connection state derived from `last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    /// Offline, seen within the last half hour
    Recent,
    Offline,
    /// Never connected
    Unknown,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Recent => "away",
            Presence::Offline => "offline",
            Presence::Unknown => "never",
        }
    }
}

impl ClientRelation {
    /// Whether the client was seen less than `window` ago.
    pub fn is_online(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.last_seen
            .map(|seen| now.signed_duration_since(seen) < window)
            .unwrap_or(false)
    }

    pub fn presence(&self, now: DateTime<Utc>) -> Presence {
        if self.last_seen.is_none() {
            Presence::Unknown
        } else if self.is_online(now, chrono::Duration::minutes(ONLINE_WINDOW_MINUTES)) {
            Presence::Online
        } else if self.is_online(now, chrono::Duration::minutes(RECENT_WINDOW_MINUTES)) {
            Presence::Recent
        } else {
            Presence::Offline
        }
    }
}
