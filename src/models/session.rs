//! Client-side login session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token and the name it was issued for.
///
/// Created on successful login, destroyed on logout. The token is opaque.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, username: String) -> Self {
        Self {
            token,
            username,
            created_at: Utc::now(),
        }
    }

    /// Token prefix safe for logs.
    pub fn token_hint(&self) -> String {
        let prefix: String = self.token.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token_hint())
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish()
    }
}
