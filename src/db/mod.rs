//! Local persistence for the console.
//!
//! Stores:
//! - The login session (single row, replaced on login, deleted on logout)
//! - Dashboard snapshot history recorded by the watch view

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, warn};

use crate::models::{DashboardSummary, Session};

/// SQLite connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Session row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredSession {
    token: String,
    username: String,
    created_at: String,
}

/// Dashboard snapshot recorded while watching.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotPoint {
    pub id: i64,
    pub recorded_at: String,
    pub username: String,
    pub is_active: bool,
    pub follow_ratio: f64,
    pub total_position_value: f64,
    pub unrealized_pnl: f64,
    pub my_position_count: i64,
}

impl Database {
    /// Open (and create if needed) the database.
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Each in-memory connection is its own database, so keep exactly one alive
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                token TEXT NOT NULL,
                username TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL,
                follow_ratio REAL NOT NULL,
                total_position_value REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                my_position_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_time ON snapshots(recorded_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Session ====================

    /// Load the stored session, if any.
    pub async fn load_session(&self) -> Result<Option<Session>> {
        let row: Option<StoredSession> =
            sqlx::query_as("SELECT token, username, created_at FROM session WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read session")?;

        Ok(row.map(|r| {
            let created_at = match DateTime::parse_from_rfc3339(&r.created_at) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    warn!(value = %r.created_at, error = %e, "Stored session has an unreadable timestamp");
                    Utc::now()
                }
            };
            Session {
                token: r.token,
                username: r.username,
                created_at,
            }
        }))
    }

    /// Replace the stored session.
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session (id, token, username, created_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                token = excluded.token,
                username = excluded.username,
                created_at = excluded.created_at
            "#,
        )
        .bind(&session.token)
        .bind(&session.username)
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        debug!(username = %session.username, "Session saved");
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub async fn clear_session(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session WHERE id = 1")
            .execute(&self.pool)
            .await
            .context("Failed to clear session")?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Snapshots ====================

    /// Record a dashboard snapshot.
    pub async fn record_snapshot(&self, summary: &DashboardSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (
                recorded_at, username, is_active, follow_ratio,
                total_position_value, unrealized_pnl, my_position_count
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&summary.username)
        .bind(summary.is_active)
        .bind(summary.follow_ratio)
        .bind(summary.total_position_value)
        .bind(summary.unrealized_pnl)
        .bind(summary.my_positions.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a snapshot and drop all but the `keep` most recent.
    pub async fn record_snapshot_capped(&self, summary: &DashboardSummary, keep: u32) -> Result<u64> {
        self.record_snapshot(summary).await?;
        let pruned = self.prune_snapshots(keep).await?;
        if pruned > 0 {
            debug!(pruned, keep, "Pruned old snapshots");
        }
        Ok(pruned)
    }

    /// Most recent snapshots, newest first.
    pub async fn recent_snapshots(&self, limit: u32) -> Result<Vec<SnapshotPoint>> {
        sqlx::query_as::<_, SnapshotPoint>(
            "SELECT * FROM snapshots ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read snapshots")
    }

    /// Drop snapshots older than `keep` most recent rows.
    pub async fn prune_snapshots(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM snapshots WHERE id NOT IN (
                SELECT id FROM snapshots ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = memory_db().await;
        assert!(db.load_session().await.unwrap().is_none());

        let session = Session::new("token-1".to_string(), "alice".to_string());
        db.save_session(&session).await.unwrap();

        let loaded = db.load_session().await.unwrap().unwrap();
        assert_eq!(loaded.token, "token-1");
        assert_eq!(loaded.username, "alice");

        // Login as someone else replaces the row
        db.save_session(&Session::new("token-2".to_string(), "bob".to_string()))
            .await
            .unwrap();
        assert_eq!(db.load_session().await.unwrap().unwrap().username, "bob");

        assert!(db.clear_session().await.unwrap());
        assert!(!db.clear_session().await.unwrap());
        assert!(db.load_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_history() {
        let db = memory_db().await;

        for i in 0..5 {
            let summary = DashboardSummary {
                username: "alice".to_string(),
                is_active: i % 2 == 0,
                follow_ratio: 0.1,
                total_position_value: 1000.0 * i as f64,
                ..Default::default()
            };
            db.record_snapshot(&summary).await.unwrap();
        }

        let recent = db.recent_snapshots(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].total_position_value, 4000.0);
        assert!(recent[0].is_active);

        assert_eq!(db.prune_snapshots(2).await.unwrap(), 3);
        assert_eq!(db.recent_snapshots(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_capped_history_never_exceeds_keep() {
        let db = memory_db().await;

        for i in 0..7 {
            let summary = DashboardSummary {
                username: "alice".to_string(),
                total_position_value: i as f64,
                ..Default::default()
            };
            db.record_snapshot_capped(&summary, 3).await.unwrap();
            assert!(db.recent_snapshots(100).await.unwrap().len() <= 3);
        }

        let kept = db.recent_snapshots(100).await.unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].total_position_value, 6.0);
        assert_eq!(kept[2].total_position_value, 4.0);
    }

    #[tokio::test]
    async fn test_unreadable_session_timestamp_still_loads() {
        let db = memory_db().await;
        sqlx::query("INSERT INTO session (id, token, username, created_at) VALUES (1, 't', 'alice', 'garbage')")
            .execute(&db.pool)
            .await
            .unwrap();

        let session = db.load_session().await.unwrap().unwrap();
        assert_eq!(session.username, "alice");
        assert!(Utc::now() - session.created_at < chrono::Duration::minutes(1));
    }
}
