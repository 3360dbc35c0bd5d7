//! Client table editor with pending edits.
//!
//! Input lands in a per-row pending buffer and is shown immediately. A commit
//! sends the update; the server's answer becomes the row's value on success,
//! and the buffer is reverted on failure.

use tracing::{info, warn};

use crate::api::{ApiError, ApiResult, TraderBackend, UpdateClientRequest, UpdateClientResponse};
use crate::models::{ClientRelation, RelationStatus};

/// Parse copy-ratio input. Anything that is not a finite number becomes 0.
pub fn parse_copy_ratio(input: &str) -> f64 {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// A client relation plus uncommitted local edits.
#[derive(Debug, Clone)]
pub struct ClientRow {
    pub relation: ClientRelation,
    pending_ratio: Option<f64>,
    pending_status: Option<RelationStatus>,
}

impl ClientRow {
    fn new(relation: ClientRelation) -> Self {
        Self {
            relation,
            pending_ratio: None,
            pending_status: None,
        }
    }

    /// Copy ratio as displayed: the pending edit if any.
    pub fn display_ratio(&self) -> f64 {
        self.pending_ratio.unwrap_or(self.relation.copy_ratio)
    }

    pub fn display_status(&self) -> RelationStatus {
        self.pending_status.unwrap_or(self.relation.status)
    }

    pub fn has_pending(&self) -> bool {
        self.pending_ratio.is_some() || self.pending_status.is_some()
    }
}

/// Client counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub active: usize,
    pub pending: usize,
    pub blocked: usize,
}

/// Trader-admin client table.
#[derive(Debug, Clone, Default)]
pub struct ClientTable {
    rows: Vec<ClientRow>,
}

impl ClientTable {
    pub fn new(clients: Vec<ClientRelation>) -> Self {
        Self {
            rows: clients.into_iter().map(ClientRow::new).collect(),
        }
    }

    /// Fetch the trader's clients.
    pub async fn load<B: TraderBackend>(backend: &B) -> ApiResult<Self> {
        let clients = backend.clients().await?;
        info!(count = clients.len(), "Loaded client relations");
        Ok(Self::new(clients))
    }

    /// Replace rows with a fresh server listing, keeping pending edits of
    /// rows that are still present.
    pub fn replace(&mut self, clients: Vec<ClientRelation>) {
        let mut fresh: Vec<ClientRow> = clients.into_iter().map(ClientRow::new).collect();
        for row in &mut fresh {
            if let Some(old) = self
                .rows
                .iter()
                .find(|r| r.relation.relation_id == row.relation.relation_id)
            {
                row.pending_ratio = old.pending_ratio;
                row.pending_status = old.pending_status;
            }
        }
        self.rows = fresh;
    }

    pub fn row(&self, relation_id: i64) -> Option<&ClientRow> {
        self.rows.iter().find(|r| r.relation.relation_id == relation_id)
    }

    fn row_mut(&mut self, relation_id: i64) -> ApiResult<&mut ClientRow> {
        self.rows
            .iter_mut()
            .find(|r| r.relation.relation_id == relation_id)
            .ok_or_else(|| ApiError::Invalid(format!("unknown relation id {}", relation_id)))
    }

    /// Apply copy-ratio input locally. Returns the parsed value.
    pub fn edit_copy_ratio(&mut self, relation_id: i64, input: &str) -> ApiResult<f64> {
        let ratio = parse_copy_ratio(input);
        self.row_mut(relation_id)?.pending_ratio = Some(ratio);
        Ok(ratio)
    }

    /// Send the pending copy ratio. `Ok(None)` when there is nothing to send.
    pub async fn commit_copy_ratio<B: TraderBackend>(
        &mut self,
        backend: &B,
        relation_id: i64,
    ) -> ApiResult<Option<UpdateClientResponse>> {
        let row = self.row_mut(relation_id)?;
        let Some(ratio) = row.pending_ratio else {
            return Ok(None);
        };

        if ratio < 0.0 {
            row.pending_ratio = None;
            return Err(ApiError::Invalid("copy ratio cannot be negative".to_string()));
        }

        let request = UpdateClientRequest {
            relation_id,
            copy_ratio: Some(ratio),
            status: None,
        };
        let result = backend.update_client(&request).await;

        let row = self.row_mut(relation_id)?;
        row.pending_ratio = None;
        match result {
            Ok(confirmed) => {
                row.relation.copy_ratio = confirmed.copy_ratio;
                row.relation.status = confirmed.status;
                info!(relation_id, copy_ratio = confirmed.copy_ratio, "Copy ratio updated");
                Ok(Some(confirmed))
            }
            Err(e) => {
                warn!(relation_id, error = %e, "Copy ratio update failed, reverted");
                Err(e)
            }
        }
    }

    /// Change a client's status. Shown immediately, committed right away.
    pub async fn set_status<B: TraderBackend>(
        &mut self,
        backend: &B,
        relation_id: i64,
        status: RelationStatus,
    ) -> ApiResult<UpdateClientResponse> {
        self.row_mut(relation_id)?.pending_status = Some(status);

        let request = UpdateClientRequest {
            relation_id,
            copy_ratio: None,
            status: Some(status),
        };
        let result = backend.update_client(&request).await;

        let row = self.row_mut(relation_id)?;
        row.pending_status = None;
        match result {
            Ok(confirmed) => {
                row.relation.status = confirmed.status;
                row.relation.copy_ratio = confirmed.copy_ratio;
                info!(relation_id, status = %confirmed.status, "Client status updated");
                Ok(confirmed)
            }
            Err(e) => {
                warn!(relation_id, error = %e, "Status update failed, reverted");
                Err(e)
            }
        }
    }

    /// Rows matching a name/email search and an optional status.
    pub fn filter(&self, search: &str, status: Option<RelationStatus>) -> Vec<&ClientRow> {
        let needle = search.trim().to_lowercase();
        self.rows
            .iter()
            .filter(|r| {
                needle.is_empty()
                    || r.relation.name.to_lowercase().contains(&needle)
                    || r.relation.email.to_lowercase().contains(&needle)
            })
            .filter(|r| status.map_or(true, |s| r.display_status() == s))
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.rows.len(),
            ..Default::default()
        };
        for row in &self.rows {
            match row.display_status() {
                RelationStatus::Active => counts.active += 1,
                RelationStatus::Pending => counts.pending += 1,
                RelationStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EmergencyStopStatus;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    fn client(relation_id: i64, name: &str, status: RelationStatus) -> ClientRelation {
        ClientRelation {
            id: 100 + relation_id,
            relation_id,
            name: name.to_string(),
            email: format!("{}@example.com", name),
            copy_ratio: 1.0,
            status,
            net_value: 10000.0,
            pnl: 0.0,
            pnl_percentage: 0.0,
            created_at: None,
            last_seen: None,
        }
    }

    /// Records update requests; fails when `fail` is set.
    struct FakeTrader {
        requests: Mutex<Vec<UpdateClientRequest>>,
        fail: bool,
    }

    impl FakeTrader {
        fn new(fail: bool) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl TraderBackend for FakeTrader {
        async fn clients(&self) -> ApiResult<Vec<ClientRelation>> {
            Ok(vec![
                client(1, "alice", RelationStatus::Active),
                client(2, "bob", RelationStatus::Pending),
            ])
        }

        async fn update_client(&self, request: &UpdateClientRequest) -> ApiResult<UpdateClientResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ApiError::from_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"detail":"更新客戶設定失敗"}"#,
                ));
            }
            Ok(UpdateClientResponse {
                relation_id: request.relation_id,
                copy_ratio: request.copy_ratio.unwrap_or(1.0),
                status: request.status.unwrap_or(RelationStatus::Active),
                message: String::new(),
            })
        }

        async fn emergency_stop_status(&self) -> ApiResult<EmergencyStopStatus> {
            unreachable!()
        }

        async fn set_emergency_stop(&self, _stop_all: bool) -> ApiResult<EmergencyStopStatus> {
            unreachable!()
        }
    }

    #[test]
    fn test_parse_copy_ratio() {
        assert_eq!(parse_copy_ratio("0.75"), 0.75);
        assert_eq!(parse_copy_ratio(" 2 "), 2.0);
        assert_eq!(parse_copy_ratio("abc"), 0.0);
        assert_eq!(parse_copy_ratio(""), 0.0);
        assert_eq!(parse_copy_ratio("NaN"), 0.0);
        assert_eq!(parse_copy_ratio("inf"), 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_ratio_commits_zero() {
        let backend = FakeTrader::new(false);
        let mut table = ClientTable::load(&backend).await.unwrap();

        assert_eq!(table.edit_copy_ratio(1, "abc").unwrap(), 0.0);
        assert_eq!(table.row(1).unwrap().display_ratio(), 0.0);

        let confirmed = table.commit_copy_ratio(&backend, 1).await.unwrap().unwrap();
        assert_eq!(confirmed.copy_ratio, 0.0);

        let sent = backend.requests.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].copy_ratio, Some(0.0));
        assert_eq!(sent[0].status, None);

        let row = table.row(1).unwrap();
        assert_eq!(row.relation.copy_ratio, 0.0);
        assert!(!row.has_pending());
    }

    #[tokio::test]
    async fn test_failed_commit_reverts_pending() {
        let backend = FakeTrader::new(true);
        let mut table = ClientTable::load(&backend).await.unwrap();

        table.edit_copy_ratio(2, "0.3").unwrap();
        assert_eq!(table.row(2).unwrap().display_ratio(), 0.3);

        let err = table.commit_copy_ratio(&backend, 2).await.unwrap_err();
        assert_eq!(err.status(), Some(500));

        let row = table.row(2).unwrap();
        assert_eq!(row.display_ratio(), 1.0);
        assert!(!row.has_pending());
    }

    #[tokio::test]
    async fn test_negative_ratio_never_sent() {
        let backend = FakeTrader::new(false);
        let mut table = ClientTable::load(&backend).await.unwrap();

        table.edit_copy_ratio(1, "-0.5").unwrap();
        let err = table.commit_copy_ratio(&backend, 1).await.unwrap_err();

        assert!(matches!(err, ApiError::Invalid(_)));
        assert!(backend.requests.lock().unwrap().is_empty());
        assert_eq!(table.row(1).unwrap().display_ratio(), 1.0);
    }

    #[tokio::test]
    async fn test_commit_without_edit_is_noop() {
        let backend = FakeTrader::new(false);
        let mut table = ClientTable::load(&backend).await.unwrap();

        assert!(table.commit_copy_ratio(&backend, 1).await.unwrap().is_none());
        assert!(backend.requests.lock().unwrap().is_empty());
        assert!(table.edit_copy_ratio(99, "1").is_err());
    }

    #[tokio::test]
    async fn test_status_change_and_revert() {
        let ok = FakeTrader::new(false);
        let mut table = ClientTable::load(&ok).await.unwrap();

        table.set_status(&ok, 2, RelationStatus::Active).await.unwrap();
        assert_eq!(table.row(2).unwrap().relation.status, RelationStatus::Active);
        assert_eq!(table.counts().active, 2);

        let failing = FakeTrader::new(true);
        assert!(table.set_status(&failing, 1, RelationStatus::Blocked).await.is_err());
        assert_eq!(table.row(1).unwrap().display_status(), RelationStatus::Active);
        assert_eq!(table.counts().blocked, 0);
    }

    #[test]
    fn test_filter_and_counts() {
        let table = ClientTable::new(vec![
            client(1, "alice", RelationStatus::Active),
            client(2, "Bob", RelationStatus::Pending),
            client(3, "carol", RelationStatus::Blocked),
            client(4, "bobby", RelationStatus::Active),
        ]);

        let bobs = table.filter("BOB", None);
        assert_eq!(bobs.len(), 2);

        let active_bobs = table.filter("bob", Some(RelationStatus::Active));
        assert_eq!(active_bobs.len(), 1);
        assert_eq!(active_bobs[0].relation.name, "bobby");

        assert_eq!(table.filter("", Some(RelationStatus::Blocked)).len(), 1);

        assert_eq!(
            table.counts(),
            StatusCounts {
                total: 4,
                active: 2,
                pending: 1,
                blocked: 1,
            }
        );
    }

    #[test]
    fn test_replace_keeps_pending_edits() {
        let mut table = ClientTable::new(vec![client(1, "alice", RelationStatus::Active)]);
        table.edit_copy_ratio(1, "0.4").unwrap();

        table.replace(vec![
            client(1, "alice", RelationStatus::Active),
            client(2, "bob", RelationStatus::Pending),
        ]);

        assert_eq!(table.counts().total, 2);
        assert_eq!(table.row(1).unwrap().display_ratio(), 0.4);
        assert!(!table.row(2).unwrap().has_pending());
    }
}
