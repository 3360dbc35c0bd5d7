//! Dashboard and trader-admin actions.
//!
//! Actions never edit the displayed snapshot. They ask the backend for the
//! change and schedule a re-fetch through the poller's refresh handle.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{
    ApiResult, DashboardBackend, EmergencyStopStatus, FollowSettingsUpdate, TraderBackend,
    TriggerOrderRequest, TriggerOrderResponse,
};
use crate::models::DashboardSummary;
use crate::poller::RefreshHandle;

/// Delay before re-fetching after a follow toggle.
pub const TOGGLE_REFRESH_DELAY: Duration = Duration::from_millis(500);

/// Re-fetches after a test order: one quick, one after the follower engine
/// has had time to react.
pub const TRIGGER_REFRESH_DELAYS: [Duration; 2] =
    [Duration::from_millis(100), Duration::from_millis(3000)];

/// Master credential used for follow settings.
pub const DEFAULT_MASTER_CREDENTIAL_ID: i64 = 1;
/// Master used when the follower has none configured yet.
pub const DEFAULT_MASTER_USER_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing outcome message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.level {
            NoticeLevel::Info => "ℹ️ ",
            NoticeLevel::Success => "✅",
            NoticeLevel::Warning => "⚠️ ",
            NoticeLevel::Error => "❌",
        };
        write!(f, "{} {}", icon, self.message)
    }
}

fn schedule_refresh<T: Clone + Send + Sync + 'static>(refresh: &RefreshHandle<T>, delay: Duration) {
    if !refresh.is_active() {
        debug!(delay_ms = delay.as_millis() as u64, "Poller stopped, refresh not scheduled");
        return;
    }
    refresh.refresh_after(delay);
}

// ==================== Follow toggle ====================

/// Settings update that flips `is_active` and keeps everything else.
pub fn toggle_request(summary: &DashboardSummary) -> FollowSettingsUpdate {
    FollowSettingsUpdate {
        is_active: !summary.is_active,
        follow_ratio: summary.follow_ratio,
        master_user_id: summary.master_user_id.unwrap_or(DEFAULT_MASTER_USER_ID),
        master_credential_id: DEFAULT_MASTER_CREDENTIAL_ID,
    }
}

/// Flip follow trading on or off, then refresh after a short delay.
///
/// On failure nothing is scheduled and the snapshot stays as it was.
pub async fn toggle_follow<B, T>(
    backend: &B,
    summary: &DashboardSummary,
    refresh: &RefreshHandle<T>,
) -> ApiResult<Notice>
where
    B: DashboardBackend,
    T: Clone + Send + Sync + 'static,
{
    let update = toggle_request(summary);

    if let Err(e) = backend.update_follow_settings(&update).await {
        warn!(error = %e, "Follow toggle failed");
        return Err(e);
    }

    info!(is_active = update.is_active, ratio = update.follow_ratio, "Follow settings updated");
    schedule_refresh(refresh, TOGGLE_REFRESH_DELAY);

    Ok(if update.is_active {
        Notice::success("Follow trading enabled")
    } else {
        Notice::success("Follow trading paused")
    })
}

// ==================== Test order ====================

/// Describe a test order result as "SYMBOL: old → new".
pub fn describe_trigger(response: &TriggerOrderResponse) -> String {
    let info = &response.master_info;
    if info.position_changed {
        format!(
            "Master order triggered. {}: {} → {} ({} followers)",
            info.symbol, info.old_position_size, info.new_position_size, response.followers_count
        )
    } else {
        format!(
            "Master order sent, {} position unchanged at {}",
            info.symbol, info.new_position_size
        )
    }
}

/// Submit a simulated master order, then refresh twice.
pub async fn trigger_test_order<B, T>(
    backend: &B,
    order: &TriggerOrderRequest,
    refresh: &RefreshHandle<T>,
) -> ApiResult<Notice>
where
    B: DashboardBackend,
    T: Clone + Send + Sync + 'static,
{
    let response = match backend.trigger_order(order).await {
        Ok(r) => r,
        Err(e) => {
            warn!(symbol = %order.symbol, error = %e, "Test order failed");
            return Err(e);
        }
    };

    info!(
        symbol = %response.master_info.symbol,
        old = response.master_info.old_position_size,
        new = response.master_info.new_position_size,
        followers = response.followers_count,
        "Test order accepted"
    );

    for delay in TRIGGER_REFRESH_DELAYS {
        schedule_refresh(refresh, delay);
    }

    Ok(Notice::success(describe_trigger(&response)))
}

// ==================== Emergency stop ====================

/// Asks the operator before an outward-facing change.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers yes without asking.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

pub fn emergency_prompt(stop_all: bool) -> &'static str {
    if stop_all {
        "Activate emergency stop? Copying halts for every client of this trader."
    } else {
        "Release emergency stop? Copying resumes for active clients."
    }
}

#[derive(Debug, Clone)]
pub enum EmergencyOutcome {
    /// Operator said no; nothing was sent
    Declined,
    /// Applied and re-read from the backend
    Applied(EmergencyStopStatus),
}

/// Set the emergency stop after confirmation, then re-read its status.
pub async fn set_emergency_stop<B, C>(
    backend: &B,
    stop_all: bool,
    confirm: &C,
) -> ApiResult<EmergencyOutcome>
where
    B: TraderBackend,
    C: Confirm + ?Sized,
{
    if !confirm.confirm(emergency_prompt(stop_all)) {
        info!(stop_all, "Emergency stop change declined");
        return Ok(EmergencyOutcome::Declined);
    }

    let applied = backend.set_emergency_stop(stop_all).await?;
    if stop_all {
        warn!(message = %applied.message, "Emergency stop activated");
    } else {
        info!(message = %applied.message, "Emergency stop released");
    }

    let status = backend.emergency_stop_status().await?;
    Ok(EmergencyOutcome::Applied(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MasterOrderInfo, UpdateClientRequest, UpdateClientResponse};
    use crate::models::ClientRelation;
    use crate::poller::Poller;
    use reqwest::StatusCode;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FakeDashboard {
        updates: Mutex<Vec<FollowSettingsUpdate>>,
        fail: bool,
    }

    impl FakeDashboard {
        fn new(fail: bool) -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl DashboardBackend for FakeDashboard {
        async fn dashboard_summary(&self) -> ApiResult<DashboardSummary> {
            Ok(DashboardSummary::default())
        }

        async fn update_follow_settings(&self, update: &FollowSettingsUpdate) -> ApiResult<()> {
            self.updates.lock().unwrap().push(update.clone());
            if self.fail {
                return Err(ApiError::from_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"detail":"db down"}"#,
                ));
            }
            Ok(())
        }

        async fn trigger_order(&self, order: &TriggerOrderRequest) -> ApiResult<TriggerOrderResponse> {
            if self.fail {
                return Err(ApiError::from_response(StatusCode::BAD_GATEWAY, ""));
            }
            Ok(TriggerOrderResponse {
                master_info: MasterOrderInfo {
                    symbol: order.symbol.clone(),
                    old_position_size: 0.0,
                    new_position_size: order.position_size,
                    position_changed: true,
                },
                followers_count: 3,
            })
        }
    }

    struct FakeStop {
        engaged: AtomicBool,
        calls: Mutex<Vec<bool>>,
    }

    impl TraderBackend for FakeStop {
        async fn clients(&self) -> ApiResult<Vec<ClientRelation>> {
            Ok(Vec::new())
        }

        async fn update_client(&self, _request: &UpdateClientRequest) -> ApiResult<UpdateClientResponse> {
            unreachable!()
        }

        async fn emergency_stop_status(&self) -> ApiResult<EmergencyStopStatus> {
            Ok(EmergencyStopStatus {
                emergency_stop: self.engaged.load(Ordering::SeqCst),
                message: String::new(),
                updated_at: None,
            })
        }

        async fn set_emergency_stop(&self, stop_all: bool) -> ApiResult<EmergencyStopStatus> {
            self.calls.lock().unwrap().push(stop_all);
            self.engaged.store(stop_all, Ordering::SeqCst);
            Ok(EmergencyStopStatus {
                emergency_stop: stop_all,
                message: "ok".to_string(),
                updated_at: None,
            })
        }
    }

    /// Records prompts and answers a fixed value.
    struct ScriptedConfirm {
        answer: bool,
        prompts: RefCell<Vec<String>>,
    }

    impl Confirm for ScriptedConfirm {
        fn confirm(&self, prompt: &str) -> bool {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.answer
        }
    }

    fn summary(is_active: bool, master: Option<i64>) -> DashboardSummary {
        DashboardSummary {
            username: "follower1".to_string(),
            is_active,
            follow_ratio: 0.1,
            master_user_id: master,
            ..Default::default()
        }
    }

    fn idle_poller() -> Poller<DashboardSummary> {
        Poller::spawn(
            "test",
            || async { Ok::<_, String>(DashboardSummary::default()) },
            Duration::ZERO,
        )
    }

    #[test]
    fn test_toggle_request_flips_only_active() {
        let req = toggle_request(&summary(true, Some(4)));
        assert_eq!(
            req,
            FollowSettingsUpdate {
                is_active: false,
                follow_ratio: 0.1,
                master_user_id: 4,
                master_credential_id: 1,
            }
        );

        assert_eq!(toggle_request(&summary(false, None)).master_user_id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_refreshes_after_delay() {
        let poller = idle_poller();
        let backend = FakeDashboard::new(false);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.snapshot().fetches, 1);

        let notice = toggle_follow(&backend, &summary(false, Some(1)), &poller.handle())
            .await
            .unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert!(backend.updates.lock().unwrap()[0].is_active);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(poller.snapshot().fetches, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(poller.snapshot().fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_refresh_runs_after_slow_fetch() {
        let poller = Poller::spawn(
            "test",
            || async {
                tokio::time::sleep(Duration::from_millis(800)).await;
                Ok::<_, String>(DashboardSummary::default())
            },
            Duration::ZERO,
        );
        let backend = FakeDashboard::new(false);

        // Initial fetch still outstanding when the refresh comes due
        toggle_follow(&backend, &summary(false, Some(1)), &poller.handle())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(poller.snapshot().fetches, 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let state = poller.snapshot();
        assert_eq!(state.fetches, 2);
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_after_poller_stopped_schedules_nothing() {
        let mut poller = idle_poller();
        let backend = FakeDashboard::new(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = poller.handle();
        poller.stop().await;

        toggle_follow(&backend, &summary(false, Some(1)), &handle)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(backend.updates.lock().unwrap().len(), 1);
        assert_eq!(handle.snapshot().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_toggle_schedules_nothing() {
        let poller = idle_poller();
        let backend = FakeDashboard::new(true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = toggle_follow(&backend, &summary(true, Some(1)), &poller.handle())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "server error (500): db down");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(poller.snapshot().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_refreshes_twice() {
        let poller = idle_poller();
        let backend = FakeDashboard::new(false);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let order = TriggerOrderRequest {
            position_size: 2.5,
            ..Default::default()
        };
        let notice = trigger_test_order(&backend, &order, &poller.handle())
            .await
            .unwrap();
        assert!(notice.message.contains("BTC/USDT: 0 → 2.5"));
        assert!(notice.message.contains("3 followers"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(poller.snapshot().fetches, 2);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(poller.snapshot().fetches, 3);
    }

    #[test]
    fn test_describe_unchanged_trigger() {
        let response = TriggerOrderResponse {
            master_info: MasterOrderInfo {
                symbol: "ETH/USDT".to_string(),
                old_position_size: 1.0,
                new_position_size: 1.0,
                position_changed: false,
            },
            followers_count: 0,
        };
        assert_eq!(
            describe_trigger(&response),
            "Master order sent, ETH/USDT position unchanged at 1"
        );
    }

    #[tokio::test]
    async fn test_emergency_stop_declined_sends_nothing() {
        let backend = FakeStop {
            engaged: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        };
        let confirm = ScriptedConfirm {
            answer: false,
            prompts: RefCell::new(Vec::new()),
        };

        let outcome = set_emergency_stop(&backend, true, &confirm).await.unwrap();
        assert!(matches!(outcome, EmergencyOutcome::Declined));
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(confirm.prompts.borrow()[0], emergency_prompt(true));
    }

    #[tokio::test]
    async fn test_emergency_stop_confirms_both_directions() {
        let backend = FakeStop {
            engaged: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        };
        let confirm = ScriptedConfirm {
            answer: true,
            prompts: RefCell::new(Vec::new()),
        };

        match set_emergency_stop(&backend, true, &confirm).await.unwrap() {
            EmergencyOutcome::Applied(status) => assert!(status.emergency_stop),
            EmergencyOutcome::Declined => panic!("expected applied"),
        }
        match set_emergency_stop(&backend, false, &confirm).await.unwrap() {
            EmergencyOutcome::Applied(status) => assert!(!status.emergency_stop),
            EmergencyOutcome::Declined => panic!("expected applied"),
        }

        assert_eq!(*backend.calls.lock().unwrap(), vec![true, false]);
        assert_eq!(confirm.prompts.borrow().len(), 2);
        assert_ne!(confirm.prompts.borrow()[0], confirm.prompts.borrow()[1]);
    }

    #[test]
    fn test_notice_display() {
        assert_eq!(Notice::error("boom").to_string(), "❌ boom");
        assert_eq!(Notice::success("done").level, NoticeLevel::Success);
    }
}
