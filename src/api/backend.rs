//! Backend seams used by the poller, editor and actions.
//!
//! `ApiClient` is the production implementation; tests substitute fakes.

use crate::models::{ClientRelation, DashboardSummary};

use super::error::ApiResult;
use super::types::*;

/// Unauthenticated account endpoints.
#[allow(async_fn_in_trait)]
pub trait AuthBackend {
    async fn login(&self, username: &str, password: &str) -> ApiResult<TokenResponse>;
    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisteredUser>;
}

/// Follower dashboard endpoints.
#[allow(async_fn_in_trait)]
pub trait DashboardBackend {
    async fn dashboard_summary(&self) -> ApiResult<DashboardSummary>;
    async fn update_follow_settings(&self, update: &FollowSettingsUpdate) -> ApiResult<()>;
    async fn trigger_order(&self, order: &TriggerOrderRequest) -> ApiResult<TriggerOrderResponse>;
}

/// Trader-admin endpoints.
#[allow(async_fn_in_trait)]
pub trait TraderBackend {
    async fn clients(&self) -> ApiResult<Vec<ClientRelation>>;
    async fn update_client(&self, request: &UpdateClientRequest) -> ApiResult<UpdateClientResponse>;
    async fn emergency_stop_status(&self) -> ApiResult<EmergencyStopStatus>;
    async fn set_emergency_stop(&self, stop_all: bool) -> ApiResult<EmergencyStopStatus>;
}
