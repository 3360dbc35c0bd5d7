//! Request and response payloads for the follow-trading backend.

use serde::{Deserialize, Serialize};

use crate::models::RelationStatus;

/// Response from `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Response from `POST /auth/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Body for `PUT /follow-config/settings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowSettingsUpdate {
    pub is_active: bool,
    pub follow_ratio: f64,
    pub master_user_id: i64,
    pub master_credential_id: i64,
}

/// Body for `POST /dashboard/trigger-order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOrderRequest {
    pub master_user_id: i64,
    pub master_credential_id: i64,
    pub symbol: String,
    pub position_size: f64,
    pub entry_price: f64,
}

impl Default for TriggerOrderRequest {
    fn default() -> Self {
        Self {
            master_user_id: 1,
            master_credential_id: 1,
            symbol: "BTC/USDT".to_string(),
            position_size: 1.0,
            entry_price: 50000.0,
        }
    }
}

/// Master position change reported after a test order.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterOrderInfo {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub old_position_size: f64,
    #[serde(default)]
    pub new_position_size: f64,
    #[serde(default)]
    pub position_changed: bool,
}

/// Response from `POST /dashboard/trigger-order`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerOrderResponse {
    pub master_info: MasterOrderInfo,
    #[serde(default)]
    pub followers_count: u32,
}

/// Body for `PATCH /trader/update-client`. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateClientRequest {
    pub relation_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RelationStatus>,
}

/// Response from `PATCH /trader/update-client`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateClientResponse {
    pub relation_id: i64,
    pub copy_ratio: f64,
    pub status: RelationStatus,
    #[serde(default)]
    pub message: String,
}

/// Body for `POST /trader/emergency-stop`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyStopRequest {
    pub stop_all: bool,
}

/// Response from both emergency stop endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EmergencyStopStatus {
    pub emergency_stop: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}
