//! HTTP client for the follow-trading backend.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, warn};

use crate::models::{ClientRelation, DashboardSummary, Session};

use super::backend::{AuthBackend, DashboardBackend, TraderBackend};
use super::error::{ApiError, ApiResult};
use super::types::*;

const API_PREFIX: &str = "/api/v1";
/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the backend REST API.
///
/// Protected endpoints need a session; without one they fail with
/// `ApiError::Unauthenticated` before any request is sent.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create an unauthenticated client.
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach the bearer token of a stored session.
    pub fn with_session(mut self, session: &Session) -> Self {
        self.token = Some(session.token.clone());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn authed(&self, request: RequestBuilder) -> ApiResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ApiError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    /// Send a request and decode a JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ApiResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, request = what, "Backend rejected request");
            return Err(ApiError::from_response(status, &body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{}: {}", what, e)))
    }
}

impl AuthBackend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> ApiResult<TokenResponse> {
        let url = self.url("/auth/login");
        debug!(url = %url, username = %username, "Logging in");

        // OAuth2 password form, not JSON
        let request = self
            .http
            .post(&url)
            .form(&[("username", username), ("password", password)]);
        self.send(request, "login").await
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisteredUser> {
        let url = self.url("/auth/register");
        debug!(url = %url, username = %request.username, "Registering account");

        self.send(self.http.post(&url).json(request), "register").await
    }
}

impl DashboardBackend for ApiClient {
    async fn dashboard_summary(&self) -> ApiResult<DashboardSummary> {
        let url = self.url("/dashboard/summary");
        debug!(url = %url, "Fetching dashboard summary");

        let request = self.authed(self.http.get(&url))?;
        self.send(request, "dashboard summary").await
    }

    async fn update_follow_settings(&self, update: &FollowSettingsUpdate) -> ApiResult<()> {
        let url = self.url("/follow-config/settings");
        debug!(
            url = %url,
            is_active = update.is_active,
            follow_ratio = update.follow_ratio,
            "Updating follow settings"
        );

        let request = self.authed(self.http.put(&url).json(update))?;
        let _: IgnoredAny = self.send(request, "follow settings").await?;
        Ok(())
    }

    async fn trigger_order(&self, order: &TriggerOrderRequest) -> ApiResult<TriggerOrderResponse> {
        let url = self.url("/dashboard/trigger-order");
        debug!(
            url = %url,
            symbol = %order.symbol,
            size = order.position_size,
            price = order.entry_price,
            "Triggering test master order"
        );

        let request = self.authed(self.http.post(&url).json(order))?;
        self.send(request, "trigger order").await
    }
}

impl TraderBackend for ApiClient {
    async fn clients(&self) -> ApiResult<Vec<ClientRelation>> {
        let url = self.url("/trader/clients");
        debug!(url = %url, "Fetching client relations");

        let request = self.authed(self.http.get(&url))?;
        self.send(request, "clients").await
    }

    async fn update_client(&self, request: &UpdateClientRequest) -> ApiResult<UpdateClientResponse> {
        let url = self.url("/trader/update-client");
        debug!(
            url = %url,
            relation_id = request.relation_id,
            copy_ratio = ?request.copy_ratio,
            status = ?request.status,
            "Updating client relation"
        );

        let builder = self.authed(self.http.patch(&url).json(request))?;
        self.send(builder, "update client").await
    }

    async fn emergency_stop_status(&self) -> ApiResult<EmergencyStopStatus> {
        let url = self.url("/trader/emergency-stop-status");
        debug!(url = %url, "Fetching emergency stop status");

        let request = self.authed(self.http.get(&url))?;
        self.send(request, "emergency stop status").await
    }

    async fn set_emergency_stop(&self, stop_all: bool) -> ApiResult<EmergencyStopStatus> {
        let url = self.url("/trader/emergency-stop");
        debug!(url = %url, stop_all = stop_all, "Setting emergency stop");

        let body = EmergencyStopRequest { stop_all };
        let request = self.authed(self.http.post(&url).json(&body))?;
        self.send(request, "emergency stop").await
    }
}
