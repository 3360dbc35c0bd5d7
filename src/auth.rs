//! Login, registration and the session gate for protected commands.

use anyhow::Result;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, ApiResult, AuthBackend, RegisterRequest, RegisteredUser};
use crate::db::Database;
use crate::models::Session;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Log in and persist the new session.
///
/// Any previous session is cleared first, so a failed login leaves no
/// session behind.
pub async fn login<B: AuthBackend>(
    backend: &B,
    db: &Database,
    username: &str,
    password: &str,
) -> Result<Session> {
    if db.clear_session().await? {
        info!("Cleared previous session");
    }

    let token = match backend.login(username, password).await {
        Ok(token) => token,
        Err(e) => {
            warn!(username = %username, error = %e, "Login failed");
            return Err(e.into());
        }
    };

    let session = Session::new(token.access_token, username.to_string());
    db.save_session(&session).await?;

    info!(username = %username, token = %session.token_hint(), "Logged in");
    Ok(session)
}

/// Forget the stored session. Returns whether one existed.
pub async fn logout(db: &Database) -> Result<bool> {
    let existed = db.clear_session().await?;
    if existed {
        info!("Logged out");
    }
    Ok(existed)
}

/// Check a registration form before sending it.
pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> ApiResult<()> {
    if username.trim().is_empty() {
        return Err(ApiError::Invalid("username is required".to_string()));
    }
    if !email.contains('@') {
        return Err(ApiError::Invalid(format!("invalid email address: {}", email)));
    }
    if password != confirm_password {
        return Err(ApiError::Invalid(
            "password and confirmation do not match".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Validate and submit a registration.
pub async fn register<B: AuthBackend>(
    backend: &B,
    username: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> ApiResult<RegisteredUser> {
    validate_registration(username, email, password, confirm_password)?;

    let request = RegisterRequest {
        username: username.trim().to_string(),
        email: email.trim().to_string(),
        password: password.to_string(),
    };

    let user = backend.register(&request).await?;
    info!(user_id = user.id, username = %user.username, "Account registered");
    Ok(user)
}

/// The stored session, or `ApiError::Unauthenticated`.
pub async fn require_session(db: &Database) -> Result<Session> {
    db.load_session()
        .await?
        .ok_or_else(|| ApiError::Unauthenticated.into())
}

/// Client carrying the stored session's token.
pub async fn authorized_client(db: &Database, client: ApiClient) -> Result<(Session, ApiClient)> {
    let session = require_session(db).await?;
    let client = client.with_session(&session);
    Ok((session, client))
}
