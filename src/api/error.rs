//! Error taxonomy for backend calls.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Result type for backend operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Everything that can go wrong between the console and the backend.
///
/// None of these are fatal: callers render them as an inline message or
/// notification and let the user retry.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection refused, timeout, TLS failure
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 4xx with the backend's detail message
    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    /// 5xx
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    /// Response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Input rejected before any request was sent
    #[error("{0}")]
    Invalid(String),

    /// Protected call without a stored session
    #[error("not logged in, run `copydesk login` first")]
    Unauthenticated,
}

impl ApiError {
    /// Build the error for a non-success response.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = extract_detail(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

        if status.is_server_error() {
            ApiError::Server {
                status: status.as_u16(),
                detail,
            }
        } else {
            ApiError::Rejected {
                status: status.as_u16(),
                detail,
            }
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the stored session is no longer accepted.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthenticated) || self.status() == Some(401)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Pull a readable message out of a FastAPI style `{"detail": ...}` body.
///
/// `detail` is a string for handled errors and a list of
/// `{loc, msg, type}` objects for request validation failures.
fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => Some(s),
        Ok(ErrorBody {
            detail: serde_json::Value::Array(items),
        }) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        Ok(ErrorBody { detail }) => Some(detail.to_string()),
        Err(_) => Some(trimmed.chars().take(200).collect()),
    }
}
