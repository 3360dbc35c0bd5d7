//! Follow-trading backend API: HTTP client, payloads and error taxonomy.

mod backend;
mod client;
mod error;
mod types;

pub use backend::{AuthBackend, DashboardBackend, TraderBackend};
pub use client::{ApiClient, DEFAULT_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use types::*;
