//! Data models for the follow-trading dashboard, client relations and sessions.

mod client;
mod dashboard;
mod position;
mod session;
mod time;
mod trade;

pub use client::{ClientRelation, Presence, RelationStatus};
pub use dashboard::DashboardSummary;
pub use position::Position;
pub use session::Session;
pub use trade::Trade;
