//! Plain-text rendering for the console.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::api::EmergencyStopStatus;
use crate::db::SnapshotPoint;
use crate::editor::{ClientRow, StatusCounts};
use crate::models::{ClientRelation, DashboardSummary, Position, Presence};
use crate::poller::PollState;

/// Truncate a string with ellipsis if too long.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// "+$12.50 (+0.25%)"
pub fn signed_usd(value: f64, percent: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("{}${:.2} ({:+.2}%)", sign, value.abs(), percent)
}

/// Full dashboard screen for the current poll state.
pub fn render_dashboard(state: &PollState<DashboardSummary>) -> String {
    let mut out = String::new();

    let Some(summary) = &state.data else {
        match &state.error {
            Some(e) => {
                let _ = writeln!(out, "❌ Failed to load dashboard: {}", e);
            }
            None => {
                let _ = writeln!(out, "Loading dashboard...");
            }
        }
        return out;
    };

    let updated = state
        .updated_at
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "=== {} | Follow: {} | Engine: {} | Updated {}{} ===",
        summary.username,
        if summary.is_active { "ON" } else { "OFF" },
        if summary.engine_status.is_running {
            summary.engine_status.status.as_str()
        } else {
            "Stopped"
        },
        updated,
        if state.loading { " (refreshing)" } else { "" }
    );

    if let Some(e) = &state.error {
        let _ = writeln!(out, "⚠️  Last refresh failed: {}", e);
    }

    out.push_str(&render_summary(summary));
    out
}

/// Stat cards, positions, latest master activity and trade history.
pub fn render_summary(summary: &DashboardSummary) -> String {
    let mut out = String::new();

    if summary.has_unresolved_errors {
        let _ = writeln!(
            out,
            "\n🚨 {} unresolved trade error(s) need attention",
            summary.unresolved_error_count
        );
    }

    let _ = writeln!(out, "\nFollow Ratio:      {:.0}%", summary.follow_ratio * 100.0);
    let _ = writeln!(out, "Position Value:    ${:.2}", summary.total_position_value);
    let _ = writeln!(
        out,
        "Unrealized P&L:    {}",
        signed_usd(summary.unrealized_pnl, summary.unrealized_pnl_percent)
    );
    let _ = writeln!(
        out,
        "Realized P&L:      {}",
        signed_usd(summary.realized_pnl, summary.realized_pnl_percent)
    );
    let _ = writeln!(
        out,
        "Total P&L:         {}",
        signed_usd(summary.total_pnl, summary.total_pnl_percent)
    );

    let _ = writeln!(out, "\n--- Master Positions ({}) ---", summary.master_positions.len());
    if summary.master_positions.is_empty() {
        let _ = writeln!(out, "No master positions");
    } else {
        let _ = writeln!(
            out,
            "{:<14} {:>6} {:>12} {:>12} {:>14}",
            "SYMBOL", "SIDE", "SIZE", "ENTRY", "EXPECTED"
        );
        for p in &summary.master_positions {
            let _ = writeln!(
                out,
                "{:<14} {:>6} {:>12} {:>12} {:>14}",
                truncate(&p.symbol, 14),
                p.direction().as_str(),
                p.position_size,
                entry_label(p),
                p.expected_follow_size(summary.follow_ratio)
            );
        }
    }

    let _ = writeln!(out, "\n--- My Positions ({}) ---", summary.my_positions.len());
    if summary.my_positions.is_empty() {
        let _ = writeln!(out, "No open positions");
    } else {
        let _ = writeln!(
            out,
            "{:<14} {:>6} {:>12} {:>12} {:>12}",
            "SYMBOL", "SIDE", "SIZE", "ENTRY", "VALUE"
        );
        for p in &summary.my_positions {
            let _ = writeln!(
                out,
                "{:<14} {:>6} {:>12} {:>12} {:>12.2}",
                truncate(&p.symbol, 14),
                p.direction().as_str(),
                p.position_size,
                entry_label(p),
                p.current_value
            );
        }
    }

    let unmatched = summary.unmatched_master_symbols();
    if summary.is_active && !unmatched.is_empty() {
        let _ = writeln!(out, "Not yet followed: {}", unmatched.join(", "));
    }

    if let Some(activity) = &summary.master_latest_activity {
        let _ = writeln!(
            out,
            "\nMaster latest: {} {} size {} @ {} ({})",
            activity.symbol,
            activity.action,
            activity.position_size,
            activity
                .entry_price
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "-".to_string()),
            activity.timestamp.with_timezone(&Local).format("%m-%d %H:%M:%S")
        );
    }

    let _ = writeln!(
        out,
        "\n--- Recent Trades ({}) ---",
        summary.recent_successful_trades.len()
    );
    if summary.recent_successful_trades.is_empty() {
        let _ = writeln!(out, "No trades yet");
    } else {
        for t in &summary.recent_successful_trades {
            let _ = writeln!(
                out,
                "{} {:<14} {:<5} {:>12} {:<12} {:>8}",
                t.timestamp.with_timezone(&Local).format("%m-%d %H:%M:%S"),
                truncate(&t.symbol, 14),
                t.side.as_str(),
                t.amount,
                truncate(&t.action, 12),
                t.latency_label()
            );
        }
    }

    out
}

fn entry_label(p: &Position) -> String {
    p.entry_price
        .map(|e| format!("{:.2}", e))
        .unwrap_or_else(|| "-".to_string())
}

/// Presence with time since last seen, e.g. "away 12m".
pub fn presence_label(relation: &ClientRelation, now: DateTime<Utc>) -> String {
    let presence = relation.presence(now);
    let Some(seen) = relation.last_seen else {
        return presence.as_str().to_string();
    };
    if presence == Presence::Online {
        return presence.as_str().to_string();
    }

    let minutes = now.signed_duration_since(seen).num_minutes().max(0);
    let age = if minutes < 60 {
        format!("{}m", minutes)
    } else if minutes < 60 * 24 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}d", minutes / (60 * 24))
    };
    format!("{} {}", presence.as_str(), age)
}

/// Client table with pending edits shown in place.
pub fn render_clients(rows: &[&ClientRow], counts: StatusCounts, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Clients: {} total | {} active | {} pending | {} blocked",
        counts.total, counts.active, counts.pending, counts.blocked
    );

    if rows.is_empty() {
        let _ = writeln!(out, "No matching clients");
        return out;
    }

    let _ = writeln!(
        out,
        "\n{:<12} {:>6} {:<20} {:<26} {:>7} {:<8} {:>12} {:>20}",
        "SEEN", "ID", "NAME", "EMAIL", "RATIO", "STATUS", "NET VALUE", "P&L"
    );
    let _ = writeln!(out, "{}", "-".repeat(118));

    for row in rows {
        let r = &row.relation;
        let _ = writeln!(
            out,
            "{:<12} {:>6} {:<20} {:<26} {:>7.2} {:<8} {:>12.2} {:>20}{}",
            presence_label(r, now),
            r.relation_id,
            truncate(&r.name, 20),
            truncate(&r.email, 26),
            row.display_ratio(),
            row.display_status().as_str(),
            r.net_value,
            signed_usd(r.pnl, r.pnl_percentage),
            if row.has_pending() { " *" } else { "" }
        );
    }

    out
}

pub fn render_emergency(status: &EmergencyStopStatus) -> String {
    let state = if status.emergency_stop {
        "🛑 EMERGENCY STOP ACTIVE"
    } else {
        "🟢 Copying normally"
    };
    let mut out = state.to_string();
    if !status.message.is_empty() {
        let _ = write!(out, "  {}", status.message);
    }
    if let Some(at) = &status.updated_at {
        let _ = write!(out, " (updated {})", at);
    }
    out
}

/// Snapshot history table, newest first.
pub fn render_history(points: &[SnapshotPoint]) -> String {
    let mut out = String::new();

    if points.is_empty() {
        let _ = writeln!(out, "No snapshots recorded. Run 'copydesk watch' to record some.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:>6} {:<26} {:<16} {:<6} {:>7} {:>14} {:>14} {:>5}",
        "#", "RECORDED", "USER", "FOLLOW", "RATIO", "VALUE", "UNREAL P&L", "POS"
    );
    let _ = writeln!(out, "{}", "-".repeat(101));

    for p in points {
        let _ = writeln!(
            out,
            "{:>6} {:<26} {:<16} {:<6} {:>6.0}% {:>14.2} {:>14.2} {:>5}",
            p.id,
            truncate(&p.recorded_at, 26),
            truncate(&p.username, 16),
            if p.is_active { "ON" } else { "OFF" },
            p.follow_ratio * 100.0,
            p.total_position_value,
            p.unrealized_pnl,
            p.my_position_count
        );
    }

    out
}
