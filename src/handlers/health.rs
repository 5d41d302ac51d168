//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics and the state of the last collection run.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::cache::MetricsCache;
use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "More info: https://www.herakles.now - Support: exporter@herakles.now";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    state.health_stats.record_http_request();

    let cache = state.cache.read().await;

    // A report exists and the most recent run produced it
    let status = if cache.update_success && cache.last_updated.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if cache.is_updating {
        "OK - Collection running"
    } else if cache.update_success {
        "OK"
    } else if cache.last_summary.is_some() {
        "Last collection failed - serving previous report"
    } else {
        "No collection completed yet"
    };

    let uptime_seconds = state.health_stats.get_uptime_seconds();
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let table = state.health_stats.render_table();
    let run_section = render_last_run(&cache);

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{run_section}\n{FOOTER_TEXT}"),
    )
}

/// Renders the counters of the last successful run.
fn render_last_run(cache: &MetricsCache) -> String {
    let mut out = String::new();
    writeln!(out, "LAST RUN").ok();
    writeln!(out, "========").ok();
    writeln!(out).ok();

    let Some(summary) = &cache.last_summary else {
        writeln!(out, "no successful run yet").ok();
        if let Some(err) = &cache.last_error {
            writeln!(out, "last error: {}", err).ok();
        }
        return out;
    };

    let rows: [(&str, String); 8] = [
        ("tracked_users", summary.tracked_users.to_string()),
        ("scanned_processes", summary.scanned_processes.to_string()),
        ("vanished_processes", summary.vanished_processes.to_string()),
        ("unix_entries", summary.unix_entries.to_string()),
        ("unix_claimed", summary.unix_claimed.to_string()),
        ("tcp_lines", summary.tcp_lines.to_string()),
        ("tcp_tracked_lines", summary.tcp_tracked_lines.to_string()),
        ("skipped_lines", summary.skipped_lines.to_string()),
    ];
    for (name, value) in rows {
        writeln!(out, "{:25} | {:>10}", name, value).ok();
    }
    writeln!(
        out,
        "{:25} | {:>10.3}",
        "duration (s)", summary.duration_seconds
    )
    .ok();

    if let Some(err) = &cache.last_error {
        writeln!(out).ok();
        writeln!(out, "last error: {}", err).ok();
    }
    out
}
