//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let build = format!(
        "{} ({})",
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    );

    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let health_item = if state.config.enable_health.unwrap_or(true) {
        r#"<li><a href="/health">/health</a> - collection runs and exporter statistics (text)</li>"#
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Herakles Sockstat Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; color: #333; }}
        h1 {{ border-bottom: 3px solid #007bff; padding-bottom: 10px; }}
        li {{ margin: 12px 0; }}
        a {{ color: #007bff; font-weight: 600; text-decoration: none; }}
        .footer {{ margin-top: 40px; color: #666; font-size: 0.9em; }}
    </style>
</head>
<body>
    <h1>Herakles Sockstat Exporter</h1>
    <p>Per-user open files, sockets and TCP connection states</p>
    <p>Version <b>{version}</b> - Build <b>{build}</b> - Uptime <b>{uptime}</b></p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus-compatible metrics endpoint</li>
        {health_item}
    </ul>
    <div class="footer">{footer}</div>
</body>
</html>"#,
        version = version,
        build = build,
        uptime = uptime_str,
        health_item = health_item,
        footer = FOOTER_TEXT
    );

    Html(html)
}
