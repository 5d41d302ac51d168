//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that returns the
//! per-user report published by the last successful run in Prometheus text
//! format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::config::DEFAULT_CACHE_TTL;
use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    // Trigger a collection run when none is in flight and the report is
    // older than cache_ttl (fire-and-forget)
    let ttl_secs = state.config.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
    let should_trigger_update = {
        let cache = state.cache.read().await;
        !cache.is_updating
            && cache
                .last_updated
                .map(|t| t.elapsed().as_secs() >= ttl_secs)
                .unwrap_or(true)
    };

    if should_trigger_update {
        debug!("Triggering on-demand cache update");
        let state_clone = state.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::cache_updater::update_cache(&state_clone).await {
                error!("On-demand cache update failed: {}", e);
            }
        });
    } else {
        debug!("Cache update already in progress or recently updated, serving cached report");
    }

    // Serve the current report immediately (may be stale if an update is running)
    let lock_wait_start = Instant::now();
    let cache = state.cache.read().await;
    let lock_wait_ms = lock_wait_start.elapsed().as_secs_f64() * 1000.0;
    state
        .health_stats
        .record_lock_wait_duration_ms(lock_wait_ms);

    state.cache_update_duration.set(cache.update_duration_seconds);
    state
        .cache_update_success
        .set(if cache.update_success { 1.0 } else { 0.0 });
    state
        .cache_updating
        .set(if cache.is_updating { 1.0 } else { 0.0 });
    state.users_total.set(cache.tracked_users() as f64);

    let value_count = cache.emissions.len();
    drop(cache);

    state.scrape_duration.set(start.elapsed().as_secs_f64());

    let families = state.metrics.gather(&state.registry);
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    state.health_stats.record_metrics_endpoint_call();
    state.health_stats.record_http_request();

    debug!(
        "Metrics request completed: {} values, {} bytes, {:.3}ms",
        value_count,
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
