//! Cache update logic for the metrics exporter.
//!
//! This module runs one collection on the blocking pool and swaps its report
//! into the cache. It is triggered at startup and on demand by the metrics
//! endpoint.

use herakles_sockstat_exporter::{
    CancelToken, CollectError, Emission, RecordingReporter, RunSummary,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::MetricsCache;
use crate::state::{AppState, SharedState};

pub type UpdateError = Box<dyn std::error::Error + Send + Sync>;

enum Outcome {
    Completed(RunSummary, Vec<Emission>),
    Failed(String),
    Cancelled(String),
}

impl Outcome {
    fn from_join(
        joined: Result<Result<(RunSummary, Vec<Emission>), CollectError>, JoinError>,
    ) -> Self {
        match joined {
            Ok(Ok((summary, emissions))) => Outcome::Completed(summary, emissions),
            Ok(Err(e @ CollectError::Cancelled { .. })) => Outcome::Cancelled(e.to_string()),
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(join_error) => Outcome::Failed(format!("collection task failed: {join_error}")),
        }
    }
}

/// Cache update function.
#[instrument(skip(state))]
pub async fn update_cache(state: &SharedState) -> Result<(), UpdateError> {
    let start = Instant::now();

    // Concurrent /metrics requests serve the stale report while one update runs
    {
        let mut cache = state.cache.write().await;
        if cache.is_updating {
            debug!("Cache update already in progress, serving stale cache");
            return Ok(());
        }
        cache.is_updating = true;
        state.cache_updating.set(1.0);
        debug!("Cache marked as updating (old report still available)");
    }

    info!("Starting cache update");

    let timeout = state.config.collect_timeout();
    let cancel = CancelToken::with_timeout(timeout);
    let collector = state.collector.clone();
    let run_cancel = cancel.clone();

    let mut handle = tokio::task::spawn_blocking(move || {
        let mut reporter = RecordingReporter::default();
        collector
            .run_once(&mut reporter, &run_cancel)
            .map(|summary| (summary, reporter.into_emissions()))
    });

    let (outcome, overran) = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => (Outcome::from_join(joined), false),
        Err(_) => {
            // The blocking run notices at its next checkpoint
            cancel.cancel();
            let reason = format!("collection exceeded {}s", timeout.as_secs());
            (Outcome::Cancelled(reason), true)
        }
    };

    let duration = start.elapsed().as_secs_f64();
    let mut cache = state.cache.write().await;
    let result = apply_outcome(state, &mut cache, outcome, duration);

    if overran {
        // A run stuck in `ps` or `ls` never reaches a checkpoint; no new run
        // starts until this one is gone.
        warn!("Timed-out collection still running, next update waits for it");
        let state = Arc::clone(state);
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                error!("Timed-out collection task failed: {}", e);
            }
            let mut cache = state.cache.write().await;
            cache.is_updating = false;
            state.cache_updating.set(0.0);
            info!("Timed-out collection finished, updates enabled again");
        });
    } else {
        cache.is_updating = false;
        state.cache_updating.set(0.0);
    }

    result
}

/// Records one finished update. Only a completed run replaces the report and
/// republishes the per-user series.
fn apply_outcome(
    state: &AppState,
    cache: &mut MetricsCache,
    outcome: Outcome,
    duration: f64,
) -> Result<(), UpdateError> {
    cache.update_duration_seconds = duration;
    cache.last_updated = Some(Instant::now());
    state.cache_update_duration.set(duration);

    let result = match outcome {
        Outcome::Completed(summary, emissions) => {
            state.health_stats.record_run_success(&summary);
            state.users_total.set(summary.tracked_users as f64);
            info!(
                "Cache update completed: {} users, {} values, {:.2}ms",
                summary.tracked_users,
                emissions.len(),
                duration * 1000.0
            );
            state.metrics.publish(&emissions);
            cache.emissions = emissions;
            cache.last_summary = Some(summary);
            cache.last_error = None;
            cache.update_success = true;
            Ok(())
        }
        Outcome::Cancelled(reason) => {
            state.health_stats.record_run_cancelled();
            warn!("Cache update cancelled: {}, keeping previous report", reason);
            cache.last_error = Some(reason.clone());
            cache.update_success = false;
            Err(reason.into())
        }
        Outcome::Failed(reason) => {
            state.health_stats.record_run_failure();
            error!("Cache update failed: {}, keeping previous report", reason);
            cache.last_error = Some(reason.clone());
            cache.update_success = false;
            Err(reason.into())
        }
    };

    state
        .cache_update_success
        .set(if cache.update_success { 1.0 } else { 0.0 });
    result
}
