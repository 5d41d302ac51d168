//! Cache management for per-user socket metrics.
//!
//! This module provides the `MetricsCache` structure holding the last complete
//! report between collection runs, along with metadata about the cache state.

use herakles_sockstat_exporter::{Emission, RunSummary};
use std::time::Instant;

/// Last complete report plus update timing information.
///
/// `emissions` is only ever replaced by a successful run, so a failed or
/// cancelled run keeps the previous report in place.
#[derive(Clone, Default)]
pub struct MetricsCache {
    pub emissions: Vec<Emission>,
    pub last_summary: Option<RunSummary>,
    pub last_error: Option<String>,
    pub last_updated: Option<Instant>,
    pub update_duration_seconds: f64,
    pub update_success: bool,
    pub is_updating: bool,
}

impl MetricsCache {
    pub fn tracked_users(&self) -> usize {
        self.last_summary
            .as_ref()
            .map(|s| s.tracked_users)
            .unwrap_or(0)
    }
}
