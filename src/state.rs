//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the cache updater.

use herakles_sockstat_exporter::health_stats::HealthStats;
use herakles_sockstat_exporter::{Collector, FixtureSource, ProcSource, SocketCollector};
use prometheus::{Gauge, Registry};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

use crate::cache::MetricsCache;
use crate::config::Config;
use crate::metrics::SockstatMetrics;

/// Builds the collector for the configured input: captured snapshots when
/// `test_data_dir` is set, the live proc filesystem otherwise.
pub fn build_collector(config: &Config) -> Arc<dyn Collector> {
    let options = config.collector_options();
    match &config.test_data_dir {
        Some(dir) => {
            info!("Using test data from: {}", dir.display());
            Arc::new(SocketCollector::new(FixtureSource::new(dir.clone()), options))
        }
        None => Arc::new(SocketCollector::new(
            ProcSource::new(config.proc_root()),
            options,
        )),
    }
}

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: SockstatMetrics,
    pub scrape_duration: Gauge,
    pub users_total: Gauge,
    pub cache_update_duration: Gauge,
    pub cache_update_success: Gauge,
    pub cache_updating: Gauge,
    pub cache: Arc<RwLock<MetricsCache>>,
    pub config: Arc<Config>,
    /// Collector producing one complete run per update.
    pub collector: Arc<dyn Collector>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Registers the per-user and exporter gauges on a fresh registry.
    pub fn new(config: Config, collector: Arc<dyn Collector>) -> Result<Self, Box<dyn Error>> {
        let registry = Registry::new();
        let metrics = SockstatMetrics::new(&registry)?;

        let scrape_duration = Gauge::new(
            "herakles_sockstat_exporter_scrape_duration_seconds",
            "Time spent serving /metrics request (reading from cache)",
        )?;
        let users_total = Gauge::new(
            "herakles_sockstat_exporter_users_total",
            "Number of users in the last complete report",
        )?;
        let cache_update_duration = Gauge::new(
            "herakles_sockstat_exporter_cache_update_duration_seconds",
            "Time spent in the last collection run",
        )?;
        let cache_update_success = Gauge::new(
            "herakles_sockstat_exporter_cache_update_success",
            "Whether the last collection run was successful (1) or failed (0)",
        )?;
        let cache_updating = Gauge::new(
            "herakles_sockstat_exporter_cache_updating",
            "Whether a collection run is currently in progress (1) or idle (0)",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(users_total.clone()))?;
        registry.register(Box::new(cache_update_duration.clone()))?;
        registry.register(Box::new(cache_update_success.clone()))?;
        registry.register(Box::new(cache_updating.clone()))?;

        Ok(Self {
            registry,
            metrics,
            scrape_duration,
            users_total,
            cache_update_duration,
            cache_update_success,
            cache_updating,
            cache: Arc::new(RwLock::new(MetricsCache::default())),
            config: Arc::new(config),
            collector,
            health_stats: Arc::new(HealthStats::new()),
            start_time: Instant::now(),
        })
    }
}
