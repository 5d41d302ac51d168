//! Health statistics and monitoring for the exporter.
//!
//! This module provides types and functionality for tracking exporter health,
//! including collection run performance, failure counters and HTTP request
//! metrics.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::Instant;

use crate::collector::RunSummary;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push_back(Instant::now());
            // Keep only last 10 minutes of timestamps to avoid unbounded growth
            let cutoff = Instant::now() - std::time::Duration::from_secs(600);
            while guard.front().is_some_and(|&t| t < cutoff) {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let cutoff = Instant::now() - std::time::Duration::from_secs(60);
            guard.iter().filter(|&&t| t >= cutoff).count() as u64
        } else {
            0
        }
    }
}

/// Exporter health statistics.
pub struct HealthStats {
    // Run performance
    pub tracked_users: Stat,
    pub scanned_processes: Stat,
    pub unix_sockets: Stat,
    pub run_duration_seconds: Stat,
    pub total_runs: AtomicU64,

    // Run outcomes
    pub run_success_count: AtomicU64,
    pub run_failure_count: AtomicU64,
    pub run_cancelled_count: AtomicU64,

    // Input quality
    pub skipped_lines: AtomicU64,
    pub vanished_processes: AtomicU64,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,
    pub lock_wait_duration_ms: Stat,

    // Timing
    pub start_time: Instant,
    pub last_success: StdRwLock<Option<DateTime<Utc>>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            tracked_users: Stat::default(),
            scanned_processes: Stat::default(),
            unix_sockets: Stat::default(),
            run_duration_seconds: Stat::default(),
            total_runs: AtomicU64::new(0),
            run_success_count: AtomicU64::new(0),
            run_failure_count: AtomicU64::new(0),
            run_cancelled_count: AtomicU64::new(0),
            skipped_lines: AtomicU64::new(0),
            vanished_processes: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            lock_wait_duration_ms: Stat::default(),
            start_time: Instant::now(),
            last_success: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a completed run.
    pub fn record_run_success(&self, summary: &RunSummary) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.run_success_count.fetch_add(1, Ordering::Relaxed);

        self.tracked_users.add_sample(summary.tracked_users as f64);
        self.scanned_processes
            .add_sample(summary.scanned_processes as f64);
        self.unix_sockets.add_sample(summary.unix_entries as f64);
        self.run_duration_seconds.add_sample(summary.duration_seconds);

        self.skipped_lines
            .fetch_add(summary.skipped_lines, Ordering::Relaxed);
        self.vanished_processes
            .fetch_add(summary.vanished_processes, Ordering::Relaxed);

        if let Ok(mut guard) = self.last_success.write() {
            *guard = Some(Utc::now());
        }
    }

    pub fn record_run_failure(&self) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.run_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.run_cancelled_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wait_duration_ms(&self, duration_ms: f64) {
        self.lock_wait_duration_ms.add_sample(duration_ms);
    }

    pub fn get_run_success_rate(&self) -> f64 {
        let success = self.run_success_count.load(Ordering::Relaxed);
        let total = self.total_runs.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_last_success_str(&self) -> String {
        if let Ok(guard) = self.last_success.read() {
            if let Some(ts) = *guard {
                return ts.format("%Y-%m-%d %H:%M:%S UTC").to_string();
            }
        }
        "N/A".to_string()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let stat_row = |out: &mut String, name: &str, stat: &Stat, precision: usize| {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        };
        let counter_row = |out: &mut String, name: &str, value: String| {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                value,
                "N/A",
                "N/A",
                "N/A",
                left = left_col,
                col = col_w
            )
            .ok();
        };

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COLLECTION RUNS").ok();
        writeln!(out, "---------------").ok();
        stat_row(&mut out, "tracked_users", &self.tracked_users, 0);
        stat_row(&mut out, "scanned_processes", &self.scanned_processes, 0);
        stat_row(&mut out, "unix_sockets", &self.unix_sockets, 0);
        stat_row(&mut out, "run_duration (s)", &self.run_duration_seconds, 3);
        counter_row(
            &mut out,
            "run_success_rate (%)",
            format!("{:.1}", self.get_run_success_rate()),
        );
        counter_row(
            &mut out,
            "runs_total",
            self.total_runs.load(Ordering::Relaxed).to_string(),
        );
        counter_row(
            &mut out,
            "runs_failed",
            self.run_failure_count.load(Ordering::Relaxed).to_string(),
        );
        counter_row(
            &mut out,
            "runs_cancelled",
            self.run_cancelled_count.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(out, "INPUT QUALITY").ok();
        writeln!(out, "-------------").ok();
        counter_row(
            &mut out,
            "skipped_lines_total",
            self.skipped_lines.load(Ordering::Relaxed).to_string(),
        );
        counter_row(
            &mut out,
            "vanished_processes_total",
            self.vanished_processes.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();
        counter_row(
            &mut out,
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        counter_row(
            &mut out,
            "metrics_endpoint_calls",
            self.metrics_endpoint_calls
                .load(Ordering::Relaxed)
                .to_string(),
        );
        stat_row(&mut out, "lock_wait (ms)", &self.lock_wait_duration_ms, 2);

        writeln!(out).ok();
        writeln!(out, "last_successful_run: {}", self.get_last_success_str()).ok();
        out
    }
}
