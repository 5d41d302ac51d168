//! Run orchestration: one complete, self-contained collection per call.
//!
//! Steps, strictly in order:
//! 1. build the unix socket index
//! 2. register tracked users from the process list
//! 3. scan every tracked process's descriptors (parallel across users)
//! 4. fold the TCP and TCP6 tables into the users
//! 5. report
//!
//! The cancellation token is checked before every step. A failed or
//! cancelled run leaves nothing behind and reports nothing.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::connections::{ConnectionTableAggregator, TableSummary};
use crate::descriptors::DescriptorScanner;
use crate::error::CollectError;
use crate::report::{report_store, Reporter};
use crate::sources::{parse_process_list, SnapshotSource};
use crate::unix_sockets::UnixSocketIndex;
use crate::user_stats::{KnownSocketMode, TrackedUsers, UserRecord, UserStatsStore};

/// The steps of a run, used to say where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    UnixIndex,
    ProcessList,
    DescriptorScan,
    ConnectionTables,
    Report,
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStep::UnixIndex => "unix socket index",
            RunStep::ProcessList => "process list",
            RunStep::DescriptorScan => "descriptor scan",
            RunStep::ConnectionTables => "connection tables",
            RunStep::Report => "report",
        };
        f.write_str(name)
    }
}

/// Cancellation signal shared between a run and whoever supervises it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn checkpoint(&self, step: RunStep) -> Result<(), CollectError> {
        if self.is_cancelled() {
            warn!("Collection cancelled before {}", step);
            return Err(CollectError::Cancelled { step });
        }
        Ok(())
    }
}

/// Tunables of the socket collector.
#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    pub tracked: TrackedUsers,
    pub known_socket_mode: KnownSocketMode,
}

/// Counters describing one successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub unix_entries: usize,
    pub unix_claimed: usize,
    pub tracked_users: usize,
    pub scanned_processes: u64,
    pub vanished_processes: u64,
    pub skipped_lines: u64,
    pub tcp_lines: u64,
    pub tcp_tracked_lines: u64,
    pub duration_seconds: f64,
}

/// Output of steps 1-4: the populated store plus counters.
#[derive(Debug)]
pub struct CollectedRun {
    pub store: UserStatsStore,
    pub summary: RunSummary,
}

/// Contract between the exporter and a collector: one complete run per call.
pub trait Collector: Send + Sync {
    /// Runs the collection and returns the populated store.
    fn collect(&self, cancel: &CancelToken) -> Result<CollectedRun, CollectError>;

    /// Runs the collection and reports it. Nothing is emitted unless the
    /// whole run succeeded.
    fn run_once(
        &self,
        reporter: &mut dyn Reporter,
        cancel: &CancelToken,
    ) -> Result<RunSummary, CollectError> {
        let run = self.collect(cancel)?;
        cancel.checkpoint(RunStep::Report)?;
        report_store(&run.store, reporter);
        Ok(run.summary)
    }
}

/// Socket statistics collector over any [`SnapshotSource`].
#[derive(Debug)]
pub struct SocketCollector<S> {
    source: S,
    options: CollectorOptions,
}

impl<S: SnapshotSource> SocketCollector<S> {
    pub fn new(source: S, options: CollectorOptions) -> Self {
        Self { source, options }
    }

    fn build_unix_index(&self) -> Result<UnixSocketIndex, CollectError> {
        let lines = self
            .source
            .unix_snapshot()
            .map_err(|e| CollectError::unavailable("unix socket table", e))?;
        Ok(UnixSocketIndex::load(lines))
    }

    fn register_users(&self, summary: &mut RunSummary) -> Result<UserStatsStore, CollectError> {
        let lines = self
            .source
            .process_list()
            .map_err(|e| CollectError::unavailable("process list", e))?;

        let list = parse_process_list(&lines);
        summary.skipped_lines += list.skipped_lines as u64;

        let mut store = UserStatsStore::new(self.options.known_socket_mode);
        for entry in list
            .entries
            .iter()
            .filter(|e| self.options.tracked.contains(e.uid))
        {
            store.track_process(entry.uid, &entry.user_name, &entry.pid);
        }
        Ok(store)
    }

    /// Scans all processes of one user in pid order.
    fn scan_user(
        &self,
        scanner: &DescriptorScanner<'_>,
        record: &mut UserRecord,
        counters: &ScanCounters,
        cancel: &CancelToken,
    ) -> Result<(), CollectError> {
        let pids = record.pids.clone();
        for pid in &pids {
            cancel.checkpoint(RunStep::DescriptorScan)?;

            let lines = match self.source.descriptor_listing(pid) {
                Ok(lines) => lines,
                Err(e) if e.is_vanished() => {
                    warn!(uid = record.uid, pid = %pid, "Process exited before scan, skipping");
                    counters.vanished.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => return Err(CollectError::unavailable("descriptor listing", e)),
            };

            let scan = scanner.scan(record, pid, &lines);
            counters.scanned.fetch_add(1, Ordering::Relaxed);
            counters
                .skipped
                .fetch_add(scan.skipped_lines, Ordering::Relaxed);
        }
        Ok(())
    }

    fn aggregate_tables(
        &self,
        store: &mut UserStatsStore,
        summary: &mut RunSummary,
    ) -> Result<(), CollectError> {
        let tcp = self
            .source
            .tcp_snapshot(false)
            .map_err(|e| CollectError::unavailable("tcp table", e))?;
        let tcp6 = self
            .source
            .tcp_snapshot(true)
            .map_err(|e| CollectError::unavailable("tcp6 table", e))?;

        let mut aggregator = ConnectionTableAggregator::new(store);
        let mut tables = aggregator.process(&tcp, false);
        tables.merge(&aggregator.process(&tcp6, true));

        apply_table_summary(summary, &tables);
        Ok(())
    }
}

#[derive(Default)]
struct ScanCounters {
    scanned: AtomicU64,
    vanished: AtomicU64,
    skipped: AtomicU64,
}

fn apply_table_summary(summary: &mut RunSummary, tables: &TableSummary) {
    summary.tcp_lines = tables.lines;
    summary.tcp_tracked_lines = tables.tracked_lines;
    summary.skipped_lines += tables.skipped_lines;
}

impl<S: SnapshotSource> Collector for SocketCollector<S> {
    #[instrument(skip_all)]
    fn collect(&self, cancel: &CancelToken) -> Result<CollectedRun, CollectError> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        cancel.checkpoint(RunStep::UnixIndex)?;
        let unix = self.build_unix_index()?;
        summary.unix_entries = unix.len();
        summary.skipped_lines += unix.skipped_lines() as u64;
        debug!("Loaded {} unix socket entries", unix.len());

        cancel.checkpoint(RunStep::ProcessList)?;
        let mut store = self.register_users(&mut summary)?;
        summary.tracked_users = store.len();
        debug!(
            "Tracking {} users with {} processes",
            store.len(),
            store.process_count()
        );

        cancel.checkpoint(RunStep::DescriptorScan)?;
        let scanner = DescriptorScanner::new(&unix, store.mode());
        let counters = ScanCounters::default();
        let records: Vec<&mut UserRecord> = store.records_mut().collect();
        records
            .into_par_iter()
            .try_for_each(|record| self.scan_user(&scanner, record, &counters, cancel))?;

        summary.scanned_processes = counters.scanned.load(Ordering::Relaxed);
        summary.vanished_processes = counters.vanished.load(Ordering::Relaxed);
        summary.skipped_lines += counters.skipped.load(Ordering::Relaxed);
        summary.unix_claimed = unix.claimed_count();

        // Every scan has joined here; the tables read the finished histograms.
        cancel.checkpoint(RunStep::ConnectionTables)?;
        self.aggregate_tables(&mut store, &mut summary)?;

        summary.duration_seconds = start.elapsed().as_secs_f64();
        info!(
            "Collected {} users, {} processes ({} vanished), {} unix sockets ({} claimed), {} tcp lines in {:.2}ms",
            summary.tracked_users,
            summary.scanned_processes,
            summary.vanished_processes,
            summary.unix_entries,
            summary.unix_claimed,
            summary.tcp_lines,
            summary.duration_seconds * 1000.0
        );

        Ok(CollectedRun { store, summary })
    }
}
