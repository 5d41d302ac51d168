//! Integration tests for complete collection runs.
//!
//! These tests drive the collector end to end over in-memory and on-disk
//! snapshots and check the reported per-user values.

mod common;

use common::*;
use herakles_sockstat_exporter::{
    CancelToken, CollectError, Collector, CollectorOptions, FixtureSource, KnownSocketMode,
    LineReporter, MemorySource, RecordingReporter, RunStep, SnapshotSource, SocketCollector,
    SourceError, TcpState, UserMetric,
};

fn scenario() -> MemorySource {
    MemorySource::new()
        .with_unix(&unix_table())
        .with_tcp(&tcp_table())
        .with_tcp6(&[TCP_HEADER])
        .with_processes(&process_list())
        .with_listing("10", &listing_10())
        .with_listing("11", &listing_11())
}

fn unified() -> CollectorOptions {
    CollectorOptions {
        known_socket_mode: KnownSocketMode::Unified,
        ..CollectorOptions::default()
    }
}

fn run(source: MemorySource, options: CollectorOptions) -> RecordingReporter {
    let collector = SocketCollector::new(source, options);
    let mut reporter = RecordingReporter::default();
    collector
        .run_once(&mut reporter, &CancelToken::new())
        .expect("run should succeed");
    reporter
}

#[test]
fn test_end_to_end_scenario() {
    let reporter = run(scenario(), CollectorOptions::default());

    assert_eq!(reporter.value(5000, UserMetric::OpenFiles), Some(5));
    assert_eq!(reporter.value(5000, UserMetric::KnownSockets), Some(2));
    assert_eq!(reporter.value(5000, UserMetric::UnknownSockets), Some(1));
    assert_eq!(
        reporter.value(5000, UserMetric::TcpState(TcpState::Established)),
        Some(1)
    );
    assert_eq!(
        reporter.value(5000, UserMetric::TcpState(TcpState::Listen)),
        Some(1)
    );

    // root is outside the tracked range, its TCP line is ignored
    assert!(reporter.emissions.iter().all(|e| e.uid == 5000));
}

#[test]
fn test_run_summary_counters() {
    let collector = SocketCollector::new(scenario(), CollectorOptions::default());
    let run = collector.collect(&CancelToken::new()).unwrap();

    assert_eq!(run.summary.unix_entries, 2);
    assert_eq!(run.summary.unix_claimed, 2);
    assert_eq!(run.summary.tracked_users, 1);
    assert_eq!(run.summary.scanned_processes, 2);
    assert_eq!(run.summary.vanished_processes, 0);
    assert_eq!(run.summary.tcp_lines, 3);
    assert_eq!(run.summary.tcp_tracked_lines, 2);
    assert_eq!(run.summary.skipped_lines, 0);

    let carol = run.store.get(5000).unwrap();
    assert_eq!(carol.user_name, "carol");
    assert_eq!(carol.pids, vec!["10", "11"]);
    assert_eq!(carol.distinct_inodes(), 3);
}

#[test]
fn test_line_reporter_output() {
    let collector = SocketCollector::new(scenario(), CollectorOptions::default());
    let mut reporter = LineReporter::default();
    collector
        .run_once(&mut reporter, &CancelToken::new())
        .unwrap();

    assert_eq!(
        reporter.lines,
        vec![
            "users carol openfiles 5",
            "sockstat counts users carol sockets known 2",
            "sockstat counts users carol sockets unknown 1",
            "users carol tcp established 1",
            "users carol tcp listen 1",
        ]
    );
}

#[test]
fn test_both_paths_credit_in_legacy_mode() {
    let mut tcp = tcp_table();
    tcp.push(tcp_line("01", 5000, "300"));
    tcp.push(tcp_line("06", 5000, "100"));
    let source = scenario().with_tcp(&tcp);

    let legacy = run(source.clone(), CollectorOptions::default());
    // two unix claims plus two TCP lines referencing descriptor inodes
    assert_eq!(legacy.value(5000, UserMetric::KnownSockets), Some(4));
    assert_eq!(legacy.value(5000, UserMetric::UnknownSockets), Some(0));

    let unified = run(source, unified());
    // inode 100 was already credited by its unix claim
    assert_eq!(unified.value(5000, UserMetric::KnownSockets), Some(3));
    assert_eq!(unified.value(5000, UserMetric::UnknownSockets), Some(0));
    assert_eq!(
        unified.value(5000, UserMetric::TcpState(TcpState::TimeWait)),
        Some(1)
    );
}

#[test]
fn test_unix_entry_claimed_once_across_users() {
    let mut processes = process_list();
    processes.push(" 6000 dave                              20".to_string());
    let dave_listing = vec![
        "total 0".to_string(),
        ".".to_string(),
        "..".to_string(),
        "lrwx------ 1 dave dave 64 Jun 18 19:33 7 -> socket:[100]".to_string(),
    ];
    let source = scenario()
        .with_processes(&processes)
        .with_listing("20", &dave_listing);

    let collector = SocketCollector::new(source, CollectorOptions::default());
    let run = collector.collect(&CancelToken::new()).unwrap();

    let carol = run.store.get(5000).unwrap();
    let dave = run.store.get(6000).unwrap();
    // exactly one of them won the single entry for inode 100
    assert_eq!(carol.known_sockets + dave.known_sockets, 2);
    assert_eq!(run.summary.unix_claimed, 2);
    assert!(dave.has_inode("100"));
    assert_eq!(dave.open_files, 1);
}

#[test]
fn test_shared_inode_entries_credit_each_holder() {
    let mut unix = unix_table();
    unix.push("ffff8f2a1c3e4c00: 00000003 00000000 00000000 0001 03 100".to_string());
    let mut processes = process_list();
    processes.push(" 6000 dave                              20".to_string());
    let dave_listing = vec![
        "total 0".to_string(),
        ".".to_string(),
        "..".to_string(),
        "lrwx------ 1 dave dave 64 Jun 18 19:33 7 -> socket:[100]".to_string(),
    ];
    let source = scenario()
        .with_unix(&unix)
        .with_processes(&processes)
        .with_listing("20", &dave_listing);

    let reporter = run(source, CollectorOptions::default());
    assert_eq!(reporter.value(5000, UserMetric::KnownSockets), Some(2));
    assert_eq!(reporter.value(6000, UserMetric::KnownSockets), Some(1));
    assert_eq!(reporter.value(6000, UserMetric::UnknownSockets), Some(0));
}

#[test]
fn test_malformed_lines_are_skipped() {
    let mut unix = unix_table();
    unix.push("ffff8f2a1c3e5000: 00000002".to_string());
    let mut tcp = tcp_table();
    tcp.push(tcp_line("01", 5000, "300").replace(" 5000 ", " carol "));
    let mut processes = process_list();
    processes.push("garbage".to_string());

    let source = scenario()
        .with_unix(&unix)
        .with_tcp(&tcp)
        .with_processes(&processes);
    let collector = SocketCollector::new(source, CollectorOptions::default());
    let mut reporter = RecordingReporter::default();
    let summary = collector
        .run_once(&mut reporter, &CancelToken::new())
        .unwrap();

    assert_eq!(summary.skipped_lines, 3);
    assert_eq!(reporter.value(5000, UserMetric::OpenFiles), Some(5));
    assert_eq!(reporter.value(5000, UserMetric::KnownSockets), Some(2));
    assert_eq!(
        reporter.value(5000, UserMetric::TcpState(TcpState::Established)),
        Some(1)
    );
}

#[test]
fn test_vanished_process_is_skipped() {
    let mut processes = process_list();
    processes.push(" 5000 carol                             12".to_string());
    let source = scenario().with_processes(&processes);

    let collector = SocketCollector::new(source, CollectorOptions::default());
    let mut reporter = RecordingReporter::default();
    let summary = collector
        .run_once(&mut reporter, &CancelToken::new())
        .unwrap();

    assert_eq!(summary.vanished_processes, 1);
    assert_eq!(summary.scanned_processes, 2);
    assert_eq!(reporter.value(5000, UserMetric::OpenFiles), Some(5));
}

#[test]
fn test_missing_table_reports_nothing() {
    let source = MemorySource::new()
        .with_unix(&unix_table())
        .with_tcp(&tcp_table())
        .with_processes(&process_list())
        .with_listing("10", &listing_10())
        .with_listing("11", &listing_11());

    let collector = SocketCollector::new(source, CollectorOptions::default());
    let mut reporter = RecordingReporter::default();
    let err = collector
        .run_once(&mut reporter, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(
        err,
        CollectError::SourceUnavailable {
            input: "tcp6 table",
            ..
        }
    ));
    assert!(reporter.emissions.is_empty());
}

/// Cancels the run as soon as the first descriptor listing is requested.
struct CancellingSource {
    inner: MemorySource,
    cancel: CancelToken,
}

impl SnapshotSource for CancellingSource {
    fn unix_snapshot(&self) -> Result<Vec<String>, SourceError> {
        self.inner.unix_snapshot()
    }

    fn tcp_snapshot(&self, ipv6: bool) -> Result<Vec<String>, SourceError> {
        self.inner.tcp_snapshot(ipv6)
    }

    fn process_list(&self) -> Result<Vec<String>, SourceError> {
        self.inner.process_list()
    }

    fn descriptor_listing(&self, pid: &str) -> Result<Vec<String>, SourceError> {
        self.cancel.cancel();
        self.inner.descriptor_listing(pid)
    }
}

#[test]
fn test_cancelled_mid_scan_reports_nothing() {
    let cancel = CancelToken::new();
    let source = CancellingSource {
        inner: scenario(),
        cancel: cancel.clone(),
    };
    let collector = SocketCollector::new(source, CollectorOptions::default());

    let mut reporter = RecordingReporter::default();
    let err = collector.run_once(&mut reporter, &cancel).unwrap_err();

    assert!(matches!(
        err,
        CollectError::Cancelled {
            step: RunStep::DescriptorScan
        }
    ));
    assert!(reporter.emissions.is_empty());
}

#[test]
fn test_fixture_directory_run() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let collector = SocketCollector::new(FixtureSource::new(dir.path()), unified());
    let mut reporter = RecordingReporter::default();
    let summary = collector
        .run_once(&mut reporter, &CancelToken::new())
        .unwrap();

    assert_eq!(summary.scanned_processes, 2);
    assert_eq!(reporter.value(5000, UserMetric::OpenFiles), Some(5));
    assert_eq!(reporter.value(5000, UserMetric::KnownSockets), Some(2));
    assert_eq!(reporter.value(5000, UserMetric::UnknownSockets), Some(1));
}

#[test]
fn test_runs_are_independent() {
    let collector = SocketCollector::new(scenario(), CollectorOptions::default());

    let first = collector.collect(&CancelToken::new()).unwrap();
    let second = collector.collect(&CancelToken::new()).unwrap();

    // claims and counters start from scratch on every run
    let a = first.store.get(5000).unwrap();
    let b = second.store.get(5000).unwrap();
    assert_eq!(a.known_sockets, b.known_sockets);
    assert_eq!(a.open_files, b.open_files);
    assert_eq!(second.summary.unix_claimed, 2);
}
