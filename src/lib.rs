//! Herakles Socket Statistics Exporter Library
//!
//! Correlates three kernel snapshots into per-user socket statistics:
//! the descriptor tables of each process, the UNIX domain socket table and
//! the TCP/TCP6 connection tables. The join key is the socket inode.
//!
//! # Features
//!
//! - **Claim-once matching**: every unix socket entry is credited to at most
//!   one descriptor per run, safely across scanner threads
//! - **Defensive parsing**: malformed lines are skipped and counted, never fatal
//! - **All-or-nothing runs**: a run either reports every tracked user or nothing
//! - **Pluggable inputs and outputs**: [`SnapshotSource`] and [`Reporter`]
//!
//! # Usage
//!
//! ```rust
//! use herakles_sockstat_exporter::{
//!     CancelToken, Collector, CollectorOptions, LineReporter, MemorySource, SocketCollector,
//! };
//!
//! let header = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";
//! let source = MemorySource::new()
//!     .with_unix(&["Num RefCount Protocol Flags Type St Inode Path"])
//!     .with_processes(&["UID USER PID", "1000 alice 42"])
//!     .with_listing("42", &["total 0", ".", ".."])
//!     .with_tcp(&[header])
//!     .with_tcp6(&[header]);
//!
//! let collector = SocketCollector::new(source, CollectorOptions::default());
//! let mut reporter = LineReporter::default();
//! collector.run_once(&mut reporter, &CancelToken::new()).unwrap();
//!
//! assert_eq!(reporter.lines[0], "users alice openfiles 0");
//! ```

pub mod collector;
pub mod connections;
pub mod descriptors;
pub mod error;
pub mod health_stats;
pub mod report;
pub mod sources;
pub mod tcp_state;
pub mod unix_sockets;
pub mod user_stats;

// Re-export main types for convenience
pub use collector::{
    CancelToken, CollectedRun, Collector, CollectorOptions, RunStep, RunSummary, SocketCollector,
};
pub use error::{CollectError, SourceError};
pub use report::{Emission, LineReporter, RecordingReporter, Reporter, UserMetric};
pub use sources::{FixtureSource, MemorySource, ProcSource, SnapshotSource};
pub use tcp_state::TcpState;
pub use user_stats::{KnownSocketMode, TrackedUsers, UserRecord, UserStatsStore};
