//! Reporting of a completed run.
//!
//! A run is reported as (user, metric, value) tuples. How those become metric
//! names is up to the [`Reporter`] implementation.

use crate::tcp_state::TcpState;
use crate::user_stats::UserStatsStore;

/// Kind of a per-user value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserMetric {
    OpenFiles,
    KnownSockets,
    UnknownSockets,
    TcpState(TcpState),
}

/// Receiver of per-user values.
pub trait Reporter {
    fn emit(&mut self, uid: u32, user: &str, metric: UserMetric, value: u64);
}

/// Emits every record of `store`, ordered by uid: open files, known sockets,
/// unknown sockets, then one value per observed TCP state.
pub fn report_store(store: &UserStatsStore, reporter: &mut dyn Reporter) {
    for record in store.sorted_records() {
        let user = record.user_name.as_str();
        reporter.emit(record.uid, user, UserMetric::OpenFiles, record.open_files);
        reporter.emit(record.uid, user, UserMetric::KnownSockets, record.known_sockets);
        reporter.emit(
            record.uid,
            user,
            UserMetric::UnknownSockets,
            record.unknown_sockets(),
        );
        for (state, count) in &record.tcp_states {
            reporter.emit(record.uid, user, UserMetric::TcpState(*state), *count);
        }
    }
}

/// One reported value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub uid: u32,
    pub user: String,
    pub metric: UserMetric,
    pub value: u64,
}

/// Keeps every emission in order. Used to stage a complete report before it
/// is published.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    pub emissions: Vec<Emission>,
}

impl RecordingReporter {
    pub fn value(&self, uid: u32, metric: UserMetric) -> Option<u64> {
        self.emissions
            .iter()
            .find(|e| e.uid == uid && e.metric == metric)
            .map(|e| e.value)
    }

    pub fn into_emissions(self) -> Vec<Emission> {
        self.emissions
    }
}

impl Reporter for RecordingReporter {
    fn emit(&mut self, uid: u32, user: &str, metric: UserMetric, value: u64) {
        self.emissions.push(Emission {
            uid,
            user: user.to_string(),
            metric,
            value,
        });
    }
}

/// Renders the classic plain-text lines, e.g.
/// `users alice openfiles 12` or `users alice tcp listen 3`.
#[derive(Debug, Clone, Default)]
pub struct LineReporter {
    pub lines: Vec<String>,
}

impl Reporter for LineReporter {
    fn emit(&mut self, _uid: u32, user: &str, metric: UserMetric, value: u64) {
        let line = match metric {
            UserMetric::OpenFiles => format!("users {user} openfiles {value}"),
            UserMetric::KnownSockets => format!("sockstat counts users {user} sockets known {value}"),
            UserMetric::UnknownSockets => {
                format!("sockstat counts users {user} sockets unknown {value}")
            }
            UserMetric::TcpState(state) => format!("users {user} tcp {state} {value}"),
        };
        self.lines.push(line);
    }
}
