//! TCP/TCP6 connection table aggregation.
//!
//! Format (`/proc/net/tcp`, `/proc/net/tcp6` use the same column positions):
//! ```text
//!  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
//!   0: 476036C6:A1C2 191E1EAC:C7B0 03 00000000:00000000 01:000000D6 00000003   703        0 0 2 0000000000000000
//!   1: 00000000:0562 00000000:0000 0A 00000000:00000000 00:00000000 00000000  5009        0 276725449 1 0000000000000000 100 0 0 10 0
//! ```

use tracing::debug;

use crate::tcp_state::TcpState;
use crate::user_stats::UserStatsStore;

pub const STATE_FIELD: usize = 3;
pub const UID_FIELD: usize = 7;
pub const INODE_FIELD: usize = 9;

/// The columns of a connection line this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLine<'a> {
    pub state: TcpState,
    pub uid: u32,
    pub inode: &'a str,
}

/// Parses one data line. `None` for short lines or a non-numeric uid.
pub fn parse_connection_line(line: &str) -> Option<ConnectionLine<'_>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= INODE_FIELD {
        return None;
    }

    let uid = fields[UID_FIELD].parse().ok()?;
    Some(ConnectionLine {
        state: TcpState::decode(fields[STATE_FIELD]),
        uid,
        inode: fields[INODE_FIELD],
    })
}

/// Counters for one processed table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub lines: u64,
    pub tracked_lines: u64,
    pub known: u64,
    pub skipped_lines: u64,
}

impl TableSummary {
    pub fn merge(&mut self, other: &TableSummary) {
        self.lines += other.lines;
        self.tracked_lines += other.tracked_lines;
        self.known += other.known;
        self.skipped_lines += other.skipped_lines;
    }
}

/// Folds connection tables into the users of a store.
///
/// Must only run after every descriptor scan of the run has finished: the
/// known-socket check reads the inode histograms those scans produced.
#[derive(Debug)]
pub struct ConnectionTableAggregator<'a> {
    store: &'a mut UserStatsStore,
}

impl<'a> ConnectionTableAggregator<'a> {
    pub fn new(store: &'a mut UserStatsStore) -> Self {
        Self { store }
    }

    /// Processes one table snapshot; the first line is the header.
    pub fn process<S: AsRef<str>>(&mut self, lines: &[S], ipv6: bool) -> TableSummary {
        let table = if ipv6 { "tcp6" } else { "tcp" };
        let mode = self.store.mode();
        let mut summary = TableSummary::default();

        for line in lines.iter().skip(1) {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            summary.lines += 1;

            let Some(conn) = parse_connection_line(line) else {
                debug!(table, "Skipping malformed connection line: {:?}", line);
                summary.skipped_lines += 1;
                continue;
            };

            let Some(record) = self.store.get_mut(conn.uid) else {
                continue;
            };
            summary.tracked_lines += 1;

            if record.has_inode(conn.inode) && record.credit_known(conn.inode, mode) {
                summary.known += 1;
            }
            record.record_state(conn.state);
        }

        summary
    }
}
