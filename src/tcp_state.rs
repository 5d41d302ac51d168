//! TCP connection state decoding.
//!
//! The `st` column of `/proc/net/tcp` and `/proc/net/tcp6` carries the kernel
//! socket state as two hex digits. This module maps those codes to canonical
//! lowercase names through a constant table.

use std::fmt;

/// Canonical TCP connection states as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Closed,
    /// Any code outside `01`..`0C`. Rendered as `error` for compatibility
    /// with existing dashboards.
    Unknown,
}

/// Hex code to state lookup, in kernel order.
const STATE_TABLE: [(&str, TcpState); 12] = [
    ("01", TcpState::Established),
    ("02", TcpState::SynSent),
    ("03", TcpState::SynRecv),
    ("04", TcpState::FinWait1),
    ("05", TcpState::FinWait2),
    ("06", TcpState::TimeWait),
    ("07", TcpState::Close),
    ("08", TcpState::CloseWait),
    ("09", TcpState::LastAck),
    ("0A", TcpState::Listen),
    ("0B", TcpState::Closing),
    ("0C", TcpState::Closed),
];

impl TcpState {
    /// Decodes a two-digit hex state code. Unrecognised input never fails,
    /// it yields [`TcpState::Unknown`].
    pub fn decode(code: &str) -> Self {
        STATE_TABLE
            .iter()
            .find(|(hex, _)| hex.eq_ignore_ascii_case(code))
            .map(|(_, state)| *state)
            .unwrap_or(TcpState::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcpState::Established => "established",
            TcpState::SynSent => "syn_sent",
            TcpState::SynRecv => "syn_recv",
            TcpState::FinWait1 => "fin_wait1",
            TcpState::FinWait2 => "fin_wait2",
            TcpState::TimeWait => "time_wait",
            TcpState::Close => "close",
            TcpState::CloseWait => "close_wait",
            TcpState::LastAck => "last_ack",
            TcpState::Listen => "listen",
            TcpState::Closing => "closing",
            TcpState::Closed => "closed",
            TcpState::Unknown => "error",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TcpState::Unknown)
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
