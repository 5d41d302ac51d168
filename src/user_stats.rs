//! Per-user aggregation records for one collection run.
//!
//! A [`UserStatsStore`] is created empty at the start of every run, filled by
//! the descriptor scanner and the connection table aggregator, and read once
//! when the run is reported. Nothing in here outlives a run.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tcp_state::TcpState;

/// Lower exclusive bound of regular user ids.
pub const DEFAULT_MIN_UID: u32 = 100;
/// Upper exclusive bound of regular user ids.
pub const DEFAULT_MAX_UID: u32 = 9999;
/// System accounts tracked despite being outside the range (www-data).
pub const DEFAULT_EXTRA_UIDS: [u32; 1] = [33];

/// Decides which user ids are aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUsers {
    pub min_uid: u32,
    pub max_uid: u32,
    pub extra_uids: Vec<u32>,
}

impl Default for TrackedUsers {
    fn default() -> Self {
        Self {
            min_uid: DEFAULT_MIN_UID,
            max_uid: DEFAULT_MAX_UID,
            extra_uids: DEFAULT_EXTRA_UIDS.to_vec(),
        }
    }
}

impl TrackedUsers {
    /// `min_uid < uid < max_uid`, or one of the extra ids.
    pub fn contains(&self, uid: u32) -> bool {
        (uid > self.min_uid && uid < self.max_uid) || self.extra_uids.contains(&uid)
    }
}

/// How the two corroboration paths credit known sockets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownSocketMode {
    /// Every successful unix claim and every TCP line whose inode was seen in
    /// the user's descriptors adds one, even for the same socket.
    #[default]
    Legacy,
    /// An inode is credited at most once per user, whichever path sees it
    /// first.
    Unified,
}

/// Aggregated socket statistics of one user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uid: u32,
    pub user_name: String,
    pub pids: Vec<String>,
    pub open_files: u64,
    pub known_sockets: u64,
    /// inode -> number of descriptors referencing it
    pub inodes: HashMap<String, u64>,
    pub tcp_states: BTreeMap<TcpState, u64>,
    credited: HashSet<String>,
}

impl UserRecord {
    pub fn new(uid: u32, user_name: &str) -> Self {
        Self {
            uid,
            user_name: user_name.to_string(),
            pids: Vec::new(),
            open_files: 0,
            known_sockets: 0,
            inodes: HashMap::new(),
            tcp_states: BTreeMap::new(),
            credited: HashSet::new(),
        }
    }

    /// Appends a pid unless it is already listed.
    pub fn add_pid(&mut self, pid: &str) -> bool {
        if self.pids.iter().any(|p| p == pid) {
            return false;
        }
        self.pids.push(pid.to_string());
        true
    }

    pub fn record_inode(&mut self, inode: &str) {
        *self.inodes.entry(inode.to_string()).or_insert(0) += 1;
    }

    pub fn has_inode(&self, inode: &str) -> bool {
        self.inodes.contains_key(inode)
    }

    pub fn is_credited(&self, inode: &str) -> bool {
        self.credited.contains(inode)
    }

    /// Credits `inode` as a known socket. Returns whether the count changed.
    pub fn credit_known(&mut self, inode: &str, mode: KnownSocketMode) -> bool {
        if mode == KnownSocketMode::Unified && !self.credited.insert(inode.to_string()) {
            return false;
        }
        self.known_sockets += 1;
        true
    }

    pub fn record_state(&mut self, state: TcpState) {
        *self.tcp_states.entry(state).or_insert(0) += 1;
    }

    pub fn distinct_inodes(&self) -> u64 {
        self.inodes.len() as u64
    }

    /// Distinct socket inodes minus known sockets. In legacy mode the two
    /// crediting paths can push `known_sockets` past the inode count, hence
    /// the floor at zero.
    pub fn unknown_sockets(&self) -> u64 {
        self.distinct_inodes().saturating_sub(self.known_sockets)
    }
}

/// uid -> record mapping of one run.
#[derive(Debug, Clone, Default)]
pub struct UserStatsStore {
    users: HashMap<u32, UserRecord>,
    mode: KnownSocketMode,
}

impl UserStatsStore {
    pub fn new(mode: KnownSocketMode) -> Self {
        Self {
            users: HashMap::new(),
            mode,
        }
    }

    pub fn mode(&self) -> KnownSocketMode {
        self.mode
    }

    /// Registers `pid` for `uid`, creating the record on first sight.
    /// Later processes of the same user extend the existing record.
    pub fn track_process(&mut self, uid: u32, user_name: &str, pid: &str) -> &mut UserRecord {
        let record = self
            .users
            .entry(uid)
            .or_insert_with(|| UserRecord::new(uid, user_name));
        record.add_pid(pid);
        record
    }

    pub fn get(&self, uid: u32) -> Option<&UserRecord> {
        self.users.get(&uid)
    }

    pub fn get_mut(&mut self, uid: u32) -> Option<&mut UserRecord> {
        self.users.get_mut(&uid)
    }

    pub fn contains(&self, uid: u32) -> bool {
        self.users.contains_key(&uid)
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut UserRecord> {
        self.users.values_mut()
    }

    /// Records ordered by uid, for stable output.
    pub fn sorted_records(&self) -> Vec<&UserRecord> {
        let mut records: Vec<&UserRecord> = self.users.values().collect();
        records.sort_by_key(|r| r.uid);
        records
    }

    pub fn process_count(&self) -> usize {
        self.users.values().map(|r| r.pids.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
