//! UNIX domain socket index built from `/proc/net/unix`.
//!
//! Format:
//! ```text
//! Num       RefCount Protocol Flags    Type St Inode Path
//! ffff880077748a80: 00000002 00000000 00010000 0001 01  2819 /var/run/acpid.socket
//! ffff88007b17f000: 0000000C 00000000 00000000 0002 01 11238 /dev/log
//! ```
//!
//! Every entry can be claimed exactly once per run. Claims are atomic so
//! descriptor scanners running on several threads never credit the same
//! socket entry twice.

use ahash::AHashMap as HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Zero-based position of the inode column.
pub const UNIX_INODE_FIELD: usize = 6;

/// One row of the unix socket table.
#[derive(Debug)]
pub struct UnixSocketEntry {
    inode: String,
    claimed: AtomicBool,
}

impl UnixSocketEntry {
    fn new(inode: &str) -> Self {
        Self {
            inode: inode.to_string(),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn inode(&self) -> &str {
        &self.inode
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// false -> true transition; returns whether this call performed it.
    fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// All unix socket entries of one snapshot, indexed by inode.
#[derive(Debug, Default)]
pub struct UnixSocketIndex {
    entries: Vec<UnixSocketEntry>,
    by_inode: HashMap<String, Vec<usize>>,
    skipped_lines: usize,
}

impl UnixSocketIndex {
    /// Builds the index from snapshot lines. The first line is the header.
    pub fn load<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();

        for line in lines.into_iter().skip(1) {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }

            match line.split_whitespace().nth(UNIX_INODE_FIELD) {
                Some(inode) => index.push(inode),
                None => {
                    debug!("Skipping malformed unix socket line: {:?}", line);
                    index.skipped_lines += 1;
                }
            }
        }

        index
    }

    fn push(&mut self, inode: &str) {
        let slot = self.entries.len();
        self.entries.push(UnixSocketEntry::new(inode));
        self.by_inode
            .entry(inode.to_string())
            .or_insert_with(Vec::new)
            .push(slot);
    }

    /// Claims the first unclaimed entry carrying `inode`.
    ///
    /// Entries may share an inode value; each of them can be claimed once,
    /// so N entries with the same inode allow N successful calls.
    pub fn claim_first_unclaimed(&self, inode: &str) -> bool {
        let Some(slots) = self.by_inode.get(inode) else {
            return false;
        };
        slots.iter().any(|&slot| self.entries[slot].try_claim())
    }

    pub fn entries(&self) -> &[UnixSocketEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn claimed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_claimed()).count()
    }

    /// Data lines dropped for having too few fields.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}
