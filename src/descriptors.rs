//! Descriptor scanning for a single process.
//!
//! Consumes the long listing of `/proc/<pid>/fd` as produced by `ls -fl`:
//! ```text
//! total 0
//! dr-x------ 2 alice alice  0 Jun 18 19:33 .
//! dr-xr-xr-x 9 alice alice  0 Jun 18 19:33 ..
//! lrwx------ 1 alice alice 64 Jun 18 19:33 25 -> socket:[3788798698]
//! lr-x------ 1 alice alice 64 Jun 18 19:33 26 -> /var/log/app.log
//! ```
//! Socket lines owned by the user feed the user's inode histogram and are
//! matched against the unix socket index.

use tracing::debug;

use crate::unix_sockets::UnixSocketIndex;
use crate::user_stats::{KnownSocketMode, UserRecord};

/// Marker separating the descriptor from a socket link target.
pub const SOCKET_MARKER: &str = "-> socket:";

/// Non-descriptor lines `ls -fl` prepends: the `total` line plus the `.`
/// and `..` entries. Verified against the live listing by the startup checks.
pub const DESCRIPTOR_HEADER_LINES: usize = 3;

/// Zero-based owner column of the long listing.
const OWNER_FIELD: usize = 2;

/// Extracts the decimal inode from the first `[<digits>]` group after the
/// socket marker. Returns `None` when the marker or a well-formed group is
/// missing.
pub fn extract_socket_inode(line: &str) -> Option<&str> {
    let (_, target) = line.split_once(SOCKET_MARKER)?;
    let open = target.find('[')?;
    let rest = &target[open + 1..];
    let close = rest.find(']')?;
    let digits = &rest[..close];

    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

/// Owner name of a long-listing line.
pub fn owner_field(line: &str) -> Option<&str> {
    line.split_whitespace().nth(OWNER_FIELD)
}

/// Result of scanning one process listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorScan {
    pub open_files: u64,
    pub socket_lines: u64,
    pub claimed: u64,
    pub skipped_lines: u64,
}

/// Scans descriptor listings against a shared unix socket index.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorScanner<'a> {
    unix: &'a UnixSocketIndex,
    mode: KnownSocketMode,
}

impl<'a> DescriptorScanner<'a> {
    pub fn new(unix: &'a UnixSocketIndex, mode: KnownSocketMode) -> Self {
        Self { unix, mode }
    }

    /// Scans the listing of `pid` on behalf of `record`.
    ///
    /// Only socket lines whose owner column equals the record's user name are
    /// considered. Each inode bumps the histogram, then tries one claim in the
    /// unix index; a won claim credits a known socket. In unified mode an inode
    /// the record already credited claims nothing.
    pub fn scan<S: AsRef<str>>(
        &self,
        record: &mut UserRecord,
        pid: &str,
        lines: &[S],
    ) -> DescriptorScan {
        let mut scan = DescriptorScan {
            open_files: lines.len().saturating_sub(DESCRIPTOR_HEADER_LINES) as u64,
            ..DescriptorScan::default()
        };

        for line in lines {
            let line = line.as_ref();
            if !line.contains(SOCKET_MARKER) {
                continue;
            }
            if owner_field(line) != Some(record.user_name.as_str()) {
                continue;
            }

            let Some(inode) = extract_socket_inode(line) else {
                debug!(pid, "Skipping socket descriptor without inode: {:?}", line);
                scan.skipped_lines += 1;
                continue;
            };

            scan.socket_lines += 1;
            record.record_inode(inode);

            // A unified credit is final; leave remaining entries to other holders
            if self.mode == KnownSocketMode::Unified && record.is_credited(inode) {
                continue;
            }
            if self.unix.claim_first_unclaimed(inode) && record.credit_known(inode, self.mode) {
                scan.claimed += 1;
            }
        }

        record.open_files += scan.open_files;
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix_index(inodes: &[&str]) -> UnixSocketIndex {
        let mut lines = vec!["Num RefCount Protocol Flags Type St Inode Path".to_string()];
        for inode in inodes {
            lines.push(format!(
                "ffff8800: 00000002 00000000 00010000 0001 01 {} /run/test.sock",
                inode
            ));
        }
        UnixSocketIndex::load(lines)
    }

    fn listing(owner: &str, targets: &[&str]) -> Vec<String> {
        let mut lines = vec![
            "total 0".to_string(),
            format!("dr-x------ 2 {owner} {owner}  0 Jun 18 19:33 ."),
            format!("dr-xr-xr-x 9 {owner} {owner}  0 Jun 18 19:33 .."),
        ];
        for (fd, target) in targets.iter().enumerate() {
            lines.push(format!(
                "lrwx------ 1 {owner} {owner} 64 Jun 18 19:33 {fd} -> {target}"
            ));
        }
        lines
    }

    #[test]
    fn test_extract_socket_inode() {
        assert_eq!(
            extract_socket_inode("lrwx------ 1 root root 64 Jun 18 19:33 25 -> socket:[3788798698]"),
            Some("3788798698")
        );
        assert_eq!(extract_socket_inode("x -> socket:[1]"), Some("1"));
    }

    #[test]
    fn test_extract_socket_inode_malformed() {
        assert_eq!(extract_socket_inode("x -> socket:[]"), None);
        assert_eq!(extract_socket_inode("x -> socket:[12a]"), None);
        assert_eq!(extract_socket_inode("x -> socket:[123"), None);
        assert_eq!(extract_socket_inode("x -> socket:"), None);
        assert_eq!(extract_socket_inode("x -> /dev/null"), None);
        // Brackets before the marker are not the inode
        assert_eq!(extract_socket_inode("[99] -> socket:oops"), None);
    }

    #[test]
    fn test_owner_field() {
        assert_eq!(
            owner_field("lrwx------ 1 alice users 64 Jun 18 19:33 3 -> socket:[1]"),
            Some("alice")
        );
        assert_eq!(owner_field("total 0"), None);
    }

    #[test]
    fn test_scan_claims_matching_unix_socket() {
        let index = unix_index(&["12345"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "alice");

        let lines = listing("alice", &["socket:[12345]"]);
        let scan = scanner.scan(&mut record, "4242", &lines);

        assert_eq!(record.inodes.get("12345"), Some(&1));
        assert_eq!(record.known_sockets, 1);
        assert!(index.entries()[0].is_claimed());
        assert_eq!(scan.claimed, 1);
        assert_eq!(scan.socket_lines, 1);
    }

    #[test]
    fn test_scan_open_file_count() {
        let index = unix_index(&[]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "alice");

        let lines = listing("alice", &["/dev/null", "/dev/pts/0", "socket:[5]", "pipe:[6]"]);
        let scan = scanner.scan(&mut record, "1", &lines);

        assert_eq!(scan.open_files, 4);
        assert_eq!(record.open_files, 4);
        // Unmatched socket is still part of the histogram
        assert_eq!(record.distinct_inodes(), 1);
        assert_eq!(record.known_sockets, 0);
    }

    #[test]
    fn test_scan_short_listing_saturates() {
        let index = unix_index(&[]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "alice");

        let scan = scanner.scan(&mut record, "1", &["total 0"]);
        assert_eq!(scan.open_files, 0);
    }

    #[test]
    fn test_scan_ignores_other_owners() {
        let index = unix_index(&["10"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "bob");

        // "bobby" contains "bob" but is a different owner
        let lines = listing("bobby", &["socket:[10]"]);
        scanner.scan(&mut record, "1", &lines);

        assert!(record.inodes.is_empty());
        assert_eq!(record.known_sockets, 0);
        assert!(!index.entries()[0].is_claimed());
    }

    #[test]
    fn test_scan_skips_socket_without_inode() {
        let index = unix_index(&[]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "alice");

        let lines = listing("alice", &["socket:[abc]", "socket:[7]"]);
        let scan = scanner.scan(&mut record, "1", &lines);

        assert_eq!(scan.skipped_lines, 1);
        assert_eq!(scan.socket_lines, 1);
        assert_eq!(record.distinct_inodes(), 1);
    }

    #[test]
    fn test_scan_same_inode_claims_each_entry_once() {
        // Two descriptors share one socket, the index has one entry for it
        let index = unix_index(&["900"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut record = UserRecord::new(1000, "alice");

        let lines = listing("alice", &["socket:[900]", "socket:[900]"]);
        scanner.scan(&mut record, "1", &lines);

        assert_eq!(record.inodes.get("900"), Some(&2));
        assert_eq!(record.known_sockets, 1);
    }

    #[test]
    fn test_scan_claims_across_processes_once() {
        let index = unix_index(&["31"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut alice = UserRecord::new(1000, "alice");
        let mut bob = UserRecord::new(1001, "bob");

        scanner.scan(&mut alice, "1", &listing("alice", &["socket:[31]"]));
        scanner.scan(&mut bob, "2", &listing("bob", &["socket:[31]"]));

        assert_eq!(alice.known_sockets + bob.known_sockets, 1);
        assert_eq!(bob.inodes.get("31"), Some(&1));
    }

    #[test]
    fn test_unified_scan_leaves_spare_entry_for_other_user() {
        let index = unix_index(&["900", "900"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Unified);
        let mut alice = UserRecord::new(1000, "alice");
        let mut bob = UserRecord::new(1001, "bob");

        let scan = scanner.scan(&mut alice, "1", &listing("alice", &["socket:[900]", "socket:[900]"]));
        assert_eq!(scan.claimed, 1);
        assert_eq!(index.claimed_count(), 1);

        scanner.scan(&mut bob, "2", &listing("bob", &["socket:[900]"]));
        assert_eq!(alice.known_sockets, 1);
        assert_eq!(bob.known_sockets, 1);
        assert_eq!(index.claimed_count(), 2);
    }

    #[test]
    fn test_legacy_scan_claims_every_matching_entry() {
        let index = unix_index(&["900", "900"]);
        let scanner = DescriptorScanner::new(&index, KnownSocketMode::Legacy);
        let mut alice = UserRecord::new(1000, "alice");
        let mut bob = UserRecord::new(1001, "bob");

        scanner.scan(&mut alice, "1", &listing("alice", &["socket:[900]", "socket:[900]"]));
        scanner.scan(&mut bob, "2", &listing("bob", &["socket:[900]"]));

        assert_eq!(alice.known_sockets, 2);
        assert_eq!(bob.known_sockets, 0);
    }
}
