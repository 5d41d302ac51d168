//! Raw inputs of a collection run.
//!
//! A [`SnapshotSource`] hands out the unix socket table, the TCP tables, the
//! process list and per-process descriptor listings as text lines. The
//! collector only ever sees lines, so live `/proc`, fixture directories and
//! in-memory data are interchangeable.

use ahash::AHashMap as HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::SourceError;

/// Provider of the raw snapshots one run consumes.
pub trait SnapshotSource: Send + Sync {
    /// `/proc/net/unix` lines, header first.
    fn unix_snapshot(&self) -> Result<Vec<String>, SourceError>;

    /// `/proc/net/tcp` (or `tcp6` when `ipv6`) lines, header first.
    fn tcp_snapshot(&self, ipv6: bool) -> Result<Vec<String>, SourceError>;

    /// `ps -eo uid,user:30,pid` lines, header first.
    fn process_list(&self) -> Result<Vec<String>, SourceError>;

    /// `ls -fl /proc/<pid>/fd` lines.
    fn descriptor_listing(&self, pid: &str) -> Result<Vec<String>, SourceError>;
}

/// One (uid, user, pid) triple of the process list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub uid: u32,
    pub user_name: String,
    pub pid: String,
}

/// Parsed process list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessList {
    pub entries: Vec<ProcessEntry>,
    pub skipped_lines: usize,
}

/// Parses process list lines:
/// ```text
///  UID USER                             PID
///  102 messagebus                       923
/// 5078 bsekulic                        1063
/// ```
/// Lines without exactly three fields, a numeric uid and a numeric pid are
/// skipped.
pub fn parse_process_list<S: AsRef<str>>(lines: &[S]) -> ProcessList {
    let mut list = ProcessList::default();

    for line in lines.iter().skip(1) {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let entry = match fields.as_slice() {
            [uid, user, pid] if pid.bytes().all(|b| b.is_ascii_digit()) => {
                uid.parse().ok().map(|uid| ProcessEntry {
                    uid,
                    user_name: user.to_string(),
                    pid: pid.to_string(),
                })
            }
            _ => None,
        };

        match entry {
            Some(entry) => list.entries.push(entry),
            None => {
                debug!("Skipping malformed process list line: {:?}", line);
                list.skipped_lines += 1;
            }
        }
    }

    list
}

fn to_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

fn read_lines(path: &Path) -> Result<Vec<String>, SourceError> {
    fs::read_to_string(path)
        .map(|content| to_lines(&content))
        .map_err(|e| SourceError::io(path, e))
}

/// Live source backed by procfs, `ps` and `ls`.
#[derive(Debug, Clone)]
pub struct ProcSource {
    proc_root: PathBuf,
}

impl Default for ProcSource {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcSource {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Runs a command in the C locale and returns its stdout lines.
    ///
    /// Exit status 1 with output is accepted: `ls` reports descriptors that
    /// closed while it was reading links this way.
    fn run(mut command: Command, display: String) -> Result<Vec<String>, SourceError> {
        let output = command
            .env("LC_ALL", "C")
            .output()
            .map_err(|e| SourceError::Spawn {
                command: display.clone(),
                source: e,
            })?;

        let minor_problem = output.status.code() == Some(1) && !output.stdout.is_empty();
        if !output.status.success() && !minor_problem {
            return Err(SourceError::CommandFailed {
                command: display,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if minor_problem {
            let command_line = &display;
            debug!(
                "`{}` reported minor problems: {}",
                command_line,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(to_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SnapshotSource for ProcSource {
    fn unix_snapshot(&self) -> Result<Vec<String>, SourceError> {
        read_lines(&self.proc_root.join("net/unix"))
    }

    fn tcp_snapshot(&self, ipv6: bool) -> Result<Vec<String>, SourceError> {
        let table = if ipv6 { "net/tcp6" } else { "net/tcp" };
        read_lines(&self.proc_root.join(table))
    }

    fn process_list(&self) -> Result<Vec<String>, SourceError> {
        let mut command = Command::new("ps");
        command.args(["-eo", "uid,user:30,pid"]);
        Self::run(command, "ps -eo uid,user:30,pid".to_string())
    }

    fn descriptor_listing(&self, pid: &str) -> Result<Vec<String>, SourceError> {
        let fd_dir = self.proc_root.join(pid).join("fd");
        let mut command = Command::new("ls");
        command.arg("-fl").arg(&fd_dir);

        match Self::run(command, format!("ls -fl {}", fd_dir.display())) {
            Err(SourceError::CommandFailed { .. }) if !self.proc_root.join(pid).exists() => {
                Err(SourceError::Vanished {
                    pid: pid.to_string(),
                })
            }
            other => other,
        }
    }
}

/// Source reading captured snapshots from a directory:
/// `unix`, `tcp`, `tcp6`, `ps` and one `fd/<pid>` file per process.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    root: PathBuf,
}

impl FixtureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SnapshotSource for FixtureSource {
    fn unix_snapshot(&self) -> Result<Vec<String>, SourceError> {
        read_lines(&self.root.join("unix"))
    }

    fn tcp_snapshot(&self, ipv6: bool) -> Result<Vec<String>, SourceError> {
        read_lines(&self.root.join(if ipv6 { "tcp6" } else { "tcp" }))
    }

    fn process_list(&self) -> Result<Vec<String>, SourceError> {
        read_lines(&self.root.join("ps"))
    }

    fn descriptor_listing(&self, pid: &str) -> Result<Vec<String>, SourceError> {
        let path = self.root.join("fd").join(pid);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(to_lines(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SourceError::Vanished {
                pid: pid.to_string(),
            }),
            Err(e) => Err(SourceError::io(path, e)),
        }
    }
}

/// In-memory source. Unset snapshots fail as unavailable; pids without a
/// listing behave like exited processes.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    unix: Option<Vec<String>>,
    tcp: Option<Vec<String>>,
    tcp6: Option<Vec<String>>,
    processes: Option<Vec<String>>,
    listings: HashMap<String, Vec<String>>,
}

fn owned<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines.iter().map(|l| l.as_ref().to_string()).collect()
}

fn missing(name: &str) -> SourceError {
    SourceError::io(
        format!("memory://{name}"),
        std::io::Error::new(ErrorKind::NotFound, "snapshot not provided"),
    )
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unix<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.unix = Some(owned(lines));
        self
    }

    pub fn with_tcp<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.tcp = Some(owned(lines));
        self
    }

    pub fn with_tcp6<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.tcp6 = Some(owned(lines));
        self
    }

    pub fn with_processes<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.processes = Some(owned(lines));
        self
    }

    pub fn with_listing<S: AsRef<str>>(mut self, pid: &str, lines: &[S]) -> Self {
        self.listings.insert(pid.to_string(), owned(lines));
        self
    }
}

impl SnapshotSource for MemorySource {
    fn unix_snapshot(&self) -> Result<Vec<String>, SourceError> {
        self.unix.clone().ok_or_else(|| missing("unix"))
    }

    fn tcp_snapshot(&self, ipv6: bool) -> Result<Vec<String>, SourceError> {
        if ipv6 {
            self.tcp6.clone().ok_or_else(|| missing("tcp6"))
        } else {
            self.tcp.clone().ok_or_else(|| missing("tcp"))
        }
    }

    fn process_list(&self) -> Result<Vec<String>, SourceError> {
        self.processes.clone().ok_or_else(|| missing("ps"))
    }

    fn descriptor_listing(&self, pid: &str) -> Result<Vec<String>, SourceError> {
        self.listings
            .get(pid)
            .cloned()
            .ok_or_else(|| SourceError::Vanished {
                pid: pid.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_list() {
        let lines = [
            "  UID USER                             PID",
            "  102 messagebus                       923",
            "  101 syslog                           985",
            " 5078 bsekulic                        1063",
        ];
        let list = parse_process_list(&lines);
        assert_eq!(list.skipped_lines, 0);
        assert_eq!(list.entries.len(), 3);
        assert_eq!(
            list.entries[2],
            ProcessEntry {
                uid: 5078,
                user_name: "bsekulic".to_string(),
                pid: "1063".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_process_list_skips_malformed() {
        let lines = [
            "UID USER PID",
            "abc alice 12",
            "1000 alice",
            "1000 alice x12",
            "1000 alice 12 extra",
            "",
            "1000 alice 13",
        ];
        let list = parse_process_list(&lines);
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].pid, "13");
        assert_eq!(list.skipped_lines, 4);
    }

    #[test]
    fn test_memory_source_missing_snapshots() {
        let source = MemorySource::new().with_unix(&["header"]);
        assert!(source.unix_snapshot().is_ok());
        assert!(source.tcp_snapshot(false).is_err());
        assert!(source.descriptor_listing("1").unwrap_err().is_vanished());
    }

    #[test]
    fn test_fixture_source_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("unix"), "header\nline\n").unwrap();
        fs::create_dir(dir.path().join("fd")).unwrap();
        fs::write(dir.path().join("fd").join("42"), "total 0\n").unwrap();

        let source = FixtureSource::new(dir.path());
        assert_eq!(source.unix_snapshot().unwrap(), vec!["header", "line"]);
        assert_eq!(source.descriptor_listing("42").unwrap(), vec!["total 0"]);
        assert!(source.descriptor_listing("43").unwrap_err().is_vanished());
        assert!(matches!(
            source.tcp_snapshot(true),
            Err(SourceError::Io { .. })
        ));
    }

    #[test]
    fn test_proc_source_reads_own_process() {
        // Only meaningful on Linux with procfs mounted
        if !Path::new("/proc/self/fd").exists() {
            return;
        }
        let source = ProcSource::default();
        assert!(source.unix_snapshot().is_ok());
        assert!(source.tcp_snapshot(false).is_ok());
    }
}
