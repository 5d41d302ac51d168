//! Startup requirement validation for herakles-sockstat-exporter.
//!
//! This module validates that the exporter has the permissions, kernel tables
//! and external tools it needs before starting.

use herakles_sockstat_exporter::descriptors::DESCRIPTOR_HEADER_LINES;
use herakles_sockstat_exporter::{ProcSource, SnapshotSource};
use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Kernel tables read on every run, relative to the proc root.
pub const NET_TABLES: [&str; 3] = ["net/unix", "net/tcp", "net/tcp6"];

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_net_tables(proc_root)?;
    check_process_list(proc_root)?;
    check_descriptor_listing(proc_root)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - descriptors of other users cannot be listed");
        warn!("   Recommendation: Run as root for complete per-user statistics");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that the unix and TCP tables can be read
pub fn check_net_tables(proc_root: &Path) -> Result<(), ValidationError> {
    for table in NET_TABLES {
        let path = proc_root.join(table);
        match fs::File::open(&path) {
            Ok(_) => info!("✅ {} readable", path.display()),
            Err(e) => {
                error!("❌ Cannot read {}: {}", path.display(), e);
                return Err(ValidationError::NetTableUnavailable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Check that `ps` runs and prints a header line
pub fn check_process_list(proc_root: &Path) -> Result<(), ValidationError> {
    let lines = ProcSource::new(proc_root)
        .process_list()
        .map_err(|e| ValidationError::ToolUnavailable(e.to_string()))?;
    if lines.is_empty() {
        return Err(ValidationError::ToolUnavailable(
            "ps printed no output".to_string(),
        ));
    }
    info!("✅ ps available ({} processes listed)", lines.len() - 1);
    Ok(())
}

/// Check that `ls -fl` output starts with the header the scanner discounts
pub fn check_descriptor_listing(proc_root: &Path) -> Result<(), ValidationError> {
    let lines = ProcSource::new(proc_root)
        .descriptor_listing("self")
        .map_err(|e| ValidationError::ToolUnavailable(e.to_string()))?;
    check_listing_header(&lines)?;
    info!("✅ ls descriptor listing format recognised");
    Ok(())
}

/// A listing must start with `total`, followed by the `.` and `..` entries.
pub fn check_listing_header<S: AsRef<str>>(lines: &[S]) -> Result<(), ValidationError> {
    let header: Vec<&str> = lines
        .iter()
        .take(DESCRIPTOR_HEADER_LINES)
        .map(|l| l.as_ref().trim_end())
        .collect();

    let well_formed = header.len() == DESCRIPTOR_HEADER_LINES
        && header[0].starts_with("total")
        && header[1..].iter().any(|l| l.ends_with(" ."))
        && header[1..].iter().any(|l| l.ends_with(" .."));

    if !well_formed {
        warn!("⚠️  Unexpected descriptor listing header: {:?}", header);
        warn!("   Open file counts will be off by the difference");
        return Err(ValidationError::UnexpectedListingFormat(header.join(" | ")));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Cannot read {path}: {reason}")]
    NetTableUnavailable { path: String, reason: String },

    #[error("Required tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Unexpected descriptor listing header: {0}")]
    UnexpectedListingFormat(String),
}
