//! Error types of the collection pipeline.

use std::path::PathBuf;

use crate::collector::RunStep;

/// Failure to obtain one raw input.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The process exited between the process list and its descriptor listing.
    #[error("process {pid} exited before its descriptors could be listed")]
    Vanished { pid: String },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, SourceError::Vanished { .. })
    }
}

/// Failure of a whole collection run. No partial report exists when a run
/// returns one of these.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("{input} unavailable: {error}")]
    SourceUnavailable {
        input: &'static str,
        #[source]
        error: SourceError,
    },

    #[error("collection cancelled before {step}")]
    Cancelled { step: RunStep },
}

impl CollectError {
    pub fn unavailable(input: &'static str, error: SourceError) -> Self {
        CollectError::SourceUnavailable { input, error }
    }
}
