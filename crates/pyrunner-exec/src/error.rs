//! Error types for the pyrunner-exec crate.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can originate from running a child process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying I/O failure while waiting on the child.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The child exceeded its time budget and was killed.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
