use std::path::PathBuf;

use pyrunner_exec::ExecError;
use pyrunner_store::StoreError;
use thiserror::Error;

/// Every way a single execution attempt can fail.
///
/// A script that exits non-zero is not an error: it produces a
/// [`RunOutcome`](crate::RunOutcome) with `success = false`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The job has no code version bound to it.
    #[error("no code version is bound to this job")]
    NotConfigured,

    /// The runtime does not contain an interpreter binary.
    #[error("interpreter not found: {}", path.display())]
    InterpreterMissing { path: PathBuf },

    /// No entry-point file anywhere under the extracted source root.
    #[error("{name} not found under {}", root.display())]
    EntryPointMissing { name: String, root: PathBuf },

    /// The package installer exited non-zero.
    #[error("pip install failed (exit code {exit_code}):\n{stderr}")]
    DependencyInstall { exit_code: i32, stderr: String },

    /// The package installer outlived its budget and was killed.
    #[error("pip install timed out after {secs}s")]
    DependencyInstallTimeout { secs: u64 },

    /// The script outlived its budget and was killed.
    #[error("execution timed out after {secs}s")]
    ExecutionTimeout { secs: u64 },

    /// The child could not be spawned or waited on.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The run-start transaction failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The execution task panicked or was cancelled.
    #[error("execution task aborted: {0}")]
    Aborted(String),
}

impl RunError {
    /// Short, stable category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::NotConfigured => "configuration",
            RunError::InterpreterMissing { .. } => "environment",
            RunError::EntryPointMissing { .. } => "entry_point_missing",
            RunError::DependencyInstall { .. } => "dependency_install",
            RunError::DependencyInstallTimeout { .. } => "dependency_install",
            RunError::ExecutionTimeout { .. } => "execution_timeout",
            RunError::Exec(_) => "execution",
            RunError::Store(_) => "storage",
            RunError::Aborted(_) => "aborted",
        }
    }

    /// Text stored as the failed run's message.
    pub fn to_message(&self) -> String {
        format!("Error: {self}")
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_structured_payload() {
        let err = RunError::InterpreterMissing {
            path: PathBuf::from("/venvs/a/bin/python"),
        };
        assert_eq!(err.to_message(), "Error: interpreter not found: /venvs/a/bin/python");
        assert_eq!(err.kind(), "environment");

        let err = RunError::DependencyInstall {
            exit_code: 1,
            stderr: "No matching distribution".to_string(),
        };
        assert!(err.to_message().contains("No matching distribution"));
    }

    #[test]
    fn timeout_message_mentions_budget() {
        let err = RunError::ExecutionTimeout { secs: 3600 };
        assert_eq!(err.to_string(), "execution timed out after 3600s");
    }
}
