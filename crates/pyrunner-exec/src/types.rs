//! Request and result types for child-process execution.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Default budget when the caller does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully specified child-process invocation.
///
/// Arguments are passed as a vector, never through a shell, so file paths
/// containing spaces or quotes reach the child untouched.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of a child that exited on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Process exit code. `-1` when the child was terminated by a signal.
    pub exit_code: i32,

    /// Captured standard output, decoded lossily.
    pub stdout: String,

    /// Captured standard error, decoded lossily.
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined by a newline, surrounding whitespace trimmed.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_and_trims() {
        let out = ExecOutput {
            exit_code: 0,
            stdout: "OK\n".to_string(),
            stderr: "warning: x\n".to_string(),
        };
        assert_eq!(out.combined(), "OK\n\nwarning: x");
    }

    #[test]
    fn combined_of_silent_child_is_empty() {
        let out = ExecOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(out.combined().is_empty());
        assert!(!out.success());
    }

    #[test]
    fn builder_keeps_argument_order() {
        let req = ExecRequest::new("/bin/echo", "/")
            .arg("a")
            .args(["b", "c"])
            .timeout(Duration::from_secs(1));
        assert_eq!(req.args, vec!["a", "b", "c"]);
        assert_eq!(req.timeout, Duration::from_secs(1));
    }
}
