//! Job runner — starts the entry-point script with the resolved interpreter.

use std::path::PathBuf;
use std::time::Duration;

use pyrunner_core::RunId;
use pyrunner_exec::{process, truncate::truncate_chars, ExecError, ExecRequest};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, RunError};
use crate::resolver::ResolvedEnv;

/// Outcome of a script that ran to completion within its budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// `true` iff the exit code was zero.
    pub success: bool,
    /// Combined output, or `"Success"` / `"Failed"` when there was none,
    /// truncated to the message cap.
    pub message: String,
}

/// Run `python <entry_point> <run_id> <files...>` from the source root.
///
/// # Errors
///
/// - `ExecutionTimeout` — the script outlived `timeout` and was killed.
/// - `Exec`             — the interpreter could not be spawned.
pub async fn run(
    env: &ResolvedEnv,
    run_id: &RunId,
    files: &[PathBuf],
    timeout: Duration,
    message_cap: usize,
) -> Result<RunOutcome> {
    let req = ExecRequest::new(&env.interpreter, &env.source_root)
        .arg(&env.entry_point)
        .arg(run_id.as_str())
        .args(files)
        .timeout(timeout);

    let out = match process::exec(req).await {
        Ok(out) => out,
        Err(ExecError::Timeout { secs }) => return Err(RunError::ExecutionTimeout { secs }),
        Err(e) => return Err(RunError::Exec(e)),
    };

    let success = out.success();
    let text = out.combined();
    let message = if text.is_empty() {
        if success { "Success" } else { "Failed" }.to_string()
    } else {
        truncate_chars(&text, message_cap)
    };

    info!(%run_id, exit_code = out.exit_code, success, "script finished");
    Ok(RunOutcome {
        exit_code: out.exit_code,
        success,
        message,
    })
}
