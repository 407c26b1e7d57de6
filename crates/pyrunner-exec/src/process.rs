//! Child-process execution with a hard wall-clock budget.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    error::{ExecError, Result},
    types::{ExecOutput, ExecRequest},
};

/// Run `req.program` with `req.args` in `req.cwd`, inheriting the parent's
/// environment, and wait for it to exit.
///
/// stdout and stderr are drained concurrently on their own tasks so a chatty
/// child can never deadlock on a full pipe. A non-zero exit is *not* an
/// error: inspect [`ExecOutput::exit_code`].
///
/// # Errors
///
/// - `Spawn`   — the program could not be started.
/// - `Timeout` — the child outlived `req.timeout` and was killed.
/// - `Io`      — waiting on the child failed.
pub async fn exec(req: ExecRequest) -> Result<ExecOutput> {
    debug!(program = %req.program.display(), args = ?req.args, cwd = %req.cwd.display(), "exec");

    let mut child = Command::new(&req.program)
        .args(&req.args)
        .current_dir(&req.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: req.program.clone(),
            source,
        })?;

    let mut stdout = child.stdout.take().map(drain);
    let mut stderr = child.stderr.take().map(drain);

    // The budget covers draining the pipes as well: a backgrounded
    // grandchild inherits them and can keep them open after the child exits.
    let finished = tokio::time::timeout(req.timeout, async {
        let status = child.wait().await?;
        let out = collect(stdout.as_mut()).await;
        let err = collect(stderr.as_mut()).await;
        Ok::<_, std::io::Error>((status, out, err))
    })
    .await;

    match finished {
        Ok(Ok((status, stdout, stderr))) => Ok(ExecOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        }),

        Ok(Err(e)) => {
            abort(stdout);
            abort(stderr);
            Err(ExecError::Io(e))
        }

        // Deadline expired: kill the child if it is still running. Readers
        // are aborted rather than awaited since grandchildren may still hold
        // the pipes.
        Err(_elapsed) => {
            if !matches!(child.try_wait(), Ok(Some(_))) {
                if let Err(e) = child.kill().await {
                    warn!(program = %req.program.display(), "kill after timeout failed: {e}");
                }
            }
            abort(stdout);
            abort(stderr);
            Err(ExecError::Timeout {
                secs: req.timeout.as_secs(),
            })
        }
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("pipe read ended early: {e}");
        }
        buf
    })
}

/// Await a reader task and decode its bytes, replacing invalid UTF-8.
async fn collect(handle: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(h) => match h.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("output reader task failed: {e}");
                String::new()
            }
        },
        None => String::new(),
    }
}

fn abort(handle: Option<JoinHandle<Vec<u8>>>) {
    if let Some(h) = handle {
        h.abort();
    }
}
