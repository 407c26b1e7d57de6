//! Result recorder — the last line of defence against losing run history.
//!
//! Called after the run-start transaction has exited, however the attempt
//! ended. Each write is a plain single statement with no derived side
//! effects, and no error ever leaves this module: failures are logged and
//! swallowed.

use chrono::{DateTime, Utc};
use pyrunner_core::JobId;
use pyrunner_exec::truncate::truncate_chars;
use pyrunner_store::{timestamp, JobStore, LastRunStatus, RunRecord};
use tracing::{debug, error};

/// Persist the outcome of one attempt and refresh the job's summary.
///
/// - With `run`, that record is stamped in place.
/// - Without it, a record is synthesized with identical start and finish.
///
/// The job's `last_run` is set to the same instant as the run's
/// `finished_at`, whether or not the run write succeeded.
pub fn record(
    store: &dyn JobStore,
    job_id: &JobId,
    run: Option<&RunRecord>,
    success: bool,
    message: &str,
    message_cap: usize,
) {
    let message = truncate_chars(message, message_cap);
    let finished_at = not_before(timestamp(), run.map(|r| r.started_at));

    let written = match run {
        Some(run) => store
            .finish_run(&run.id, finished_at, success, &message)
            .map(|()| run.id.clone()),
        None => store
            .insert_finished_run(job_id, None, finished_at, success, &message)
            .map(|r| r.id),
    };
    match written {
        Ok(run_id) => debug!(%job_id, %run_id, success, "run recorded"),
        Err(e) => error!(%job_id, "LOGGING FAILED (non-critical): could not write run: {e}"),
    }

    if let Err(e) =
        store.update_job_summary(job_id, finished_at, LastRunStatus::from_success(success))
    {
        error!(%job_id, "LOGGING FAILED (non-critical): could not update job summary: {e}");
    }
}

/// `now`, or `started_at` if the clock stepped backwards during the run.
fn not_before(now: DateTime<Utc>, started_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match started_at {
        Some(s) if s > now => s,
        _ => now,
    }
}
