use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pyrunner_core::config::ExecutionConfig;
use pyrunner_core::{JobId, RunId};
use pyrunner_store::{timestamp, Binding, JobStore, StoreError, StoreRouter};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Result, RunError};
use crate::lock::{BatchSignature, ExecutionPermit, LockRegistry};
use crate::{installer, recorder, resolver, runner};

/// What happened to one `execute_job` call.
///
/// Callers are free to ignore this; the persisted run record is the
/// authoritative outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Dispatch {
    /// An attempt was made and recorded.
    Ran { run_id: Option<RunId>, success: bool },
    /// The same job+batch is already executing.
    Duplicate,
    NotFound,
    Disabled,
    /// The job could not be looked up; storage is unavailable.
    LookupFailed { error: String },
    /// The attempt's task panicked outside the script pipeline.
    Aborted { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    Disabled,
    NoVersion,
    LookupFailed,
}

/// Result of a run-now request across several jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunNowReport {
    pub triggered: Vec<JobId>,
    pub skipped: Vec<(JobId, SkipReason)>,
}

/// Drives jobs through lock → start → resolve → install → run → record.
pub struct Executor {
    router: StoreRouter,
    locks: Arc<LockRegistry>,
    settings: ExecutionConfig,
}

impl Executor {
    /// Executor sharing the process-wide lock registry.
    pub fn new(router: StoreRouter, settings: ExecutionConfig) -> Self {
        Self::with_locks(router, settings, LockRegistry::global())
    }

    pub fn with_locks(
        router: StoreRouter,
        settings: ExecutionConfig,
        locks: Arc<LockRegistry>,
    ) -> Self {
        Self {
            router,
            locks,
            settings,
        }
    }

    pub fn router(&self) -> &StoreRouter {
        &self.router
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// Execute one job against `files`, recording the outcome.
    ///
    /// Never fails: every error after admission ends up in the job's run
    /// history as a failed run, and a duplicate invocation is only logged.
    ///
    /// Once admitted, the attempt runs on its own task that owns the
    /// execution permit. Dropping or aborting the returned future does not
    /// cancel it: the script still finishes, gets recorded, and only then
    /// releases the batch.
    pub async fn execute_job(&self, job_id: &JobId, files: Vec<PathBuf>) -> Dispatch {
        info!(%job_id, files = files.len(), "job START");

        let job = match self.router.default_store().get_job(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(%job_id, "job not found, nothing to run");
                return Dispatch::NotFound;
            }
            Err(e) => {
                error!(%job_id, "job lookup failed: {e}");
                return Dispatch::LookupFailed {
                    error: e.to_string(),
                };
            }
        };
        if !job.enabled {
            info!(%job_id, "job disabled, not running");
            return Dispatch::Disabled;
        }
        let store = Arc::clone(self.router.for_alias(job.db_alias.as_deref()));

        let sig = BatchSignature::new(job_id, &files);
        let Some(permit) = self.locks.acquire(sig) else {
            info!(%job_id, files = files.len(), "job SKIPPED: identical batch already running");
            return Dispatch::Duplicate;
        };

        let attempt = tokio::spawn(attempt(
            store,
            job.id,
            job.db_alias,
            files,
            self.settings.clone(),
            permit,
        ));
        match attempt.await {
            Ok(dispatch) => dispatch,
            Err(join_err) => {
                error!(%job_id, "execution task died: {join_err}");
                Dispatch::Aborted {
                    error: join_err.to_string(),
                }
            }
        }
    }

    /// Run [`execute_job`](Self::execute_job) on the tokio runtime without
    /// waiting for it.
    pub fn spawn_job(self: &Arc<Self>, job_id: JobId, files: Vec<PathBuf>) -> JoinHandle<Dispatch> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.execute_job(&job_id, files).await })
    }

    /// Trigger every enabled job in `job_ids` that has a code version bound.
    ///
    /// Selected jobs are spawned with no input files; the report lists
    /// what was triggered and why the rest were passed over.
    pub fn run_now(self: &Arc<Self>, job_ids: &[JobId]) -> RunNowReport {
        let mut report = RunNowReport::default();
        for job_id in job_ids {
            let job = match self.router.default_store().get_job(job_id) {
                Ok(Some(job)) => job,
                Ok(None) => {
                    report.skipped.push((job_id.clone(), SkipReason::NotFound));
                    continue;
                }
                Err(e) => {
                    error!(%job_id, "job lookup failed: {e}");
                    report.skipped.push((job_id.clone(), SkipReason::LookupFailed));
                    continue;
                }
            };
            if !job.enabled {
                report.skipped.push((job.id, SkipReason::Disabled));
                continue;
            }
            if job.version_id.is_none() {
                warn!(job_id = %job.id, name = %job.name, "no code version bound, skipping");
                report.skipped.push((job.id, SkipReason::NoVersion));
                continue;
            }
            self.spawn_job(job.id.clone(), Vec::new());
            report.triggered.push(job.id);
        }
        info!(
            triggered = report.triggered.len(),
            skipped = report.skipped.len(),
            "run-now dispatched"
        );
        report
    }
}

/// Start, execute and record one admitted attempt, holding `permit` until
/// the outcome is written.
async fn attempt(
    store: Arc<dyn JobStore>,
    job_id: JobId,
    db_alias: Option<String>,
    files: Vec<PathBuf>,
    settings: ExecutionConfig,
    permit: ExecutionPermit,
) -> Dispatch {
    let start = match store.begin_run(&job_id, timestamp()) {
        Ok(start) => start,
        Err(StoreError::NotFound { .. }) => {
            warn!(%job_id, alias = ?db_alias, "job missing from its routed database");
            return Dispatch::NotFound;
        }
        Err(e) => {
            let err = RunError::Store(e);
            error!(%job_id, kind = err.kind(), "could not start run: {err}");
            recorder::record(
                store.as_ref(),
                &job_id,
                None,
                false,
                &err.to_message(),
                settings.message_cap,
            );
            info!(%job_id, success = false, "job END");
            return Dispatch::Ran {
                run_id: None,
                success: false,
            };
        }
    };

    let run_id = start.run.as_ref().map(|r| r.id.clone());
    let message_cap = settings.message_cap;
    let pipeline = tokio::spawn(pipeline(
        start.binding,
        run_id.clone().unwrap_or_default(),
        files,
        settings,
    ));
    let outcome = match pipeline.await {
        Ok(res) => res,
        Err(join_err) => Err(RunError::Aborted(join_err.to_string())),
    };

    let (success, message) = match outcome {
        Ok(out) => (out.success, out.message),
        Err(err) => {
            warn!(%job_id, kind = err.kind(), "run failed: {err}");
            (false, err.to_message())
        }
    };

    recorder::record(
        store.as_ref(),
        &job_id,
        start.run.as_ref(),
        success,
        &message,
        message_cap,
    );
    drop(permit);
    info!(%job_id, run_id = ?run_id, success, "job END");
    Dispatch::Ran { run_id, success }
}

/// Resolve, install and run. Runs in its own task so a panic surfaces as a
/// `JoinError` rather than tearing down the caller.
async fn pipeline(
    binding: Option<Binding>,
    run_id: RunId,
    files: Vec<PathBuf>,
    settings: ExecutionConfig,
) -> Result<runner::RunOutcome> {
    let env = resolver::resolve(binding.as_ref(), &settings.entry_point)?;
    installer::install_if_present(
        &env.source_root,
        &env.runtime_root,
        &settings.manifest,
        Duration::from_secs(settings.install_timeout_secs),
    )
    .await?;
    runner::run(
        &env,
        &run_id,
        &files,
        Duration::from_secs(settings.exec_timeout_secs),
        settings.message_cap,
    )
    .await
}
