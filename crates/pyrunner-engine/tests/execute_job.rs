//! End-to-end runs against a fake runtime whose `python` hands the entry
//! point to `/bin/sh`, so each test's `main.py` is a shell script.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pyrunner_core::config::ExecutionConfig;
use pyrunner_core::JobId;
use pyrunner_engine::{Dispatch, Executor, LockRegistry, SkipReason};
use pyrunner_store::{JobStore, LastRunStatus, NewJob, RunRecord, SqliteStore, StoreRouter};

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    job: JobId,
    settings: ExecutionConfig,
}

impl Fixture {
    /// A bound, enabled job whose entry point is `script`.
    fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("venv");
        write_exec(&runtime.join("bin/python"), "exec /bin/sh \"$@\"");

        let source = dir.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("main.py"), script).unwrap();

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let rt = store
            .insert_runtime("py3", runtime.to_str().unwrap())
            .unwrap();
        let version = store
            .insert_code_version("etl", &rt.id, source.to_str().unwrap())
            .unwrap();
        let job = store
            .insert_job(NewJob::new("etl").with_version(version.id))
            .unwrap();

        Self {
            dir,
            store,
            job: job.id,
            settings: ExecutionConfig::default(),
        }
    }

    fn runtime(&self) -> PathBuf {
        self.dir.path().join("venv")
    }

    fn source(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    fn executor(&self) -> Arc<Executor> {
        Arc::new(Executor::with_locks(
            StoreRouter::new(self.store.clone()),
            self.settings.clone(),
            Arc::new(LockRegistry::new()),
        ))
    }

    async fn run(&self, files: Vec<PathBuf>) -> Dispatch {
        self.executor().execute_job(&self.job, files).await
    }

    fn only_run(&self) -> RunRecord {
        let mut runs = self.store.list_runs(&self.job, 10).unwrap();
        assert_eq!(runs.len(), 1, "expected exactly one run record");
        runs.remove(0)
    }

    /// Job summary must mirror the run it was derived from.
    fn assert_summary_matches(&self, run: &RunRecord) {
        let job = self.store.get_job(&self.job).unwrap().unwrap();
        assert_eq!(job.last_run, run.finished_at);
        assert_eq!(job.last_status, LastRunStatus::from_success(run.success));
    }
}

fn write_exec(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn successful_script_records_output() {
    let fx = Fixture::new("echo OK");
    let dispatch = fx.run(vec![]).await;

    let run = fx.only_run();
    assert_eq!(
        dispatch,
        Dispatch::Ran {
            run_id: Some(run.id.clone()),
            success: true
        }
    );
    assert!(run.success);
    assert_eq!(run.message, "OK");
    assert!(run.finished_at.unwrap() >= run.started_at);
    assert!(run.version_id.is_some());
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn script_receives_run_id_then_files() {
    let fx = Fixture::new(r#"echo "$1 $2 $3""#);
    fx.run(vec![PathBuf::from("/data/b.csv"), PathBuf::from("/data/a.csv")])
        .await;

    let run = fx.only_run();
    assert_eq!(run.message, format!("{} /data/b.csv /data/a.csv", run.id));
}

#[tokio::test]
async fn nonzero_exit_is_a_failed_run() {
    let fx = Fixture::new("echo 'Traceback: boom' >&2; exit 3");
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.contains("Traceback: boom"));
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn overrunning_script_is_killed() {
    let mut fx = Fixture::new("sleep 30; touch finished");
    fx.settings.exec_timeout_secs = 1;
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.contains("timed out"), "{}", run.message);
    assert!(!fx.source().join("finished").exists());

    let job = fx.store.get_job(&fx.job).unwrap().unwrap();
    assert_eq!(job.last_status, LastRunStatus::Failed);
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn missing_interpreter_fails_without_running() {
    let fx = Fixture::new("touch ran");
    let python = fx.runtime().join("bin/python");
    fs::remove_file(&python).unwrap();
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.starts_with("Error: "));
    assert!(run.message.contains(python.to_str().unwrap()));
    assert!(!fx.source().join("ran").exists());
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn missing_entry_point_fails() {
    let fx = Fixture::new("echo OK");
    fs::remove_file(fx.source().join("main.py")).unwrap();
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.contains("main.py not found"));
}

#[tokio::test]
async fn unbound_job_gets_synthesized_record() {
    let fx = Fixture::new("echo OK");
    let job = fx.store.insert_job(NewJob::new("unbound")).unwrap();

    let dispatch = fx.executor().execute_job(&job.id, vec![]).await;
    assert_eq!(
        dispatch,
        Dispatch::Ran {
            run_id: None,
            success: false
        }
    );

    let runs = fx.store.list_runs(&job.id, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].finished_at, Some(runs[0].started_at));
    assert!(runs[0].version_id.is_none());

    let job = fx.store.get_job(&job.id).unwrap().unwrap();
    assert_eq!(job.last_run, runs[0].finished_at);
    assert_eq!(job.last_status, LastRunStatus::Failed);
}

#[tokio::test]
async fn requirements_without_pip_still_runs() {
    let fx = Fixture::new("echo OK");
    fs::write(fx.source().join("requirements.txt"), "pandas\n").unwrap();
    fx.run(vec![]).await;
    assert!(fx.only_run().success);
}

#[tokio::test]
async fn no_requirements_skips_install() {
    let fx = Fixture::new("echo OK");
    write_exec(&fx.runtime().join("bin/pip"), "touch \"$PWD/pip-ran\"; exit 1");
    fx.run(vec![]).await;

    assert!(fx.only_run().success);
    assert!(!fx.source().join("pip-ran").exists());
}

#[tokio::test]
async fn failed_install_stops_before_script() {
    let fx = Fixture::new("touch ran; echo OK");
    fs::write(fx.source().join("requirements.txt"), "no-such-pkg\n").unwrap();
    write_exec(
        &fx.runtime().join("bin/pip"),
        "echo 'ERROR: Could not find a version that satisfies no-such-pkg' >&2; exit 1",
    );
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.contains("pip install failed"));
    assert!(run.message.contains("Could not find a version"));
    assert!(!fx.source().join("ran").exists());
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn successful_install_precedes_script() {
    let fx = Fixture::new("test -f installed && echo OK");
    fs::write(fx.source().join("requirements.txt"), "requests\n").unwrap();
    write_exec(&fx.runtime().join("bin/pip"), "touch installed");
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert!(run.success, "{}", run.message);
    assert_eq!(run.message, "OK");
}

#[tokio::test]
async fn long_output_truncated_to_cap() {
    let fx = Fixture::new("head -c 8000 /dev/zero | tr '\\0' 'z'");
    fx.run(vec![]).await;

    let run = fx.only_run();
    assert_eq!(run.message.chars().count(), 3000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_batch_is_rejected() {
    let fx = Fixture::new("sleep 1; echo OK");
    let exec = fx.executor();
    let files = vec![PathBuf::from("/in/a.csv"), PathBuf::from("/in/b.csv")];
    let reordered = vec![PathBuf::from("/in/b.csv"), PathBuf::from("/in/a.csv")];

    let (first, second) = tokio::join!(
        exec.execute_job(&fx.job, files),
        exec.execute_job(&fx.job, reordered),
    );

    let outcomes = [first, second];
    let ran = outcomes
        .iter()
        .filter(|d| matches!(d, Dispatch::Ran { success: true, .. }))
        .count();
    let dupes = outcomes
        .iter()
        .filter(|d| **d == Dispatch::Duplicate)
        .count();
    assert_eq!((ran, dupes), (1, 1));
    assert_eq!(fx.store.list_runs(&fx.job, 10).unwrap().len(), 1);
    assert!(exec.locks().is_empty());
}

#[tokio::test]
async fn different_batches_both_run() {
    let fx = Fixture::new("echo OK");
    let exec = fx.executor();

    let (a, b) = tokio::join!(
        exec.execute_job(&fx.job, vec![PathBuf::from("/in/a.csv")]),
        exec.execute_job(&fx.job, vec![PathBuf::from("/in/b.csv")]),
    );
    assert!(matches!(a, Dispatch::Ran { .. }));
    assert!(matches!(b, Dispatch::Ran { .. }));
    assert_eq!(fx.store.list_runs(&fx.job, 10).unwrap().len(), 2);
}

#[tokio::test]
async fn lock_released_after_each_run() {
    let fx = Fixture::new("exit 1");
    let exec = fx.executor();
    for _ in 0..3 {
        exec.execute_job(&fx.job, vec![]).await;
    }
    assert_eq!(fx.store.list_runs(&fx.job, 10).unwrap().len(), 3);
    assert!(exec.locks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aborted_caller_does_not_release_batch_early() {
    let fx = Fixture::new("sleep 2; echo OK");
    let exec = fx.executor();
    let files = vec![PathBuf::from("/in/a.csv")];

    let handle = exec.spawn_job(fx.job.clone(), files.clone());
    while exec.locks().is_empty() {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    // the attempt is still running and still owns its batch
    assert!(!exec.locks().is_empty());
    assert_eq!(exec.execute_job(&fx.job, files).await, Dispatch::Duplicate);

    for _ in 0..200 {
        if exec.locks().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(exec.locks().is_empty());
    let run = fx.only_run();
    assert!(run.success);
    assert_eq!(run.message, "OK");
    fx.assert_summary_matches(&run);
}

#[tokio::test]
async fn background_child_cannot_stretch_the_budget() {
    let mut fx = Fixture::new("sleep 30 & echo started");
    fx.settings.exec_timeout_secs = 1;
    let started = std::time::Instant::now();
    fx.run(vec![]).await;

    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    let run = fx.only_run();
    assert!(!run.success);
    assert!(run.message.contains("timed out"), "{}", run.message);
    assert!(fx.executor().locks().is_empty());
}

#[tokio::test]
async fn disabled_job_leaves_no_record() {
    let fx = Fixture::new("echo OK");
    let mut new = NewJob::new("paused");
    new.enabled = false;
    let job = fx.store.insert_job(new).unwrap();

    assert_eq!(
        fx.executor().execute_job(&job.id, vec![]).await,
        Dispatch::Disabled
    );
    assert!(fx.store.list_runs(&job.id, 10).unwrap().is_empty());
}

#[tokio::test]
async fn runs_land_in_aliased_database() {
    let fx = Fixture::new("echo OK");
    let archive = Arc::new(SqliteStore::in_memory().unwrap());
    let rt = archive
        .insert_runtime("py3", fx.runtime().to_str().unwrap())
        .unwrap();
    let version = archive
        .insert_code_version("etl", &rt.id, fx.source().to_str().unwrap())
        .unwrap();
    let routed = fx
        .store
        .insert_job(NewJob::new("archived").with_db_alias("archive"))
        .unwrap();
    archive
        .insert_job(
            NewJob::new("archived")
                .with_id(routed.id.clone())
                .with_version(version.id),
        )
        .unwrap();

    let router = StoreRouter::new(fx.store.clone()).with_alias("archive", archive.clone());
    let exec = Executor::with_locks(router, fx.settings.clone(), Arc::new(LockRegistry::new()));
    exec.execute_job(&routed.id, vec![]).await;

    assert!(fx.store.list_runs(&routed.id, 10).unwrap().is_empty());
    let runs = archive.list_runs(&routed.id, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].success);
}

#[tokio::test]
async fn run_now_triggers_only_runnable_jobs() {
    let fx = Fixture::new("echo OK");
    let unbound = fx.store.insert_job(NewJob::new("unbound")).unwrap();
    let exec = fx.executor();

    let report = exec.run_now(&[fx.job.clone(), unbound.id.clone()]);
    assert_eq!(report.triggered, vec![fx.job.clone()]);
    assert_eq!(report.skipped, vec![(unbound.id.clone(), SkipReason::NoVersion)]);

    // the spawned run finishes in the background
    for _ in 0..100 {
        if !fx.store.list_runs(&fx.job, 10).unwrap().is_empty() && exec.locks().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(fx.only_run().success);
    assert!(fx.store.list_runs(&unbound.id, 10).unwrap().is_empty());
}
