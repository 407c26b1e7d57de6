use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use pyrunner_core::{JobId, RunId, RuntimeId, VersionId};
use rusqlite::{types::Type, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::init_db,
    error::{Result, StoreError},
    types::{
        Binding, CodeVersion, LastRunStatus, NewJob, RunRecord, RunStart, RuntimeEnv,
        ScheduledJob, Trigger,
    },
};

/// Storage operations the execution engine depends on.
///
/// Implementations must be safe to call from many worker tasks at once.
/// Only [`JobStore::begin_run`] is transactional; the remaining writes are
/// single statements so the recorder can call them after a failed run
/// without inheriting any rolled-back state.
pub trait JobStore: Send + Sync {
    fn get_job(&self, id: &JobId) -> Result<Option<ScheduledJob>>;

    fn list_jobs(&self) -> Result<Vec<ScheduledJob>>;

    /// In one transaction: load the job with its bound version and runtime
    /// and, when a version is bound, create the in-flight run record.
    fn begin_run(&self, job_id: &JobId, started_at: DateTime<Utc>) -> Result<RunStart>;

    /// Stamp an existing run with its outcome.
    fn finish_run(
        &self,
        run_id: &RunId,
        finished_at: DateTime<Utc>,
        success: bool,
        message: &str,
    ) -> Result<()>;

    /// Create a run that started and finished at `at`.
    fn insert_finished_run(
        &self,
        job_id: &JobId,
        version_id: Option<&VersionId>,
        at: DateTime<Utc>,
        success: bool,
        message: &str,
    ) -> Result<RunRecord>;

    /// Overwrite the job's last-run summary columns.
    fn update_job_summary(&self, job_id: &JobId, at: DateTime<Utc>, status: LastRunStatus)
        -> Result<()>;

    fn get_run(&self, id: &RunId) -> Result<Option<RunRecord>>;

    /// Runs of one job, newest first.
    fn list_runs(&self, job_id: &JobId, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Current UTC time at the precision stored in the database.
///
/// Values produced here survive a write/read cycle unchanged, so a job's
/// `last_run` compares equal to the `finished_at` it was copied from.
pub fn timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// SQLite-backed [`JobStore`].
///
/// Wraps a single connection in a `Mutex`; every operation is short, so
/// workers only contend for the duration of one statement.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

const JOB_COLUMNS: &str = "id, name, enabled, trigger_spec, version_id, db_alias,
                           last_run, last_status, created_at, updated_at";

const RUN_COLUMNS: &str = "id, job_id, version_id, started_at, finished_at, success, message";

impl SqliteStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register an interpreter installation.
    #[instrument(skip(self))]
    pub fn insert_runtime(&self, name: &str, root_path: &str) -> Result<RuntimeEnv> {
        let runtime = RuntimeEnv {
            id: RuntimeId::new(),
            name: name.to_string(),
            root_path: root_path.to_string(),
            created_at: timestamp(),
        };
        self.conn()?.execute(
            "INSERT INTO runtimes (id, name, root_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                runtime.id.as_str(),
                runtime.name,
                runtime.root_path,
                fmt_ts(runtime.created_at)
            ],
        )?;
        info!(runtime_id = %runtime.id, %name, "runtime registered");
        Ok(runtime)
    }

    /// Register an extracted code version. The version number is the next
    /// one for `deployment_id`, starting at 1.
    #[instrument(skip(self))]
    pub fn insert_code_version(
        &self,
        deployment_id: &str,
        runtime_id: &RuntimeId,
        extracted_path: &str,
    ) -> Result<CodeVersion> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let version_number: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM code_versions
             WHERE deployment_id = ?1",
            [deployment_id],
            |row| row.get(0),
        )?;
        let version = CodeVersion {
            id: VersionId::new(),
            deployment_id: deployment_id.to_string(),
            version_number,
            runtime_id: runtime_id.clone(),
            extracted_path: extracted_path.to_string(),
            created_at: timestamp(),
        };
        tx.execute(
            "INSERT INTO code_versions
             (id, deployment_id, version_number, runtime_id, extracted_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                version.id.as_str(),
                version.deployment_id,
                version.version_number,
                version.runtime_id.as_str(),
                version.extracted_path,
                fmt_ts(version.created_at)
            ],
        )?;
        tx.commit()?;
        info!(version_id = %version.id, %deployment_id, number = version_number, "code version registered");
        Ok(version)
    }

    /// Register a job. Summary columns start unset.
    #[instrument(skip(self, job), fields(name = %job.name))]
    pub fn insert_job(&self, job: NewJob) -> Result<ScheduledJob> {
        let now = timestamp();
        let record = ScheduledJob {
            id: job.id.unwrap_or_default(),
            name: job.name,
            enabled: job.enabled,
            trigger: job.trigger,
            version_id: job.version_id,
            db_alias: job.db_alias,
            last_run: None,
            last_status: LastRunStatus::Unset,
            created_at: now,
            updated_at: now,
        };
        let trigger_json = serde_json::to_string(&record.trigger)?;
        self.conn()?.execute(
            "INSERT INTO jobs
             (id, name, enabled, trigger_spec, version_id, db_alias,
              last_run, last_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)",
            rusqlite::params![
                record.id.as_str(),
                record.name,
                record.enabled,
                trigger_json,
                record.version_id.as_ref().map(VersionId::as_str),
                record.db_alias,
                fmt_ts(now)
            ],
        )?;
        info!(job_id = %record.id, "job registered");
        Ok(record)
    }
}

impl JobStore for SqliteStore {
    #[instrument(skip(self), fields(job_id = %id))]
    fn get_job(&self, id: &JobId) -> Result<Option<ScheduledJob>> {
        let db = self.conn()?;
        let job = db
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id.as_str()],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at"))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    fn begin_run(&self, job_id: &JobId, started_at: DateTime<Utc>) -> Result<RunStart> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let job = tx
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [job_id.as_str()],
                row_to_job,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "job",
                id: job_id.to_string(),
            })?;

        let binding = match &job.version_id {
            Some(version_id) => {
                let binding = tx
                    .query_row(
                        "SELECT v.id, v.deployment_id, v.version_number, v.runtime_id,
                                v.extracted_path, v.created_at,
                                r.id, r.name, r.root_path, r.created_at
                         FROM code_versions v JOIN runtimes r ON r.id = v.runtime_id
                         WHERE v.id = ?1",
                        [version_id.as_str()],
                        row_to_binding,
                    )
                    .optional()?;
                if binding.is_none() {
                    warn!(%version_id, "job references a code version that does not exist");
                }
                binding
            }
            None => None,
        };

        let run = match &binding {
            Some(b) => {
                let run = RunRecord {
                    id: RunId::new(),
                    job_id: job.id.clone(),
                    version_id: Some(b.version.id.clone()),
                    started_at,
                    finished_at: None,
                    success: false,
                    message: String::new(),
                };
                tx.execute(
                    "INSERT INTO runs (id, job_id, version_id, started_at, finished_at, success, message)
                     VALUES (?1, ?2, ?3, ?4, NULL, 0, '')",
                    rusqlite::params![
                        run.id.as_str(),
                        run.job_id.as_str(),
                        b.version.id.as_str(),
                        fmt_ts(started_at)
                    ],
                )?;
                debug!(run_id = %run.id, "run record created");
                Some(run)
            }
            None => None,
        };

        tx.commit()?;
        Ok(RunStart { job, binding, run })
    }

    #[instrument(skip(self, message), fields(run_id = %run_id))]
    fn finish_run(
        &self,
        run_id: &RunId,
        finished_at: DateTime<Utc>,
        success: bool,
        message: &str,
    ) -> Result<()> {
        let n = self.conn()?.execute(
            "UPDATE runs SET finished_at = ?1, success = ?2, message = ?3 WHERE id = ?4",
            rusqlite::params![fmt_ts(finished_at), success, message, run_id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                kind: "run",
                id: run_id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(job_id = %job_id))]
    fn insert_finished_run(
        &self,
        job_id: &JobId,
        version_id: Option<&VersionId>,
        at: DateTime<Utc>,
        success: bool,
        message: &str,
    ) -> Result<RunRecord> {
        let run = RunRecord {
            id: RunId::new(),
            job_id: job_id.clone(),
            version_id: version_id.cloned(),
            started_at: at,
            finished_at: Some(at),
            success,
            message: message.to_string(),
        };
        self.conn()?.execute(
            "INSERT INTO runs (id, job_id, version_id, started_at, finished_at, success, message)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
            rusqlite::params![
                run.id.as_str(),
                run.job_id.as_str(),
                run.version_id.as_ref().map(VersionId::as_str),
                fmt_ts(at),
                success,
                run.message
            ],
        )?;
        Ok(run)
    }

    #[instrument(skip(self), fields(job_id = %job_id, %status))]
    fn update_job_summary(
        &self,
        job_id: &JobId,
        at: DateTime<Utc>,
        status: LastRunStatus,
    ) -> Result<()> {
        let at = fmt_ts(at);
        let n = self.conn()?.execute(
            "UPDATE jobs SET last_run = ?1, last_status = ?2, updated_at = ?1 WHERE id = ?3",
            rusqlite::params![at, status.as_column(), job_id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                kind: "job",
                id: job_id.to_string(),
            });
        }
        Ok(())
    }

    fn get_run(&self, id: &RunId) -> Result<Option<RunRecord>> {
        let db = self.conn()?;
        let run = db
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                [id.as_str()],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self, job_id: &JobId, limit: usize) -> Result<Vec<RunRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs
             WHERE job_id = ?1
             ORDER BY started_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let runs = stmt
            .query_map(rusqlite::params![job_id.as_str(), limit as i64], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => ts_at(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Map a `JOB_COLUMNS` row to a `ScheduledJob`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledJob> {
    let trigger_json: String = row.get(3)?;
    let trigger: Trigger = serde_json::from_str(&trigger_json).map_err(|e| conversion_err(3, e))?;
    let last_status = match row.get::<_, Option<String>>(7)? {
        Some(s) => s.parse::<LastRunStatus>().map_err(|e| conversion_err(7, e))?,
        None => LastRunStatus::Unset,
    };

    Ok(ScheduledJob {
        id: JobId(row.get(0)?),
        name: row.get(1)?,
        enabled: row.get(2)?,
        trigger,
        version_id: row.get::<_, Option<String>>(4)?.map(VersionId),
        db_alias: row.get(5)?,
        last_run: opt_ts_at(row, 6)?,
        last_status,
        created_at: ts_at(row, 8)?,
        updated_at: ts_at(row, 9)?,
    })
}

/// Map a `RUN_COLUMNS` row to a `RunRecord`.
fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: RunId(row.get(0)?),
        job_id: JobId(row.get(1)?),
        version_id: row.get::<_, Option<String>>(2)?.map(VersionId),
        started_at: ts_at(row, 3)?,
        finished_at: opt_ts_at(row, 4)?,
        success: row.get(5)?,
        message: row.get(6)?,
    })
}

fn row_to_binding(row: &rusqlite::Row<'_>) -> rusqlite::Result<Binding> {
    Ok(Binding {
        version: CodeVersion {
            id: VersionId(row.get(0)?),
            deployment_id: row.get(1)?,
            version_number: row.get(2)?,
            runtime_id: RuntimeId(row.get(3)?),
            extracted_path: row.get(4)?,
            created_at: ts_at(row, 5)?,
        },
        runtime: RuntimeEnv {
            id: RuntimeId(row.get(6)?),
            name: row.get(7)?,
            root_path: row.get(8)?,
            created_at: ts_at(row, 9)?,
        },
    })
}
