use chrono::{DateTime, Utc};
use pyrunner_core::{JobId, RunId, RuntimeId, VersionId};
use serde::{Deserialize, Serialize};

/// How a job gets triggered. Stored for the scheduling layer; the execution
/// engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Only runs when someone asks for it.
    #[default]
    Manual,
    /// Repeat every N seconds.
    Interval { every_secs: u64 },
    /// Cron expression, evaluated by the scheduler.
    Cron { expression: String },
    /// Fires with a batch of new files whenever `path` receives them.
    FolderWatch { path: String },
}

/// Summary of a job's most recently recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastRunStatus {
    /// The job has never been recorded as run.
    #[default]
    Unset,
    Success,
    Failed,
}

impl LastRunStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            LastRunStatus::Success
        } else {
            LastRunStatus::Failed
        }
    }

    /// Column value; `Unset` is stored as NULL.
    pub(crate) fn as_column(&self) -> Option<&'static str> {
        match self {
            LastRunStatus::Unset => None,
            LastRunStatus::Success => Some("success"),
            LastRunStatus::Failed => Some("failed"),
        }
    }
}

impl std::fmt::Display for LastRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LastRunStatus::Unset => "unset",
            LastRunStatus::Success => "success",
            LastRunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LastRunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unset" => Ok(LastRunStatus::Unset),
            "success" => Ok(LastRunStatus::Success),
            "failed" => Ok(LastRunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// An isolated interpreter installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEnv {
    pub id: RuntimeId,
    pub name: String,
    /// Root of the installation; the interpreter lives under `bin/` or `Scripts\`.
    pub root_path: String,
    pub created_at: DateTime<Utc>,
}

/// An immutable extracted snapshot of a deployment's source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeVersion {
    pub id: VersionId,
    pub deployment_id: String,
    /// Increases by one per upload within a deployment.
    pub version_number: u32,
    pub runtime_id: RuntimeId,
    pub extracted_path: String,
    pub created_at: DateTime<Utc>,
}

/// A named, triggerable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub version_id: Option<VersionId>,
    /// Routing hint selecting which database receives this job's runs.
    pub db_alias: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: LastRunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Fixed id, for registering the same job in an aliased database.
    #[serde(default)]
    pub id: Option<JobId>,
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub trigger: Trigger,
    pub version_id: Option<VersionId>,
    pub db_alias: Option<String>,
}

impl NewJob {
    /// An enabled, manually triggered job with no code version bound yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            enabled: true,
            trigger: Trigger::Manual,
            version_id: None,
            db_alias: None,
        }
    }

    pub fn with_version(mut self, version_id: VersionId) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    /// Route this job's runs to the database registered under `alias`.
    pub fn with_db_alias(mut self, alias: impl Into<String>) -> Self {
        self.db_alias = Some(alias.into());
        self
    }
}

fn enabled_by_default() -> bool {
    true
}

/// The durable outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub job_id: JobId,
    /// Code version the run was started against, if one was bound.
    pub version_id: Option<VersionId>,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is in flight.
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub message: String,
}

/// A code version together with the runtime it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub version: CodeVersion,
    pub runtime: RuntimeEnv,
}

/// What the run-start transaction produced.
///
/// `run` is `None` when the job had no bound code version: nothing was
/// written, and the recorder will synthesize the record at finish.
#[derive(Debug, Clone)]
pub struct RunStart {
    pub job: ScheduledJob,
    pub binding: Option<Binding>,
    pub run: Option<RunRecord>,
}
