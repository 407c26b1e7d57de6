//! `pyrunner-store` — SQLite persistence for runtimes, code versions,
//! scheduled jobs and their run records.
//!
//! # Tables
//!
//! | Table           | Written by                                        |
//! |-----------------|---------------------------------------------------|
//! | `runtimes`      | out-of-band registration (read-only to the engine) |
//! | `code_versions` | upload/extraction (read-only to the engine)       |
//! | `jobs`          | registry; summary columns only by the recorder    |
//! | `runs`          | run-start transaction, then the recorder          |
//!
//! The engine talks to storage through the [`JobStore`] trait so tests and
//! alternative backends can stand in for [`SqliteStore`]. A job's `db_alias`
//! picks which store its runs land in via [`StoreRouter`].

pub mod db;
pub mod error;
pub mod router;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use router::StoreRouter;
pub use store::{timestamp, JobStore, SqliteStore};
pub use types::{
    Binding, CodeVersion, LastRunStatus, NewJob, RunRecord, RunStart, RuntimeEnv, ScheduledJob,
    Trigger,
};
