//! `pyrunner-engine` — executes one scheduled job against its bound code
//! version and runtime, and records the outcome.
//!
//! # Pipeline
//!
//! ```text
//! execute_job(job, files)
//!   └─ LockRegistry::acquire ── rejected ──► log SKIPPED, no record
//!        └─ begin_run (one transaction: load job/version/runtime, create run)
//!             └─ resolve ─► install_if_present ─► run
//!                  └─ recorder::record   (always, outside any transaction)
//!                       └─ permit dropped → signature released
//! ```
//!
//! Every failure between `begin_run` and `run` converges on the recorder as a
//! failed run with an `Error: …` message. Only a duplicate invocation skips
//! recording entirely.

pub mod error;
pub mod executor;
pub mod installer;
pub mod lock;
pub mod recorder;
pub mod resolver;
pub mod runner;

pub use error::{Result, RunError};
pub use executor::{Dispatch, Executor, RunNowReport, SkipReason};
pub use lock::{BatchSignature, ExecutionPermit, LockRegistry};
pub use resolver::ResolvedEnv;
pub use runner::RunOutcome;
