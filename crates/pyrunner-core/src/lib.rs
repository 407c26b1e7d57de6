//! `pyrunner-core` — configuration, shared identifiers and the top-level
//! error type used by every other pyrunner crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::PyrunnerConfig;
pub use error::{PyrunnerError, Result};
pub use types::{JobId, RunId, RuntimeId, VersionId};
