//! pyrunner-exec — bounded child-process execution.
//!
//! Spawns a program with an explicit argv and working directory, captures
//! stdout/stderr without ever failing on invalid UTF-8, and kills the child
//! once its wall-clock budget is spent.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pyrunner_exec::{process, ExecRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let req = ExecRequest::new("/usr/bin/env", "/tmp")
//!         .arg("echo")
//!         .arg("hello")
//!         .timeout(Duration::from_secs(5));
//!     let out = process::exec(req).await.unwrap();
//!     println!("{}", out.combined());
//! }
//! ```

pub mod error;
pub mod process;
pub mod truncate;
pub mod types;

pub use error::{ExecError, Result};
pub use types::{ExecOutput, ExecRequest};
