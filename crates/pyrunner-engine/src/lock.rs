//! Execution lock registry — rejects a second concurrent run of the same
//! job+batch.
//!
//! Folder-watch triggers can deliver the same batch twice; a side-effecting
//! script must not run twice for it. The registry is a reject-on-collision
//! set, not a queue: a losing caller is told `false` immediately and decides
//! for itself whether to retry later.
//!
//! State is in-memory and process-local. It starts empty, entries leave on
//! release, and nothing survives a restart.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashSet;
use pyrunner_core::JobId;
use tracing::debug;

/// Canonical key for a job plus a *set* of input paths.
///
/// Paths are sorted and de-duplicated, then joined with NUL (which cannot
/// appear in a path), so argument order never matters and the key is stable
/// across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchSignature {
    key: String,
    files: usize,
}

impl BatchSignature {
    pub fn new(job_id: &JobId, files: &[PathBuf]) -> Self {
        let mut paths: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        paths.sort();
        paths.dedup();

        let mut key = String::from(job_id.as_str());
        for path in &paths {
            key.push('\0');
            key.push_str(path);
        }
        Self {
            key,
            files: paths.len(),
        }
    }
}

impl fmt::Display for BatchSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = self.key.split('\0').next().unwrap_or_default();
        write!(f, "{job}[{} file(s)]", self.files)
    }
}

/// Process-wide set of signatures currently executing.
#[derive(Debug, Default)]
pub struct LockRegistry {
    held: DashSet<String>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every executor in this process.
    pub fn global() -> Arc<LockRegistry> {
        static GLOBAL: OnceLock<Arc<LockRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LockRegistry::new())))
    }

    /// Atomically claim `sig`. Exactly one concurrent caller gets `true`.
    pub fn try_acquire(&self, sig: &BatchSignature) -> bool {
        self.held.insert(sig.key.clone())
    }

    /// Give `sig` back. Must follow every successful [`try_acquire`](Self::try_acquire)
    /// exactly once; prefer [`acquire`](Self::acquire), whose permit does it on drop.
    pub fn release(&self, sig: &BatchSignature) {
        if self.held.remove(&sig.key).is_none() {
            debug!(signature = %sig, "release of a signature that was not held");
        }
    }

    /// Claim `sig` and return a permit that releases it when dropped, on
    /// every exit path including panics and cancellation.
    pub fn acquire(self: &Arc<Self>, sig: BatchSignature) -> Option<ExecutionPermit> {
        if self.try_acquire(&sig) {
            Some(ExecutionPermit {
                registry: Arc::clone(self),
                sig,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, sig: &BatchSignature) -> bool {
        self.held.contains(&sig.key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Proof of admission for one job+batch. Releases its signature on drop.
#[derive(Debug)]
pub struct ExecutionPermit {
    registry: Arc<LockRegistry>,
    sig: BatchSignature,
}

impl ExecutionPermit {
    pub fn signature(&self) -> &BatchSignature {
        &self.sig
    }
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.registry.release(&self.sig);
    }
}
