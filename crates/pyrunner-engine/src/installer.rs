//! Dependency installer — runs `pip install -r <manifest>` inside the
//! job's runtime before the script starts.

use std::path::Path;
use std::time::Duration;

use pyrunner_exec::{process, ExecError, ExecRequest};
use tracing::{debug, info};

use crate::error::{Result, RunError};
use crate::resolver::runtime_binary;

/// What the install step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    /// The source tree ships no dependency manifest.
    NoManifest,
    /// The runtime has no `pip` binary.
    NoInstaller,
}

/// Install the source tree's dependencies into the runtime, when both a
/// manifest and an installer are present. Either being absent is a skip.
///
/// # Errors
///
/// - `DependencyInstall`        — pip exited non-zero; carries its stderr.
/// - `DependencyInstallTimeout` — pip outlived `timeout` and was killed.
/// - `Exec`                     — pip could not be spawned.
pub async fn install_if_present(
    source_root: &Path,
    runtime_root: &Path,
    manifest: &str,
    timeout: Duration,
) -> Result<InstallStatus> {
    let manifest_path = source_root.join(manifest);
    if !manifest_path.is_file() {
        debug!(manifest = %manifest_path.display(), "no dependency manifest, skipping install");
        return Ok(InstallStatus::NoManifest);
    }

    let pip = runtime_binary(runtime_root, "pip");
    if !pip.is_file() {
        debug!(pip = %pip.display(), "runtime has no pip, skipping install");
        return Ok(InstallStatus::NoInstaller);
    }

    info!(manifest = %manifest_path.display(), "installing dependencies");
    let req = ExecRequest::new(&pip, source_root)
        .args(["install", "-r"])
        .arg(&manifest_path)
        .timeout(timeout);

    match process::exec(req).await {
        Ok(out) if out.success() => Ok(InstallStatus::Installed),
        Ok(out) => Err(RunError::DependencyInstall {
            exit_code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        }),
        Err(ExecError::Timeout { secs }) => Err(RunError::DependencyInstallTimeout { secs }),
        Err(e) => Err(RunError::Exec(e)),
    }
}
