//! Environment resolver — turns a job's bound code version and runtime into
//! concrete paths, failing fast when anything is absent.
//!
//! Read-only: only filesystem lookups, no writes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use pyrunner_store::Binding;
use tracing::debug;

use crate::error::{Result, RunError};

/// Directory holding a runtime's executables.
#[cfg(windows)]
const BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
const BIN_DIR: &str = "bin";

/// Everything needed to install dependencies and start the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnv {
    pub runtime_root: PathBuf,
    pub interpreter: PathBuf,
    pub source_root: PathBuf,
    pub entry_point: PathBuf,
}

/// Path of the executable `name` inside a runtime, per host platform:
/// `<root>/bin/<name>` on Unix, `<root>\Scripts\<name>.exe` on Windows.
pub fn runtime_binary(runtime_root: &Path, name: &str) -> PathBuf {
    runtime_root
        .join(BIN_DIR)
        .join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

/// Resolve the interpreter and entry point for a bound code version.
///
/// # Errors
///
/// - `NotConfigured`      — `binding` is `None`.
/// - `InterpreterMissing` — no `python` binary in the runtime.
/// - `EntryPointMissing`  — no `entry_point_name` file under the source root.
pub fn resolve(binding: Option<&Binding>, entry_point_name: &str) -> Result<ResolvedEnv> {
    let binding = binding.ok_or(RunError::NotConfigured)?;

    let runtime_root = PathBuf::from(&binding.runtime.root_path);
    let interpreter = runtime_binary(&runtime_root, "python");
    if !interpreter.is_file() {
        return Err(RunError::InterpreterMissing { path: interpreter });
    }

    let source_root = PathBuf::from(&binding.version.extracted_path);
    let entry_point = find_entry_point(&source_root, entry_point_name).ok_or_else(|| {
        RunError::EntryPointMissing {
            name: entry_point_name.to_string(),
            root: source_root.clone(),
        }
    })?;

    debug!(
        interpreter = %interpreter.display(),
        entry_point = %entry_point.display(),
        "environment resolved"
    );

    Ok(ResolvedEnv {
        runtime_root,
        interpreter,
        source_root,
        entry_point,
    })
}

/// Find a file called `name` anywhere under `root`.
///
/// Breadth-first with sorted directory listings: the shallowest match wins
/// and ties go to the lexicographically first path, so the result does not
/// depend on filesystem enumeration order. Symlinked directories are not
/// followed.
pub fn find_entry_point(root: &Path, name: &str) -> Option<PathBuf> {
    let mut level: VecDeque<PathBuf> = VecDeque::from([root.to_path_buf()]);

    while !level.is_empty() {
        let mut files = Vec::new();
        let mut dirs = Vec::new();

        for dir in level.drain(..) {
            let Ok(read_dir) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in read_dir.filter_map(|e| e.ok()) {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_dir() {
                    dirs.push(path);
                } else if entry.file_name() == name && path.is_file() {
                    files.push(path);
                }
            }
        }

        if let Some(found) = files.into_iter().min() {
            return Some(found);
        }
        dirs.sort();
        level.extend(dirs);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrunner_core::{RuntimeId, VersionId};
    use pyrunner_store::{timestamp, CodeVersion, RuntimeEnv};
    use std::fs;

    fn binding(runtime_root: &Path, source_root: &Path) -> Binding {
        Binding {
            version: CodeVersion {
                id: VersionId::new(),
                deployment_id: "dep".to_string(),
                version_number: 1,
                runtime_id: RuntimeId::from("rt"),
                extracted_path: source_root.to_string_lossy().into_owned(),
                created_at: timestamp(),
            },
            runtime: RuntimeEnv {
                id: RuntimeId::from("rt"),
                name: "py".to_string(),
                root_path: runtime_root.to_string_lossy().into_owned(),
                created_at: timestamp(),
            },
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn unbound_job_is_not_configured() {
        assert!(matches!(resolve(None, "main.py"), Err(RunError::NotConfigured)));
    }

    #[test]
    fn missing_interpreter_reports_expected_path() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("venv");
        let source = dir.path().join("src");
        touch(&source.join("main.py"));

        let err = resolve(Some(&binding(&runtime, &source)), "main.py").unwrap_err();
        match err {
            RunError::InterpreterMissing { path } => {
                assert_eq!(path, runtime_binary(&runtime, "python"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("venv");
        let source = dir.path().join("src");
        touch(&runtime_binary(&runtime, "python"));
        touch(&source.join("app.py"));

        let err = resolve(Some(&binding(&runtime, &source)), "main.py").unwrap_err();
        assert!(matches!(err, RunError::EntryPointMissing { .. }));
    }

    #[test]
    fn resolves_nested_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("venv");
        let source = dir.path().join("src");
        touch(&runtime_binary(&runtime, "python"));
        touch(&source.join("project").join("main.py"));

        let env = resolve(Some(&binding(&runtime, &source)), "main.py").unwrap();
        assert_eq!(env.entry_point, source.join("project").join("main.py"));
        assert_eq!(env.source_root, source);
        assert_eq!(env.runtime_root, runtime);
    }

    #[test]
    fn shallowest_then_lexicographic_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a").join("deep").join("main.py"));
        touch(&root.join("zeta").join("main.py"));
        touch(&root.join("beta").join("main.py"));
        assert_eq!(
            find_entry_point(root, "main.py"),
            Some(root.join("beta").join("main.py"))
        );

        touch(&root.join("main.py"));
        assert_eq!(find_entry_point(root, "main.py"), Some(root.join("main.py")));
    }

    #[test]
    fn directory_named_like_entry_point_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("main.py")).unwrap();
        assert_eq!(find_entry_point(dir.path(), "main.py"), None);
    }

    #[test]
    fn missing_root_finds_nothing() {
        assert_eq!(find_entry_point(Path::new("/no/such/tree"), "main.py"), None);
    }
}
