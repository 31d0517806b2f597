//! Entry-point launcher.
//!
//! Runs the footer's command inside the extraction directory with the
//! caller's standard streams and waits for it.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::{PackError, Result};

/// How an entry point failed.
#[derive(Debug, Error)]
pub enum EntryPointFailure {
    /// The process could not be started (missing, not executable, ...).
    #[error("could not be started: {0}")]
    NotStarted(#[source] io::Error),

    /// The process ran and exited with a non-zero code.
    #[error("exited with status {0}")]
    Exited(i32),

    /// The process was terminated by a signal.
    #[error("terminated by signal {0}")]
    Signaled(i32),
}

/// Run `entry_point` in `dir` and wait for it.
///
/// An empty entry point does nothing. The calling process keeps its own
/// working directory; only the child runs in `dir`.
pub fn run_entry_point(entry_point: &[String], dir: &Path) -> Result<()> {
    let Some((program, args)) = entry_point.split_first() else {
        debug!("no entry point configured");
        return Ok(());
    };

    let executable = resolve_program(program, dir);
    info!(
        program = %program,
        args = ?args,
        dir = %dir.display(),
        "executing entry point"
    );

    let status = Command::new(&executable)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| PackError::EntryPointFailed {
            program: program.clone(),
            failure: EntryPointFailure::NotStarted(e),
        })?;

    if status.success() {
        debug!(program = %program, "entry point finished");
        return Ok(());
    }

    Err(PackError::EntryPointFailed {
        program: program.clone(),
        failure: failure_from_status(status),
    })
}

/// Anchor relative paths such as `./run.sh` or `bin/app` to `dir`.
///
/// Bare names (`echo`) are left for the `PATH` lookup.
fn resolve_program(program: &str, dir: &Path) -> PathBuf {
    let path = Path::new(program);
    let has_dir = path.components().count() > 1
        || matches!(path.components().next(), Some(Component::CurDir | Component::ParentDir));
    if path.is_relative() && has_dir {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(unix)]
fn failure_from_status(status: ExitStatus) -> EntryPointFailure {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => EntryPointFailure::Exited(code),
        (None, Some(signal)) => EntryPointFailure::Signaled(signal),
        (None, None) => EntryPointFailure::Exited(-1),
    }
}

#[cfg(not(unix))]
fn failure_from_status(status: ExitStatus) -> EntryPointFailure {
    EntryPointFailure::Exited(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_entry_point() {
        let temp_dir = tempfile::tempdir().unwrap();
        run_entry_point(&[], temp_dir.path()).unwrap();
    }

    #[test]
    fn test_resolve_program() {
        let dir = Path::new("/tmp/sfx-x");
        assert_eq!(resolve_program("echo", dir), PathBuf::from("echo"));
        assert_eq!(resolve_program("./run.sh", dir), dir.join("./run.sh"));
        assert_eq!(resolve_program("bin/app", dir), dir.join("bin/app"));
        assert_eq!(resolve_program("/bin/sh", dir), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_missing_program() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = run_entry_point(&argv(&["sfx-no-such-program-4f1c"]), temp_dir.path());
        match result {
            Err(PackError::EntryPointFailed { program, failure }) => {
                assert_eq!(program, "sfx-no-such-program-4f1c");
                assert!(matches!(failure, EntryPointFailure::NotStarted(_)));
            }
            other => panic!("expected NotStarted, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_success_runs_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();

        run_entry_point(&argv(&["sh", "-c", "pwd > where.txt"]), temp_dir.path()).unwrap();

        let recorded = std::fs::read_to_string(temp_dir.path().join("where.txt")).unwrap();
        assert_eq!(
            std::fs::canonicalize(recorded.trim()).unwrap(),
            std::fs::canonicalize(temp_dir.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_program_in_dir() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let script = temp_dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\ntouch ran\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        run_entry_point(&argv(&["./run.sh"]), temp_dir.path()).unwrap();
        assert!(temp_dir.path().join("ran").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = run_entry_point(&argv(&["sh", "-c", "exit 3"]), temp_dir.path());
        assert!(matches!(
            result,
            Err(PackError::EntryPointFailed {
                failure: EntryPointFailure::Exited(3),
                ..
            })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_killed_by_signal() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = run_entry_point(&argv(&["sh", "-c", "kill -9 $$"]), temp_dir.path());
        assert!(matches!(
            result,
            Err(PackError::EntryPointFailed {
                failure: EntryPointFailure::Signaled(9),
                ..
            })
        ));
    }
}
