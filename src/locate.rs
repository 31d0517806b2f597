//! Extractor stub lookup.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// File name of the extractor stub on this platform.
pub fn stub_name() -> String {
    format!("sfx-stub{}", env::consts::EXE_SUFFIX)
}

/// Directories searched for the stub, in order: the current directory, the
/// directory of the running executable, then each `PATH` entry.
pub fn search_dirs() -> Vec<PathBuf> {
    let candidates = [
        env::current_dir().ok(),
        env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf)),
    ];

    let mut dirs: Vec<PathBuf> = candidates.into_iter().flatten().collect();
    if let Some(path) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&path).filter(|d| !d.as_os_str().is_empty()));
    }
    dirs
}

/// Find the extractor stub in the default search locations.
pub fn find_stub() -> Result<PathBuf> {
    find_in(&stub_name(), search_dirs())
}

/// Return the first `dir/name` that is a regular file.
pub fn find_in(name: &str, dirs: Vec<PathBuf>) -> Result<PathBuf> {
    for dir in &dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            debug!(stub = %candidate.display(), "found extractor stub");
            return Ok(candidate);
        }
    }

    Err(Error::StubNotFound {
        name: name.to_string(),
        searched: dirs,
    })
}
