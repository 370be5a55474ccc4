//! Locating the worker binary.
//!
//! The only place in the crate that touches the process environment;
//! the supervisor itself is handed a concrete path.

use std::path::{Path, PathBuf};

use log::debug;

/// Finds `name` on the search path, requiring a readable, executable
/// regular file. Names containing a separator are checked as given.
pub fn locate_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return runnable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    locate_in(std::env::split_paths(&path_var), name)
}

/// PATH-walk over explicit directories; split out so it is testable
/// without touching the real environment.
pub fn locate_in(dirs: impl IntoIterator<Item = PathBuf>, name: &str) -> Option<PathBuf> {
    for dir in dirs {
        let candidate = dir.join(name);
        if runnable(&candidate) {
            return Some(candidate);
        }
        debug!("no runnable {} in {}", name, dir.display());
    }
    None
}

#[cfg(unix)]
fn runnable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn runnable(path: &Path) -> bool {
    path.is_file()
}
