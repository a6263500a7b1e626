use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Run `f` with a fresh scratch directory created inside `parent`.
///
/// The directory is removed when `f` returns, whether it succeeded or not,
/// and also if it panics. A failed removal is logged and never replaces the
/// result of `f`.
pub fn with_temp_dir_in<T, E>(
    parent: &Path,
    prefix: &str,
    f: impl FnOnce(&Path) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<io::Error>,
{
    std::fs::create_dir_all(parent)?;
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
    finish(dir, f)
}

/// Remove `dir` and everything in it. A failure is logged, never returned.
pub(crate) fn remove_dir_logged(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("removed {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {e}", dir.display()),
    }
}

fn finish<T, E>(dir: tempfile::TempDir, f: impl FnOnce(&Path) -> Result<T, E>) -> Result<T, E> {
    let result = f(dir.path());
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => debug!("removed scratch directory {}", path.display()),
        Err(e) => warn!("failed to remove scratch directory {}: {e}", path.display()),
    }
    result
}
