use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory layout of a staging root.
///
/// `input/` holds staged IR programs and is bound read-only into the
/// container, `output/` receives artifacts, `tmp/` holds per-run scratch
/// directories such as the generated config document. Those three are
/// created on [`initialize`](Self::initialize). Each compilation gets its
/// own nested layout under `requests/<id>/`.
#[derive(Debug, Clone)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    #[inline]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    #[inline]
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    #[inline]
    pub fn requests_dir(&self) -> PathBuf {
        self.root.join("requests")
    }

    /// The private layout of request `id`.
    pub fn request(&self, id: &str) -> StagingLayout {
        StagingLayout::new(self.requests_dir().join(id))
    }

    /// Create the directory tree. Safe to call repeatedly.
    ///
    /// The container runs under a fixed uid that usually differs from the
    /// host user, so `output/` is world-writable with the sticky bit set.
    pub fn initialize(&self) -> io::Result<()> {
        fs::create_dir_all(self.input_dir())?;
        fs::create_dir_all(self.output_dir())?;
        fs::create_dir_all(self.scratch_dir())?;
        set_mode(&self.input_dir(), 0o755)?;
        set_mode(&self.output_dir(), 0o1777)?;
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
