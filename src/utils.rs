//! Working-directory and temporary-file helpers.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-task working directory under the configured task root, created on
/// first use.
pub fn task_dir(root: &Path, task_id: &str) -> Result<PathBuf> {
    let dir = root.join(task_id);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Scoped collection of intermediate files created during one assembly run.
///
/// Every intermediate registered here is deleted when the session is dropped,
/// so cleanup happens on the error path too. Files that become final
/// artifacts must not be registered.
pub struct TempSession {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cleanup: bool,
}

impl TempSession {
    pub fn new(dir: impl Into<PathBuf>, cleanup: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Vec::new(),
            cleanup,
        })
    }

    /// Reserve a fresh file path inside the session directory. The file is
    /// tracked for cleanup whether or not the caller ends up writing it.
    pub fn temp_path(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        let path = self.dir.join(name);
        self.files.push(path.clone());
        path
    }

    /// Track an externally created file for cleanup.
    pub fn register(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove all tracked files. Missing files are not an error.
    pub fn cleanup(&mut self) {
        if !self.cleanup {
            return;
        }
        for file in self.files.drain(..) {
            if file.exists() {
                if let Err(e) = fs::remove_file(&file) {
                    log::warn!("failed to remove temp file {}: {}", file.display(), e);
                } else {
                    log::debug!("removed temp file {}", file.display());
                }
            }
        }
        // Drop the session directory too once it is empty.
        let _ = fs::remove_dir(&self.dir);
    }
}

impl Drop for TempSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}
