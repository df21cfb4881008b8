//! Repository-wide advisory lock.
//!
//! The lock is an OS file lock, so the kernel drops it when the holding
//! process exits for any reason. The holder writes its pid and acquisition
//! time into the file; nothing reads them back except humans.

use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::MirError;

/// Held while a commit is in progress. Released on drop.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Blocks until the lock at `path` is acquired.
    pub fn acquire(path: &Path) -> Result<Self, MirError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        tracing::trace!(path = %path.display(), "waiting for repository lock");
        file.lock_exclusive()?;

        file.set_len(0)?;
        writeln!(
            file,
            "pid {}\nacquired {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;
        file.flush()?;
        tracing::debug!(path = %path.display(), "repository lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release repository lock");
        }
    }
}
