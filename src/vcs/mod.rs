//! History backend.
//!
//! The storage engine talks to history through [`VersionStore`] only: it
//! never parses tool output or walks history files itself. [`FsVersionStore`]
//! is the native implementation, keeping commits, refs and file blobs under
//! `.mir/`.

mod fs_store;
mod lock;

pub use fs_store::FsVersionStore;
pub use lock::RepoLock;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::MirError;

/// History directory name under the repository root.
pub const HISTORY_DIR: &str = ".mir";

/// Identifier of a commit: lowercase hex SHA-256 of its record.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for display.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file recorded in a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// SHA-256 of the content, also the blob name.
    pub blob: String,
    pub crc32c: u32,
    pub size: u64,
}

/// The stored form of a commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(default)]
    pub parents: Vec<CommitId>,
    pub message: String,
    pub timestamp: i64,
    pub files: BTreeMap<String, FileEntry>,
}

/// One entry of [`VersionStore::log`].
#[derive(Clone, Debug, PartialEq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub record: CommitRecord,
}

/// How a file differs between two commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub name: String,
    pub kind: FileChangeKind,
}

/// The narrow interface the storage engine needs from a history backend.
///
/// Revisions passed to [`resolve`](VersionStore::resolve) may be a tag, a
/// branch name or a full commit id, looked up in that order.
pub trait VersionStore: Send + Sync {
    /// Repository root (the working tree).
    fn root(&self) -> &Path;

    /// Creates an empty history with `branch` as the unborn current branch.
    fn init(&self, branch: &str) -> Result<(), MirError>;

    fn is_initialized(&self) -> bool;

    /// Tracked working-tree files whose content differs from the current
    /// commit. Empty means clean.
    fn dirty_files(&self) -> Result<Vec<String>, MirError>;

    fn is_clean(&self) -> Result<bool, MirError> {
        Ok(self.dirty_files()?.is_empty())
    }

    fn current_branch(&self) -> Result<String, MirError>;

    /// Commit the current branch points at; `None` while it is unborn.
    fn head_commit(&self) -> Result<Option<CommitId>, MirError>;

    fn branch_exists(&self, branch: &str) -> Result<bool, MirError>;

    fn list_branches(&self) -> Result<Vec<String>, MirError>;

    /// Switches to an existing branch and rewrites the tracked files.
    fn checkout(&self, branch: &str) -> Result<(), MirError>;

    /// Creates `branch` at the current commit and switches to it.
    fn create_branch(&self, branch: &str) -> Result<(), MirError>;

    /// Creates `branch` at `commit`, switches to it and rewrites the tracked
    /// files.
    fn create_branch_at(&self, branch: &str, commit: &CommitId) -> Result<(), MirError>;

    /// Removes a branch ref. The current branch cannot be deleted.
    fn delete_branch(&self, branch: &str) -> Result<(), MirError>;

    /// Records the tracked files and advances the current branch.
    fn commit(&self, message: &str) -> Result<CommitId, MirError>;

    /// Creates a tag. Fails if it exists.
    fn tag(&self, name: &str, commit: &CommitId) -> Result<(), MirError>;

    fn tag_exists(&self, name: &str) -> Result<bool, MirError>;

    fn list_tags(&self) -> Result<Vec<String>, MirError>;

    fn resolve(&self, rev: &str) -> Result<CommitId, MirError>;

    fn read_commit(&self, commit: &CommitId) -> Result<CommitRecord, MirError>;

    /// Content of one file recorded in `commit`.
    fn read_file(&self, commit: &CommitId, name: &str) -> Result<Vec<u8>, MirError>;

    fn diff(&self, from: &CommitId, to: &CommitId) -> Result<Vec<FileChange>, MirError>;

    /// First-parent history from `start`, newest first.
    fn log(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, MirError>;

    /// Discards working-tree changes to tracked files.
    fn restore_working_tree(&self) -> Result<(), MirError>;
}
