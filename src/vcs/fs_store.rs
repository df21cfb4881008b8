//! Filesystem history store.
//!
//! Layout under `<root>/.mir/`:
//!
//! ```text
//! HEAD                    "ref: <branch>"
//! objects/<aa>/<sha256>   file contents
//! commits/<id>.json       CommitRecord, id = sha256 of the JSON bytes
//! refs/heads/<branch>     commit id
//! refs/tags/<tag>         commit id
//! ```
//!
//! Every write goes through a temp file and a rename, so readers see either
//! the old or the new version of a file.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{
    CommitId, CommitInfo, CommitRecord, FileChange, FileChangeKind, FileEntry, VersionStore,
    HISTORY_DIR,
};
use crate::error::MirError;
use crate::model::is_valid_ref_name;

const HEAD_FILE: &str = "HEAD";
const OBJECTS_DIR: &str = "objects";
const COMMITS_DIR: &str = "commits";
const HEADS_DIR: &str = "refs/heads";
const TAGS_DIR: &str = "refs/tags";
const TMP_DIR: &str = "tmp";

/// History kept as plain files next to the working tree.
#[derive(Debug, Clone)]
pub struct FsVersionStore {
    root: PathBuf,
    tracked: Vec<String>,
}

impl FsVersionStore {
    /// A store for the repository at `root` versioning the `tracked` files.
    pub fn new(root: impl Into<PathBuf>, tracked: &[&str]) -> Self {
        Self {
            root: root.into(),
            tracked: tracked.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn history(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    fn head_path(&self) -> PathBuf {
        self.history().join(HEAD_FILE)
    }

    fn branch_path(&self, branch: &str) -> PathBuf {
        self.history().join(HEADS_DIR).join(branch)
    }

    fn tag_path(&self, tag: &str) -> PathBuf {
        self.history().join(TAGS_DIR).join(tag)
    }

    fn commit_path(&self, id: &CommitId) -> PathBuf {
        self.history().join(COMMITS_DIR).join(format!("{}.json", id.as_str()))
    }

    fn object_path(&self, sha: &str) -> PathBuf {
        let shard = sha.get(0..2).unwrap_or("xx");
        self.history().join(OBJECTS_DIR).join(shard).join(sha)
    }

    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<(), MirError> {
        let tmp_dir = self.history().join(TMP_DIR);
        fs::create_dir_all(&tmp_dir)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_dir.join(format!(
            "{}-{}.partial",
            std::process::id(),
            hex::encode(Sha256::digest(dest.to_string_lossy().as_bytes()))
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dest)?;
        Ok(())
    }

    fn read_ref(path: &Path) -> Result<Option<CommitId>, MirError> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(CommitId::new(s.trim()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store_object(&self, bytes: &[u8]) -> Result<FileEntry, MirError> {
        let sha = hex::encode(Sha256::digest(bytes));
        let path = self.object_path(&sha);
        if !path.exists() {
            self.write_atomic(&path, bytes)?;
        }
        Ok(FileEntry {
            blob: sha,
            crc32c: crc32c::crc32c(bytes),
            size: bytes.len() as u64,
        })
    }

    fn read_object(&self, name: &str, entry: &FileEntry) -> Result<Vec<u8>, MirError> {
        let bytes = fs::read(self.object_path(&entry.blob))?;
        if crc32c::crc32c(&bytes) != entry.crc32c || bytes.len() as u64 != entry.size {
            return Err(MirError::InvalidMirFile {
                file: name.to_string(),
                message: format!("stored content of blob {} is corrupt", entry.blob),
            });
        }
        Ok(bytes)
    }

    fn head_files(&self) -> Result<Option<CommitRecord>, MirError> {
        match self.head_commit()? {
            Some(id) => Ok(Some(self.read_commit(&id)?)),
            None => Ok(None),
        }
    }

    fn write_head(&self, branch: &str) -> Result<(), MirError> {
        self.write_atomic(&self.head_path(), format!("ref: {branch}\n").as_bytes())
    }

    /// Makes the tracked working files match `record` (or removes them).
    fn materialize(&self, record: Option<&CommitRecord>) -> Result<(), MirError> {
        for name in &self.tracked {
            let path = self.root.join(name);
            match record.and_then(|r| r.files.get(name)) {
                Some(entry) => {
                    let bytes = self.read_object(name, entry)?;
                    self.write_atomic(&path, &bytes)?;
                }
                None => match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                },
            }
        }
        Ok(())
    }

    fn check_ref_name(name: &str) -> Result<(), MirError> {
        if is_valid_ref_name(name) {
            Ok(())
        } else {
            Err(MirError::InvalidBranchOrTag(format!("invalid ref name '{name}'")))
        }
    }

    fn list_dir_names(dir: &Path) -> Result<Vec<String>, MirError> {
        let mut names = Vec::new();
        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        names.sort();
        Ok(names)
    }
}

impl VersionStore for FsVersionStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn init(&self, branch: &str) -> Result<(), MirError> {
        Self::check_ref_name(branch)?;
        for dir in [OBJECTS_DIR, COMMITS_DIR, HEADS_DIR, TAGS_DIR, TMP_DIR] {
            fs::create_dir_all(self.history().join(dir))?;
        }
        self.write_head(branch)
    }

    fn is_initialized(&self) -> bool {
        self.head_path().is_file()
    }

    fn dirty_files(&self) -> Result<Vec<String>, MirError> {
        let record = self.head_files()?;
        let mut dirty = Vec::new();
        for name in &self.tracked {
            let path = self.root.join(name);
            let expected = record.as_ref().and_then(|r| r.files.get(name));
            match (fs::read(&path), expected) {
                (Ok(bytes), Some(entry)) => {
                    if hex::encode(Sha256::digest(&bytes)) != entry.blob {
                        dirty.push(name.clone());
                    }
                }
                (Ok(_), None) => dirty.push(name.clone()),
                (Err(err), Some(_)) if err.kind() == ErrorKind::NotFound => dirty.push(name.clone()),
                (Err(err), None) if err.kind() == ErrorKind::NotFound => {}
                (Err(err), _) => return Err(err.into()),
            }
        }
        Ok(dirty)
    }

    fn current_branch(&self) -> Result<String, MirError> {
        let head = fs::read_to_string(self.head_path()).map_err(|err| match err.kind() {
            ErrorKind::NotFound => MirError::InvalidRepo {
                path: self.root.clone(),
                message: "missing HEAD".to_string(),
            },
            _ => err.into(),
        })?;
        head.trim()
            .strip_prefix("ref: ")
            .map(str::to_string)
            .ok_or_else(|| MirError::InvalidRepo {
                path: self.root.clone(),
                message: format!("malformed HEAD '{}'", head.trim()),
            })
    }

    fn head_commit(&self) -> Result<Option<CommitId>, MirError> {
        let branch = self.current_branch()?;
        Self::read_ref(&self.branch_path(&branch))
    }

    fn branch_exists(&self, branch: &str) -> Result<bool, MirError> {
        Ok(is_valid_ref_name(branch) && self.branch_path(branch).is_file())
    }

    fn list_branches(&self) -> Result<Vec<String>, MirError> {
        Self::list_dir_names(&self.history().join(HEADS_DIR))
    }

    fn checkout(&self, branch: &str) -> Result<(), MirError> {
        let Some(id) = Self::read_ref(&self.branch_path(branch))? else {
            return Err(MirError::InvalidBranchOrTag(format!(
                "branch '{branch}' does not exist"
            )));
        };
        let record = self.read_commit(&id)?;
        self.materialize(Some(&record))?;
        self.write_head(branch)?;
        tracing::debug!(branch, commit = id.short(), "checked out");
        Ok(())
    }

    fn create_branch(&self, branch: &str) -> Result<(), MirError> {
        Self::check_ref_name(branch)?;
        if self.branch_exists(branch)? {
            return Err(MirError::InvalidBranchOrTag(format!(
                "branch '{branch}' already exists"
            )));
        }
        if let Some(id) = self.head_commit()? {
            self.write_atomic(&self.branch_path(branch), id.as_str().as_bytes())?;
        }
        self.write_head(branch)
    }

    fn create_branch_at(&self, branch: &str, commit: &CommitId) -> Result<(), MirError> {
        Self::check_ref_name(branch)?;
        if self.branch_exists(branch)? {
            return Err(MirError::InvalidBranchOrTag(format!(
                "branch '{branch}' already exists"
            )));
        }
        let record = self.read_commit(commit)?;
        self.materialize(Some(&record))?;
        self.write_atomic(&self.branch_path(branch), commit.as_str().as_bytes())?;
        self.write_head(branch)?;
        tracing::debug!(branch, commit = commit.short(), "branched");
        Ok(())
    }

    fn delete_branch(&self, branch: &str) -> Result<(), MirError> {
        if self.current_branch()? == branch {
            return Err(MirError::InvalidBranchOrTag(format!(
                "cannot delete the current branch '{branch}'"
            )));
        }
        match fs::remove_file(self.branch_path(branch)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(MirError::InvalidBranchOrTag(
                format!("branch '{branch}' does not exist"),
            )),
            Err(err) => Err(err.into()),
        }
    }

    fn commit(&self, message: &str) -> Result<CommitId, MirError> {
        let branch = self.current_branch()?;
        let parent = self.head_commit()?;

        let mut files = std::collections::BTreeMap::new();
        for name in &self.tracked {
            match fs::read(self.root.join(name)) {
                Ok(bytes) => {
                    files.insert(name.clone(), self.store_object(&bytes)?);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        let record = CommitRecord {
            parents: parent.into_iter().collect(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            files,
        };
        let bytes = serde_json::to_vec_pretty(&record).map_err(|source| MirError::HistoryRecord {
            path: self.history().join(COMMITS_DIR),
            source,
        })?;
        let id = CommitId::new(hex::encode(Sha256::digest(&bytes)));
        self.write_atomic(&self.commit_path(&id), &bytes)?;
        self.write_atomic(&self.branch_path(&branch), id.as_str().as_bytes())?;
        tracing::debug!(branch, commit = id.short(), "committed");
        Ok(id)
    }

    fn tag(&self, name: &str, commit: &CommitId) -> Result<(), MirError> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(MirError::InvalidBranchOrTag(format!("invalid tag name '{name}'")));
        }
        if self.tag_exists(name)? {
            return Err(MirError::InvalidBranchOrTag(format!("tag '{name}' already exists")));
        }
        self.write_atomic(&self.tag_path(name), commit.as_str().as_bytes())
    }

    fn tag_exists(&self, name: &str) -> Result<bool, MirError> {
        Ok(self.tag_path(name).is_file())
    }

    fn list_tags(&self) -> Result<Vec<String>, MirError> {
        Self::list_dir_names(&self.history().join(TAGS_DIR))
    }

    fn resolve(&self, rev: &str) -> Result<CommitId, MirError> {
        let unknown = || MirError::InvalidBranchOrTag(format!("unknown revision '{rev}'"));
        if rev.is_empty() || rev.contains('/') || rev.contains("..") {
            return Err(unknown());
        }
        if let Some(id) = Self::read_ref(&self.tag_path(rev))? {
            return Ok(id);
        }
        if let Some(id) = Self::read_ref(&self.branch_path(rev))? {
            return Ok(id);
        }
        let id = CommitId::new(rev);
        if self.commit_path(&id).is_file() {
            return Ok(id);
        }
        Err(unknown())
    }

    fn read_commit(&self, commit: &CommitId) -> Result<CommitRecord, MirError> {
        let path = self.commit_path(commit);
        let bytes = fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                MirError::InvalidBranchOrTag(format!("commit {} not found", commit.short()))
            }
            _ => err.into(),
        })?;
        serde_json::from_slice(&bytes).map_err(|source| MirError::HistoryRecord { path, source })
    }

    fn read_file(&self, commit: &CommitId, name: &str) -> Result<Vec<u8>, MirError> {
        let record = self.read_commit(commit)?;
        let entry = record.files.get(name).ok_or_else(|| MirError::InvalidMirFile {
            file: name.to_string(),
            message: format!("not present in commit {}", commit.short()),
        })?;
        self.read_object(name, entry)
    }

    fn diff(&self, from: &CommitId, to: &CommitId) -> Result<Vec<FileChange>, MirError> {
        let a = self.read_commit(from)?.files;
        let b = self.read_commit(to)?.files;
        let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        Ok(names
            .into_iter()
            .filter_map(|name| {
                let kind = match (a.get(name), b.get(name)) {
                    (None, Some(_)) => FileChangeKind::Added,
                    (Some(_), None) => FileChangeKind::Removed,
                    (Some(x), Some(y)) if x.blob != y.blob => FileChangeKind::Modified,
                    _ => return None,
                };
                Some(FileChange {
                    name: name.clone(),
                    kind,
                })
            })
            .collect())
    }

    fn log(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, MirError> {
        let mut out = Vec::new();
        let mut next = Some(start.clone());
        while let Some(id) = next {
            if out.len() >= limit {
                break;
            }
            let record = self.read_commit(&id)?;
            next = record.parents.first().cloned();
            out.push(CommitInfo { id, record });
        }
        Ok(out)
    }

    fn restore_working_tree(&self) -> Result<(), MirError> {
        let record = self.head_files()?;
        self.materialize(record.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILES: [&str; 2] = ["a.mir", "b.mir"];

    fn store() -> (tempfile::TempDir, FsVersionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsVersionStore::new(dir.path(), &FILES);
        store.init("master").expect("init");
        (dir, store)
    }

    #[test]
    fn test_commit_then_read_back() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.mir"), b"one").expect("write");
        let id = store.commit("first").expect("commit");
        assert_eq!(store.read_file(&id, "a.mir").expect("read"), b"one");
        assert!(store.is_clean().expect("clean"));
        assert_eq!(store.resolve("master").expect("resolve"), id);
    }

    #[test]
    fn test_dirty_detection_and_restore() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.mir"), b"one").expect("write");
        store.commit("first").expect("commit");
        fs::write(dir.path().join("a.mir"), b"two").expect("write");
        fs::write(dir.path().join("b.mir"), b"new").expect("write");
        assert_eq!(store.dirty_files().expect("dirty"), vec!["a.mir", "b.mir"]);
        store.restore_working_tree().expect("restore");
        assert!(store.is_clean().expect("clean"));
        assert!(!dir.path().join("b.mir").exists());
    }

    #[test]
    fn test_branches_and_checkout() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.mir"), b"base").expect("write");
        let base = store.commit("base").expect("commit");
        store.create_branch("dev").expect("branch");
        fs::write(dir.path().join("a.mir"), b"dev").expect("write");
        let dev = store.commit("dev").expect("commit");

        store.checkout("master").expect("checkout");
        assert_eq!(fs::read(dir.path().join("a.mir")).expect("read"), b"base");
        assert_eq!(store.list_branches().expect("list"), vec!["dev", "master"]);

        let changes = store.diff(&base, &dev).expect("diff");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, FileChangeKind::Modified);

        let log = store.log(&dev, 10).expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].id, base);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.mir"), b"x").expect("write");
        let id = store.commit("c").expect("commit");
        store.tag("master@t1", &id).expect("tag");
        assert!(matches!(
            store.tag("master@t1", &id),
            Err(MirError::InvalidBranchOrTag(_))
        ));
        assert_eq!(store.resolve("master@t1").expect("resolve"), id);
        assert_eq!(store.list_tags().expect("tags"), vec!["master@t1"]);
    }

    #[test]
    fn test_unknown_rev() {
        let (_dir, store) = store();
        assert!(matches!(
            store.resolve("nope"),
            Err(MirError::InvalidBranchOrTag(_))
        ));
    }
}
