//! Storage operations engine: load and commit snapshots.
//!
//! A repository is a directory holding:
//!
//! ```text
//! .mir/             history (see crate::vcs), config.yaml, format_version, repo.lock
//! .mir_assets/      media blobs (see crate::assets)
//! labels.yaml       label space
//! *.mir             working tree: the four collection files of the checkout
//! ```
//!
//! [`MirRepo::save_and_commit`] is the only writer of history. It holds the
//! repository lock for its whole duration, derives the keywords collection
//! and tags the new commit `branch@task_id`.

mod rebuild;
mod rev;

pub use rebuild::{build_index, rebuild_keywords};
pub use rev::{tag_name, RevTid, TypedRev};

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::assets::{AssetStore, ASSET_DIR};
use crate::config::{RepoConfig, CONFIG_FILE};
use crate::error::MirError;
use crate::labels::{LabelSpace, LABELS_FILE};
use crate::mir_file::{self, MirCollection, WireSnapshot, FORMAT_VERSION};
use crate::model::{Annotations, Metadatas, MirStorage, Snapshot, Task, TaskType, Tasks, TaskId};
use crate::validation::{validate_snapshot, ValidateOptions};
use crate::vcs::{CommitId, FsVersionStore, RepoLock, VersionStore, HISTORY_DIR};

/// Branch created by `init`.
pub const DEFAULT_BRANCH: &str = "master";

const FORMAT_VERSION_FILE: &str = "format_version";
const LOCK_FILE: &str = "repo.lock";

/// Content and provenance of one commit.
#[derive(Clone, Debug)]
pub struct CommitRequest {
    /// Branch receiving the commit; created if absent.
    pub branch: String,
    /// Revision the new branch starts from: the head of a branch, or the
    /// tagged commit for `branch@task_id`. Ignored when `branch` exists.
    pub ancestor: Option<String>,
    /// `None` commits an empty collection.
    pub metadatas: Option<Metadatas>,
    pub annotations: Option<Annotations>,
    pub task: Task,
    /// Commit message; defaults to the task type and id.
    pub message: Option<String>,
}

impl CommitRequest {
    pub fn new(branch: impl Into<String>, task: Task) -> Self {
        Self {
            branch: branch.into(),
            ancestor: None,
            metadatas: None,
            annotations: None,
            task,
            message: None,
        }
    }

    pub fn with_ancestor(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestor = Some(ancestor.into());
        self
    }

    pub fn with_content(mut self, metadatas: Metadatas, annotations: Annotations) -> Self {
        self.metadatas = Some(metadatas);
        self.annotations = Some(annotations);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// An opened repository.
pub struct MirRepo {
    root: PathBuf,
    store: Box<dyn VersionStore>,
    assets: AssetStore,
    config: RepoConfig,
}

impl std::fmt::Debug for MirRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirRepo")
            .field("root", &self.root)
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

fn tracked_files() -> Vec<&'static str> {
    MirStorage::file_names()
}

impl MirRepo {
    /// Opens the repository at `root` with the native history store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, MirError> {
        let root = root.as_ref().to_path_buf();
        let store = FsVersionStore::new(&root, &tracked_files());
        Self::open_with_store(root, Box::new(store))
    }

    /// Opens the repository at `root` over a caller-provided history store.
    pub fn open_with_store(
        root: impl Into<PathBuf>,
        store: Box<dyn VersionStore>,
    ) -> Result<Self, MirError> {
        let root = root.into();
        if !store.is_initialized() {
            return Err(MirError::InvalidRepo {
                path: root,
                message: format!("no {HISTORY_DIR} history directory"),
            });
        }
        let config = RepoConfig::load(&root.join(HISTORY_DIR).join(CONFIG_FILE))?;
        let assets = AssetStore::new(asset_root(&root, &config));
        if !assets.exists() {
            return Err(MirError::InvalidRepo {
                path: root,
                message: format!("missing asset store {}", assets.root().display()),
            });
        }
        Ok(Self {
            root,
            store,
            assets,
            config,
        })
    }

    /// Creates a repository at `root` with an initial `master` commit.
    pub fn init(root: impl AsRef<Path>, config: RepoConfig) -> Result<Self, MirError> {
        let root = root.as_ref().to_path_buf();
        let store = FsVersionStore::new(&root, &tracked_files());
        Self::init_with_store(root, Box::new(store), config)
    }

    pub fn init_with_store(
        root: impl Into<PathBuf>,
        store: Box<dyn VersionStore>,
        config: RepoConfig,
    ) -> Result<Self, MirError> {
        let root = root.into();
        if store.is_initialized() {
            return Err(MirError::InvalidRepo {
                path: root,
                message: "already initialized".to_string(),
            });
        }
        fs::create_dir_all(&root)?;
        store.init(DEFAULT_BRANCH)?;
        let history = root.join(HISTORY_DIR);
        config.save(&history.join(CONFIG_FILE))?;
        fs::write(history.join(FORMAT_VERSION_FILE), format!("{FORMAT_VERSION}\n"))?;
        fs::create_dir_all(asset_root(&root, &config))?;
        let labels_path = root.join(LABELS_FILE);
        if !labels_path.exists() {
            LabelSpace::default().save(&labels_path)?;
        }

        let repo = Self::open_with_store(root, store)?;
        let task = Task::new(TaskType::Init, TaskId::generate());
        repo.save_and_commit(CommitRequest::new(DEFAULT_BRANCH, task).with_message("init"))?;
        tracing::info!(root = %repo.root.display(), "initialized repository");
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn labels_path(&self) -> PathBuf {
        self.root.join(LABELS_FILE)
    }

    pub fn labels(&self) -> Result<LabelSpace, MirError> {
        LabelSpace::load(&self.labels_path())
    }

    pub fn save_labels(&self, labels: &LabelSpace) -> Result<(), MirError> {
        labels.save(&self.labels_path())
    }

    /// Commits together with an extended label space.
    ///
    /// `labels.yaml` is not versioned, so the previous label space is written
    /// back when the commit fails.
    pub fn save_and_commit_with_labels(
        &self,
        request: CommitRequest,
        labels: &LabelSpace,
    ) -> Result<CommitId, MirError> {
        let previous = self.labels()?;
        self.save_labels(labels)?;
        let result = self.save_and_commit(request);
        if result.is_err() {
            if let Err(err) = self.save_labels(&previous) {
                tracing::error!(error = %err, "could not restore label space");
            }
        }
        result
    }

    fn history_path(&self, name: &str) -> PathBuf {
        self.root.join(HISTORY_DIR).join(name)
    }

    /// On-disk format version; repositories without the marker are version 1.
    pub fn format_version(&self) -> Result<u32, MirError> {
        let path = self.history_path(FORMAT_VERSION_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => text.trim().parse().map_err(|_| MirError::InvalidRepo {
                path: path.clone(),
                message: format!("malformed format version '{}'", text.trim()),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(1),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn set_format_version(&self, version: u32) -> Result<(), MirError> {
        fs::write(self.history_path(FORMAT_VERSION_FILE), format!("{version}\n"))?;
        Ok(())
    }

    fn ensure_current_format(&self) -> Result<(), MirError> {
        let version = self.format_version()?;
        if version == FORMAT_VERSION {
            return Ok(());
        }
        let hint = if version < FORMAT_VERSION {
            "; run `mir update` first"
        } else {
            "; this build is too old"
        };
        Err(MirError::InvalidRepo {
            path: self.root.clone(),
            message: format!(
                "repository format {version}, expected {FORMAT_VERSION}{hint}"
            ),
        })
    }

    /// Resolves a revision to a commit.
    pub fn resolve(&self, rev: &RevTid) -> Result<CommitId, MirError> {
        self.store.resolve(&rev.history_rev())
    }

    fn read_bytes(&self, rev: Option<&CommitId>, storage: MirStorage) -> Result<Vec<u8>, MirError> {
        match rev {
            Some(commit) => self.store.read_file(commit, storage.file_name()),
            None => fs::read(self.root.join(storage.file_name())).map_err(|err| {
                match err.kind() {
                    ErrorKind::NotFound => MirError::InvalidMirFile {
                        file: storage.file_name().to_string(),
                        message: "missing from working tree".to_string(),
                    },
                    _ => err.into(),
                }
            }),
        }
    }

    /// Loads one collection at `rev`, or from the working tree when `None`.
    pub fn load_one<C: MirCollection>(&self, rev: Option<&RevTid>) -> Result<C, MirError> {
        self.ensure_current_format()?;
        let commit = rev.map(|r| self.resolve(r)).transpose()?;
        mir_file::decode(&self.read_bytes(commit.as_ref(), C::STORAGE)?)
    }

    /// Loads the requested collections; the others are left empty.
    pub fn load(
        &self,
        rev: Option<&RevTid>,
        collections: &[MirStorage],
    ) -> Result<Snapshot, MirError> {
        self.ensure_current_format()?;
        let commit = rev.map(|r| self.resolve(r)).transpose()?;
        let mut snapshot = Snapshot::default();
        for storage in collections {
            let bytes = self.read_bytes(commit.as_ref(), *storage)?;
            match storage {
                MirStorage::Metadatas => snapshot.metadatas = mir_file::decode(&bytes)?,
                MirStorage::Annotations => snapshot.annotations = mir_file::decode(&bytes)?,
                MirStorage::Keywords => snapshot.keywords = mir_file::decode(&bytes)?,
                MirStorage::Tasks => snapshot.tasks = mir_file::decode(&bytes)?,
            }
        }
        Ok(snapshot)
    }

    /// Loads and validates a complete snapshot.
    pub fn load_snapshot(&self, rev: &RevTid) -> Result<Snapshot, MirError> {
        let snapshot = self.load(Some(rev), &MirStorage::ALL)?;
        check_valid(&snapshot, true)?;
        Ok(snapshot)
    }

    /// Loads and validates the snapshot checked out in the working tree.
    pub fn load_working_tree(&self) -> Result<Snapshot, MirError> {
        let snapshot = self.load(None, &MirStorage::ALL)?;
        check_valid(&snapshot, true)?;
        Ok(snapshot)
    }

    /// Reads all four files of a commit without decoding them into the
    /// domain model and without checking the format version.
    pub(crate) fn read_wire_snapshot(&self, commit: &CommitId) -> Result<WireSnapshot, MirError> {
        WireSnapshot::decode_with(|storage| self.store.read_file(commit, storage.file_name()))
    }

    /// Writes a snapshot as a new commit on `request.branch`.
    ///
    /// Steps, all under the repository lock:
    /// 1. refuse a dirty working tree or an existing `branch@task_id` tag;
    /// 2. check out the target branch, or its ancestor and branch off;
    /// 3. fill missing collections, rebuild keywords, validate;
    /// 4. write the collection files and commit;
    /// 5. tag the commit.
    ///
    /// A failure while writing or committing restores the working tree and
    /// removes a branch created by this call, so no partial state is visible.
    pub fn save_and_commit(&self, request: CommitRequest) -> Result<CommitId, MirError> {
        let CommitRequest {
            branch,
            ancestor,
            metadatas,
            annotations,
            task,
            message,
        } = request;

        let _lock = RepoLock::acquire(&self.history_path(LOCK_FILE))?;

        let dirty = self.store.dirty_files()?;
        if !dirty.is_empty() {
            return Err(MirError::DirtyRepo { files: dirty });
        }
        let branch: RevTid = branch.parse()?;
        if branch.task_id.is_some() {
            return Err(MirError::InvalidBranchOrTag(format!(
                "commit target '{branch}' must be a plain branch"
            )));
        }
        let branch = branch.branch;
        if task.task_id.is_empty() {
            return Err(MirError::InvalidArgs("task id must not be empty".to_string()));
        }
        let tag = tag_name(&branch, &task.task_id);
        if self.store.tag_exists(&tag)? {
            return Err(MirError::InvalidBranchOrTag(format!("tag '{tag}' already exists")));
        }

        let previous_branch = self.store.current_branch()?;
        let mut created = false;
        if self.store.branch_exists(&branch)? {
            self.store.checkout(&branch)?;
        } else {
            let fork_point = match &ancestor {
                Some(ancestor) => {
                    let ancestor: RevTid = ancestor.parse()?;
                    self.store.checkout(&ancestor.branch)?;
                    match ancestor.task_id {
                        Some(_) => Some(self.resolve(&ancestor)?),
                        None => None,
                    }
                }
                None => None,
            };
            if let Some(commit) = fork_point {
                self.store.create_branch_at(&branch, &commit)?;
                created = true;
            } else if self.store.head_commit()?.is_some() {
                self.store.create_branch(&branch)?;
                created = true;
            } else if self.store.current_branch()? != branch {
                return Err(MirError::InvalidBranchOrTag(format!(
                    "cannot branch '{branch}' off an empty history"
                )));
            }
        }

        let metadatas = metadatas.unwrap_or_default();
        let annotations = annotations.unwrap_or_default();
        let keywords = rebuild_keywords(&metadatas, &annotations, &self.config.project_class_ids);
        let task_type = task.task_type;
        let task_id = task.task_id.clone();
        let snapshot = Snapshot {
            metadatas,
            annotations,
            keywords,
            tasks: Tasks::with_head(task),
        };
        if let Err(err) = check_valid(&snapshot, false) {
            self.rollback(&branch, &previous_branch, created);
            return Err(err);
        }

        let message = message.unwrap_or_else(|| format!("{task_type} {task_id}"));
        let commit = match self.write_and_commit(&snapshot, &message) {
            Ok(commit) => commit,
            Err(err) => {
                tracing::warn!(branch = %branch, error = %err, "commit failed, restoring working tree");
                self.rollback(&branch, &previous_branch, created);
                return Err(err);
            }
        };
        self.store.tag(&tag, &commit)?;

        tracing::info!(
            branch = %branch,
            task = %task_id,
            task_type = %task_type,
            commit = commit.short(),
            assets = snapshot.metadatas.len(),
            "committed snapshot"
        );
        Ok(commit)
    }

    fn write_and_commit(&self, snapshot: &Snapshot, message: &str) -> Result<CommitId, MirError> {
        for (storage, bytes) in mir_file::encode_snapshot(snapshot) {
            write_file_atomic(&self.root.join(storage.file_name()), &bytes)?;
        }
        self.store.commit(message)
    }

    fn rollback(&self, branch: &str, previous_branch: &str, created: bool) {
        if let Err(err) = self.store.restore_working_tree() {
            tracing::error!(error = %err, "failed to restore working tree");
        }
        if created {
            let restored = if self.store.branch_exists(previous_branch).unwrap_or(false) {
                self.store.checkout(previous_branch)
            } else {
                Ok(())
            };
            if let Err(err) = restored.and_then(|()| self.store.delete_branch(branch)) {
                tracing::error!(branch, error = %err, "failed to remove branch after aborted commit");
            }
        }
    }
}

/// Blob store location for `root` under `config`.
pub fn asset_root(root: &Path, config: &RepoConfig) -> PathBuf {
    match &config.asset_store {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => root.join(path),
        None => root.join(ASSET_DIR),
    }
}

fn check_valid(snapshot: &Snapshot, check_keywords: bool) -> Result<(), MirError> {
    let report = validate_snapshot(
        snapshot,
        &ValidateOptions {
            strict: false,
            check_keywords,
        },
    );
    if report.is_ok() {
        return Ok(());
    }
    for issue in report.issues.iter().take(20) {
        tracing::warn!(%issue, "snapshot validation");
    }
    Err(MirError::SnapshotInvalid {
        error_count: report.error_count(),
        report,
    })
}

fn write_file_atomic(dest: &Path, bytes: &[u8]) -> Result<(), MirError> {
    let tmp = dest.with_extension(format!("{}.partial", std::process::id()));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetId, AssetMeta, AssetType, BBox, ObjectAnnotation};

    fn repo() -> (tempfile::TempDir, MirRepo) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = MirRepo::init(dir.path(), RepoConfig::default()).expect("init");
        (dir, repo)
    }

    fn content() -> (Metadatas, Annotations) {
        let asset = AssetId::from_bytes(b"pixels");
        let mut metadatas = Metadatas::default();
        metadatas
            .attributes
            .insert(asset.clone(), AssetMeta::new(AssetType::ImagePng, 20, 20));
        let mut annotations = Annotations::default();
        annotations.ground_truth.image_annotations.insert(
            asset,
            vec![ObjectAnnotation::new(0, 1, BBox::from_xyxy(1.0, 1.0, 5.0, 5.0))],
        );
        (metadatas, annotations)
    }

    fn import(repo: &MirRepo, branch: &str, ancestor: Option<&str>) -> TaskId {
        let (metadatas, annotations) = content();
        let task = Task::new(TaskType::Import, TaskId::generate());
        let task_id = task.task_id.clone();
        let mut request = CommitRequest::new(branch, task).with_content(metadatas, annotations);
        request.ancestor = ancestor.map(str::to_string);
        repo.save_and_commit(request).expect("commit");
        task_id
    }

    #[test]
    fn test_init_creates_tagged_empty_commit() {
        let (_dir, repo) = repo();
        assert_eq!(repo.format_version().expect("version"), FORMAT_VERSION);
        let snapshot = repo
            .load_snapshot(&RevTid::branch(DEFAULT_BRANCH))
            .expect("load");
        assert!(snapshot.metadatas.is_empty());
        let head = snapshot.head_task().expect("head task");
        assert_eq!(head.task_type, TaskType::Init);
        let tag = tag_name(DEFAULT_BRANCH, &head.task_id);
        assert!(repo.store().tag_exists(&tag).expect("tag"));
    }

    #[test]
    fn test_commit_then_load_by_tag() {
        let (_dir, repo) = repo();
        let task_id = import(&repo, "a", Some(DEFAULT_BRANCH));
        let rev = RevTid::new("a", Some(task_id.clone()));
        let snapshot = repo.load_snapshot(&rev).expect("load");
        assert_eq!(snapshot.metadatas.len(), 1);
        assert_eq!(snapshot.head_task_id(), &task_id);
        assert_eq!(snapshot.keywords.context.gt_stats.total_cnt, 1);
        assert_eq!(repo.store().current_branch().expect("branch"), "a");
    }

    #[test]
    fn test_load_subset_leaves_rest_empty() {
        let (_dir, repo) = repo();
        import(&repo, "a", None);
        let snapshot = repo
            .load(Some(&RevTid::branch("a")), &[MirStorage::Metadatas])
            .expect("load");
        assert_eq!(snapshot.metadatas.len(), 1);
        assert!(snapshot.annotations.ground_truth.is_empty());
        let tasks: Tasks = repo.load_one(Some(&RevTid::branch("a"))).expect("tasks");
        assert_eq!(tasks.head().map(|t| t.task_type), Some(TaskType::Import));
    }

    #[test]
    fn test_dirty_repo_refused() {
        let (dir, repo) = repo();
        fs::write(dir.path().join("metadatas.mir"), b"edited").expect("write");
        let task = Task::new(TaskType::Import, TaskId::generate());
        let err = repo
            .save_and_commit(CommitRequest::new("b", task))
            .expect_err("dirty");
        assert!(matches!(err, MirError::DirtyRepo { .. }));
    }

    #[test]
    fn test_duplicate_task_tag_refused() {
        let (_dir, repo) = repo();
        let task_id = import(&repo, "a", None);
        let task = Task::new(TaskType::Import, task_id);
        let err = repo
            .save_and_commit(CommitRequest::new("a", task))
            .expect_err("duplicate");
        assert!(matches!(err, MirError::InvalidBranchOrTag(_)));
    }

    #[test]
    fn test_invalid_snapshot_leaves_no_branch() {
        let (_dir, repo) = repo();
        let (_, annotations) = content();
        let task = Task::new(TaskType::Import, TaskId::generate());
        let request = CommitRequest::new("broken", task)
            .with_content(Metadatas::default(), annotations);
        let err = repo.save_and_commit(request).expect_err("invalid");
        assert!(matches!(err, MirError::SnapshotInvalid { .. }));
        assert!(!repo.store().branch_exists("broken").expect("exists"));
        assert_eq!(repo.store().current_branch().expect("branch"), DEFAULT_BRANCH);
    }

    #[test]
    fn test_old_format_refused() {
        let (_dir, repo) = repo();
        repo.set_format_version(2).expect("set");
        let err = repo
            .load_snapshot(&RevTid::branch(DEFAULT_BRANCH))
            .expect_err("old format");
        assert!(matches!(err, MirError::InvalidRepo { .. }));
    }

    #[test]
    fn test_open_requires_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MirRepo::open(dir.path()).expect_err("not a repo");
        assert!(matches!(err, MirError::InvalidRepo { .. }));
    }
}
