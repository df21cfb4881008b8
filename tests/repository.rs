use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mirvcs::commands::{run_command, CommandRequest, UpdateRequest};
use mirvcs::mir_file::wire::{WireAnnotations, WireKeywords};
use mirvcs::mir_file::{decode_wire, FORMAT_VERSION};
use mirvcs::model::{MirStorage, Task, TaskId, TaskType};
use mirvcs::progress::NoProgress;
use mirvcs::storage::{tag_name, CommitRequest, MirRepo, RevTid};
use mirvcs::vcs::{
    CommitId, CommitInfo, CommitRecord, FileChange, FsVersionStore, VersionStore, HISTORY_DIR,
};
use mirvcs::{MirCode, MirError};
use prost::Message;

mod common;
use common::{write_annotations, write_media, TestRepo};

/// Native store whose `commit` can be made to fail.
struct FlakyStore {
    inner: FsVersionStore,
    fail_commit: Arc<AtomicBool>,
}

impl VersionStore for FlakyStore {
    fn root(&self) -> &Path {
        self.inner.root()
    }
    fn init(&self, branch: &str) -> Result<(), MirError> {
        self.inner.init(branch)
    }
    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }
    fn dirty_files(&self) -> Result<Vec<String>, MirError> {
        self.inner.dirty_files()
    }
    fn current_branch(&self) -> Result<String, MirError> {
        self.inner.current_branch()
    }
    fn head_commit(&self) -> Result<Option<CommitId>, MirError> {
        self.inner.head_commit()
    }
    fn branch_exists(&self, branch: &str) -> Result<bool, MirError> {
        self.inner.branch_exists(branch)
    }
    fn list_branches(&self) -> Result<Vec<String>, MirError> {
        self.inner.list_branches()
    }
    fn checkout(&self, branch: &str) -> Result<(), MirError> {
        self.inner.checkout(branch)
    }
    fn create_branch(&self, branch: &str) -> Result<(), MirError> {
        self.inner.create_branch(branch)
    }
    fn create_branch_at(&self, branch: &str, commit: &CommitId) -> Result<(), MirError> {
        self.inner.create_branch_at(branch, commit)
    }
    fn delete_branch(&self, branch: &str) -> Result<(), MirError> {
        self.inner.delete_branch(branch)
    }
    fn commit(&self, message: &str) -> Result<CommitId, MirError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.commit(message)
    }
    fn tag(&self, name: &str, commit: &CommitId) -> Result<(), MirError> {
        self.inner.tag(name, commit)
    }
    fn tag_exists(&self, name: &str) -> Result<bool, MirError> {
        self.inner.tag_exists(name)
    }
    fn list_tags(&self) -> Result<Vec<String>, MirError> {
        self.inner.list_tags()
    }
    fn resolve(&self, rev: &str) -> Result<CommitId, MirError> {
        self.inner.resolve(rev)
    }
    fn read_commit(&self, commit: &CommitId) -> Result<CommitRecord, MirError> {
        self.inner.read_commit(commit)
    }
    fn read_file(&self, commit: &CommitId, name: &str) -> Result<Vec<u8>, MirError> {
        self.inner.read_file(commit, name)
    }
    fn diff(&self, from: &CommitId, to: &CommitId) -> Result<Vec<FileChange>, MirError> {
        self.inner.diff(from, to)
    }
    fn log(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, MirError> {
        self.inner.log(start, limit)
    }
    fn restore_working_tree(&self) -> Result<(), MirError> {
        self.inner.restore_working_tree()
    }
}

fn flaky_repo(root: &Path) -> (MirRepo, Arc<AtomicBool>) {
    let fail = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: FsVersionStore::new(root, &MirStorage::file_names()),
        fail_commit: Arc::clone(&fail),
    };
    let repo = MirRepo::open_with_store(root, Box::new(store)).expect("open");
    (repo, fail)
}

fn seeded() -> TestRepo {
    let repo = TestRepo::init(&["cat"]);
    let media = repo.scratch("media");
    write_media(&media, &["a.bmp", "b.bmp"]);
    let gt = repo.scratch("gt.json");
    write_annotations(
        &gt,
        &[
            ("a.bmp", "cat", [0.0, 0.0, 5.0, 5.0], None),
            ("a.bmp", "cat", [10.0, 10.0, 20.0, 20.0], None),
            ("b.bmp", "cat", [3.0, 3.0, 9.0, 9.0], None),
        ],
    );
    repo.import(&media, None, Some(gt), "a", "t-import");
    repo
}

fn rev_tid(s: &str) -> RevTid {
    s.parse().expect("revision")
}

fn task(id: &str) -> Task {
    Task::new(TaskType::Filter, TaskId::new(id))
}

#[test]
fn failed_commit_on_new_branch_leaves_no_trace() {
    let repo = seeded();
    let (opened, fail) = flaky_repo(&repo.root);
    let before = opened.load_working_tree().expect("working tree");
    let content = opened
        .load(Some(&RevTid::branch("a")), &[MirStorage::Metadatas, MirStorage::Annotations])
        .expect("load");

    fail.store(true, Ordering::SeqCst);
    let err = opened
        .save_and_commit(
            CommitRequest::new("broken", task("t-broken"))
                .with_ancestor("master")
                .with_content(content.metadatas, content.annotations),
        )
        .expect_err("commit fails");
    assert_eq!(err.code(), MirCode::RuntimeError);

    let store = opened.store();
    assert!(!store.branch_exists("broken").expect("branch lookup"));
    assert!(!store.tag_exists("broken@t-broken").expect("tag lookup"));
    assert_eq!(store.current_branch().expect("branch"), "a");
    assert!(store.is_clean().expect("status"));

    // The tree matches the checkout again, and the next commit goes through.
    fail.store(false, Ordering::SeqCst);
    assert_eq!(opened.load_working_tree().expect("tree").metadatas, before.metadatas);
    opened
        .save_and_commit(CommitRequest::new("a", task("t-retry")))
        .expect("retry");
}

#[test]
fn new_branch_forks_at_the_tagged_commit() {
    let repo = seeded();
    let opened = MirRepo::open(&repo.root).expect("open");
    let imported = opened.resolve(&rev_tid("a@t-import")).expect("tag");
    opened
        .save_and_commit(CommitRequest::new("a", task("t-later")))
        .expect("advance a");
    assert_ne!(opened.resolve(&RevTid::branch("a")).expect("head"), imported);

    let commit = opened
        .save_and_commit(
            CommitRequest::new("fork", task("t-fork").with_ancestor(TaskId::new("t-import")))
                .with_ancestor("a@t-import"),
        )
        .expect("fork");
    let record = opened.store().read_commit(&commit).expect("record");
    assert_eq!(record.parents, vec![imported]);
    let tasks = opened
        .load_one::<mirvcs::model::Tasks>(Some(&RevTid::branch("fork")))
        .expect("tasks");
    assert_eq!(
        tasks.head().expect("head task").ancestor_task_id,
        TaskId::new("t-import")
    );
}

#[test]
fn failed_commit_on_existing_branch_keeps_head() {
    let repo = seeded();
    let (opened, fail) = flaky_repo(&repo.root);
    let head = opened.resolve(&RevTid::branch("a")).expect("head");

    fail.store(true, Ordering::SeqCst);
    opened
        .save_and_commit(CommitRequest::new("a", task("t-x")))
        .expect_err("commit fails");

    assert_eq!(opened.resolve(&RevTid::branch("a")).expect("head"), head);
    assert!(opened.store().is_clean().expect("status"));
    assert_eq!(opened.load_working_tree().expect("tree").metadatas.len(), 2);
}

#[test]
fn dirty_working_tree_refuses_commits() {
    let repo = seeded();
    fs::write(repo.root.join(MirStorage::Metadatas.file_name()), b"scribbled").expect("write");
    let opened = MirRepo::open(&repo.root).expect("open");
    let err = opened
        .save_and_commit(CommitRequest::new("a", task("t-dirty")))
        .expect_err("dirty");
    assert!(matches!(err, MirError::DirtyRepo { ref files } if files == &["metadatas.mir"]));
    assert_eq!(err.code(), MirCode::DirtyRepo);
}

#[test]
fn task_ids_are_unique_per_branch() {
    let repo = seeded();
    let opened = MirRepo::open(&repo.root).expect("open");
    let err = opened
        .save_and_commit(CommitRequest::new("a", task("t-import")))
        .expect_err("tag exists");
    assert_eq!(err.code(), MirCode::InvalidBranchOrTag);

    // The same id is free on another branch.
    opened
        .save_and_commit(CommitRequest::new("b", task("t-import")).with_ancestor("a"))
        .expect("other branch");
}

#[test]
fn concurrent_commits_are_serialized() {
    let repo = TestRepo::init(&["cat"]);
    let per_thread = 3;
    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|branch| {
            let root = repo.root.clone();
            thread::spawn(move || {
                let opened = MirRepo::open(&root).expect("open");
                for i in 0..per_thread {
                    opened
                        .save_and_commit(
                            CommitRequest::new(branch, task(&format!("{branch}-{i}")))
                                .with_ancestor("master"),
                        )
                        .expect("commit");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    let opened = MirRepo::open(&repo.root).expect("open");
    assert!(opened.store().is_clean().expect("status"));
    for branch in ["left", "right"] {
        let head = opened.resolve(&RevTid::branch(branch)).expect("head");
        let history = opened.store().log(&head, 100).expect("log");
        assert_eq!(history.len(), per_thread + 1, "{branch}");
        for i in 0..per_thread {
            let tag = tag_name(branch, &TaskId::new(format!("{branch}-{i}")));
            assert!(opened.store().tag_exists(&tag).expect("tag lookup"), "{tag}");
        }
        let tasks: mirvcs::model::Tasks = opened
            .load_one(Some(&RevTid::branch(branch)))
            .expect("tasks");
        assert_eq!(tasks.head_task_id, TaskId::new(format!("{branch}-{}", per_thread - 1)));
    }
}

/// Rewrites the checkout of `branch` the way a format 1 release stored it:
/// every object index 0 and no keyword context.
fn downgrade_to_v1(root: &Path, branch: &str) {
    let opened = MirRepo::open(root).expect("open");
    opened.store().checkout(branch).expect("checkout");

    let path = root.join(MirStorage::Annotations.file_name());
    let bytes = fs::read(&path).expect("read annotations");
    let mut annotations: WireAnnotations =
        decode_wire(MirStorage::Annotations, &bytes).expect("decode");
    for set in [annotations.prediction.as_mut(), annotations.ground_truth.as_mut()]
        .into_iter()
        .flatten()
    {
        for image in set.image_annotations.values_mut() {
            for object in &mut image.objects {
                object.index = 0;
                object.det_link_id = 0;
            }
        }
    }
    fs::write(&path, annotations.encode_to_vec()).expect("write annotations");
    fs::write(
        root.join(MirStorage::Keywords.file_name()),
        WireKeywords::default().encode_to_vec(),
    )
    .expect("write keywords");
    opened.store().commit("written by format 1").expect("commit");
    fs::remove_file(root.join(HISTORY_DIR).join("format_version")).expect("remove marker");
}

#[test]
fn update_migrates_every_branch() {
    let repo = seeded();
    downgrade_to_v1(&repo.root, "a");

    let opened = MirRepo::open(&repo.root).expect("open");
    assert_eq!(opened.format_version().expect("version"), 1);
    let err = opened
        .load_snapshot(&RevTid::branch("a"))
        .expect_err("old format is refused");
    assert_eq!(err.code(), MirCode::InvalidRepo);

    let outcome = run_command(
        CommandRequest::Update(UpdateRequest {
            root: repo.root.clone(),
            task_id: None,
        }),
        &NoProgress,
    )
    .expect("update");
    assert_eq!(outcome.commits.len(), 2);
    let task_id = TaskId::new(format!("update-v1-v{FORMAT_VERSION}"));
    assert_eq!(outcome.task_id.as_ref(), Some(&task_id));

    let opened = MirRepo::open(&repo.root).expect("reopen");
    assert_eq!(opened.format_version().expect("version"), FORMAT_VERSION);
    let snapshot = opened.load_snapshot(&RevTid::branch("a")).expect("migrated");
    for objects in snapshot.annotations.ground_truth.image_annotations.values() {
        let indices: Vec<u32> = objects.iter().map(|o| o.index).collect();
        let expected: Vec<u32> = (0..objects.len() as u32).collect();
        assert_eq!(indices, expected);
    }
    assert_eq!(snapshot.keywords.context.images_cnt, 2);
    assert_eq!(snapshot.keywords.context.gt_stats.total_cnt, 3);
    let head = snapshot.tasks.head().expect("head");
    assert_eq!(head.task_type, TaskType::Update);
    assert!(opened
        .store()
        .tag_exists(&tag_name("master", &task_id))
        .expect("tag lookup"));

    let again = run_command(
        CommandRequest::Update(UpdateRequest {
            root: repo.root.clone(),
            task_id: None,
        }),
        &NoProgress,
    )
    .expect("second update");
    assert!(again.commits.is_empty());
}

#[test]
fn interrupted_update_resumes() {
    let repo = seeded();
    downgrade_to_v1(&repo.root, "a");
    run_command(
        CommandRequest::Update(UpdateRequest {
            root: repo.root.clone(),
            task_id: None,
        }),
        &NoProgress,
    )
    .expect("update");

    // Every branch is already tagged; a rerun at the old marker skips them.
    fs::write(repo.root.join(HISTORY_DIR).join("format_version"), "1\n").expect("marker");
    let outcome = run_command(
        CommandRequest::Update(UpdateRequest {
            root: repo.root.clone(),
            task_id: None,
        }),
        &NoProgress,
    )
    .expect("rerun");
    assert!(outcome.commits.is_empty());
    let opened = MirRepo::open(&repo.root).expect("open");
    assert_eq!(opened.format_version().expect("version"), FORMAT_VERSION);
}
