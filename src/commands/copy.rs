use serde::Serialize;
use std::path::PathBuf;

use super::{open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::error::MirError;
use crate::model::{MirStorage, Snapshot, TaskId, TaskType};
use crate::ops::{copy_snapshot, unknown_class_names, CopyOptions, CopyOutput, UnknownTypesStrategy};
use crate::progress::ProgressReporter;
use crate::storage::{MirRepo, RevTid};

/// Copies a revision of another repository into this one.
#[derive(Clone, Debug, Serialize)]
pub struct CopyRequest {
    pub root: PathBuf,
    /// Repository copied from.
    pub src_root: PathBuf,
    pub src_rev: RevTid,
    pub dst_branch: String,
    pub options: CopyOptions,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: CopyRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let foreign = MirRepo::open(&req.src_root)?;
    // The destination branch starts from the current checkout.
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        None,
        TaskType::Copy,
        req.task_id.clone(),
    );

    let source = foreign.load(
        Some(&req.src_rev),
        &[MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks],
    )?;
    let foreign_labels = foreign.labels()?;
    let mut labels = repo.labels()?;

    let mut added = Vec::new();
    if req.options.unknown_types == UnknownTypesStrategy::Add && !req.options.drop_annotations {
        added = unknown_class_names(&source.annotations, &foreign_labels, &labels);
        if !added.is_empty() {
            labels.add_names(&added);
        }
    }
    let out = copy_snapshot(
        &source.metadatas,
        &source.annotations,
        &foreign_labels,
        &labels,
        &req.options,
    )?;

    let result = copy_blobs(&repo, &foreign, &out, progress);
    record_failure(&repo, &target, result)?;

    let mut task = target
        .task()
        .with_parameters(&req)
        .with_ancestor(source_task(&source));
    let labels_extended = !added.is_empty();
    task.new_types_added = added;
    let summary = format!(
        "copied {} asset(s) from {}:{} into {}@{}, dropped {} object(s)",
        out.metadatas.len(),
        req.src_root.display(),
        req.src_rev,
        target.branch,
        target.task_id,
        out.dropped_objects
    );
    let request = target
        .commit_request(task)
        .with_content(out.metadatas, out.annotations);
    let commit = if !labels_extended {
        repo.save_and_commit(request)?
    } else {
        repo.save_and_commit_with_labels(request, &labels)?
    };
    Ok(CommandOutcome::committed(commit, target.task_id.clone(), summary))
}

fn source_task(source: &Snapshot) -> TaskId {
    source.head_task_id().clone()
}

fn copy_blobs(
    repo: &MirRepo,
    foreign: &MirRepo,
    out: &CopyOutput,
    progress: &dyn ProgressReporter,
) -> Result<(), MirError> {
    let total = out.metadatas.len() as u64;
    let mut copied = 0usize;
    for (done, asset_id) in out.metadatas.asset_ids().enumerate() {
        if repo.assets().copy_from(foreign.assets(), asset_id)? {
            copied += 1;
        }
        progress.update("copy assets", done as u64 + 1, total);
    }
    progress.finish("copy assets");
    tracing::debug!(copied, reused = out.metadatas.len() - copied, "copied blobs");
    Ok(())
}
