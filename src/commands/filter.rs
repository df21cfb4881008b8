use serde::Serialize;
use std::path::PathBuf;

use super::{open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::error::MirError;
use crate::model::{MirStorage, TaskId, TaskType};
use crate::ops::{filter_snapshot, FilterOptions};
use crate::progress::ProgressReporter;
use crate::storage::RevTid;

#[derive(Clone, Debug, Serialize)]
pub struct FilterRequest {
    pub root: PathBuf,
    pub src_rev: RevTid,
    pub dst_branch: String,
    pub options: FilterOptions,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: FilterRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        Some(req.src_rev.clone()),
        TaskType::Filter,
        req.task_id.clone(),
    );

    // Unknown class names are an argument error, checked before loading.
    let labels = repo.labels()?;
    labels.resolve_names(&req.options.include)?;
    labels.resolve_names(&req.options.exclude)?;

    let result = repo
        .load(
            Some(&req.src_rev),
            &[MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks],
        )
        .and_then(|snapshot| {
            progress.update("filter", 0, 1);
            let out = filter_snapshot(&snapshot.metadatas, &snapshot.annotations, &labels, &req.options)?;
            progress.finish("filter");
            Ok((snapshot.tasks.head_task_id, out))
        });
    let (ancestor, filtered) = record_failure(&repo, &target, result)?;

    let task = target.task().with_parameters(&req).with_ancestor(ancestor);
    let summary = format!(
        "filtered {} into {}@{}: kept {} asset(s), dropped {}",
        req.src_rev,
        target.branch,
        target.task_id,
        filtered.metadatas.len(),
        filtered.dropped
    );
    let request = target
        .commit_request(task)
        .with_content(filtered.metadatas, filtered.annotations);
    let commit = repo.save_and_commit(request)?;
    Ok(CommandOutcome::committed(commit, target.task_id.clone(), summary))
}
