use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::error::MirError;
use crate::model::{AssetId, Metadatas, MirStorage, TaskId, TaskType};
use crate::ops::{merge_snapshots, MergeOutput, MergeSource, MergeStrategy};
use crate::progress::ProgressReporter;
use crate::storage::{MirRepo, RevTid, TypedRev};

const SOURCE_COLLECTIONS: [MirStorage; 3] =
    [MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks];

#[derive(Clone, Debug, Serialize)]
pub struct MergeRequest {
    pub root: PathBuf,
    /// Base of the result; also the branch the destination starts from.
    pub host: TypedRev,
    pub guests: Vec<TypedRev>,
    /// Assets of these revisions are removed from the result.
    pub excludes: Vec<RevTid>,
    /// Falls back to the repository's configured strategy.
    pub strategy: Option<MergeStrategy>,
    pub dst_branch: String,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: MergeRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    if req.guests.is_empty() && req.excludes.is_empty() {
        return Err(MirError::InvalidArgs(
            "merge needs at least one guest or exclude revision".to_string(),
        ));
    }
    let repo = open_repo(&req.root)?;
    let strategy = req.strategy.unwrap_or(repo.config().merge_strategy);
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        Some(req.host.rev.clone()),
        TaskType::Merge,
        req.task_id.clone(),
    );

    let result = merge(&repo, &req, strategy, progress);
    let merged = record_failure(&repo, &target, result)?;

    let task = target
        .task()
        .with_parameters(&req)
        .with_ancestor(merged.ancestor_task_id.clone());
    let summary = format!(
        "merged {} guest(s) into {}@{}: {} asset(s), {} added, {} conflicting, {} excluded",
        req.guests.len(),
        target.branch,
        target.task_id,
        merged.metadatas.len(),
        merged.added,
        merged.conflicts,
        merged.excluded
    );
    let request = target
        .commit_request(task)
        .with_content(merged.metadatas, merged.annotations);
    let commit = repo.save_and_commit(request)?;
    Ok(CommandOutcome::committed(commit, target.task_id.clone(), summary))
}

fn merge(
    repo: &MirRepo,
    req: &MergeRequest,
    strategy: MergeStrategy,
    progress: &dyn ProgressReporter,
) -> Result<MergeOutput, MirError> {
    let total = (1 + req.guests.len() + req.excludes.len()) as u64;
    let mut done = 0;
    let mut tick = || {
        done += 1;
        progress.update("load revisions", done, total);
    };

    let host = load_source(repo, &req.host)?;
    tick();
    let mut guests = Vec::with_capacity(req.guests.len());
    for guest in &req.guests {
        guests.push(load_source(repo, guest)?);
        tick();
    }
    let mut excludes = Vec::with_capacity(req.excludes.len());
    for rev in &req.excludes {
        let metadatas: Metadatas = repo.load_one(Some(rev))?;
        excludes.push(metadatas.attributes.into_keys().collect::<BTreeSet<AssetId>>());
        tick();
    }
    progress.finish("load revisions");

    merge_snapshots(host, guests, &excludes, strategy)
}

fn load_source(repo: &MirRepo, rev: &TypedRev) -> Result<MergeSource, MirError> {
    let snapshot = repo.load(Some(&rev.rev), &SOURCE_COLLECTIONS)?;
    Ok(MergeSource::new(snapshot, rev.tvt_type))
}
