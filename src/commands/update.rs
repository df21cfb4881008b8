use serde::Serialize;
use std::path::PathBuf;

use super::{open_repo, CommandOutcome};
use crate::error::MirError;
use crate::migrate::{migrate_wire, migrations_from};
use crate::mir_file::FORMAT_VERSION;
use crate::model::{Task, TaskId, TaskType};
use crate::progress::ProgressReporter;
use crate::storage::{tag_name, CommitRequest, MirRepo};

/// Upgrades every branch of an older repository to the current format.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UpdateRequest {
    pub root: PathBuf,
    /// Defaults to `update-v<from>-v<to>`, so an interrupted update resumes
    /// by skipping branches already tagged with it.
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: UpdateRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let version = repo.format_version()?;
    let steps = migrations_from(version)?;
    if steps.is_empty() {
        return Ok(CommandOutcome {
            message: format!("repository is already at format {FORMAT_VERSION}"),
            ..Default::default()
        });
    }
    for step in &steps {
        tracing::info!(?step, "pending migration");
    }

    let task_id = req
        .task_id
        .clone()
        .unwrap_or_else(|| TaskId::new(format!("update-v{version}-v{FORMAT_VERSION}")));
    let original = repo.store().current_branch()?;
    let branches = repo.store().list_branches()?;
    let total = branches.len() as u64;

    let mut outcome = CommandOutcome {
        task_id: Some(task_id.clone()),
        ..Default::default()
    };
    let mut skipped = 0usize;
    for (done, branch) in branches.iter().enumerate() {
        if repo.store().tag_exists(&tag_name(branch, &task_id))? {
            skipped += 1;
        } else {
            let commit = migrate_branch(&repo, &req, branch, version, &task_id)?;
            outcome.commits.push(commit);
        }
        progress.update("migrate branches", done as u64 + 1, total);
    }
    progress.finish("migrate branches");

    repo.set_format_version(FORMAT_VERSION)?;
    if repo.store().branch_exists(&original)? {
        repo.store().checkout(&original)?;
    }
    outcome.message = format!(
        "updated {} branch(es) from format {version} to {FORMAT_VERSION}, {skipped} already done",
        outcome.commits.len()
    );
    Ok(outcome)
}

fn migrate_branch(
    repo: &MirRepo,
    req: &UpdateRequest,
    branch: &str,
    version: u32,
    task_id: &TaskId,
) -> Result<crate::vcs::CommitId, MirError> {
    let head = repo.store().resolve(branch)?;
    let wire = repo.read_wire_snapshot(&head)?;
    let migrated = migrate_wire(wire, version, &repo.config().project_class_ids)?;
    let snapshot = migrated.into_snapshot();

    let task = Task::new(TaskType::Update, task_id.clone())
        .with_parameters(req)
        .with_ancestor(snapshot.head_task_id().clone());
    let request = CommitRequest::new(branch, task)
        .with_content(snapshot.metadatas, snapshot.annotations)
        .with_message(format!("update format {version} -> {FORMAT_VERSION}"));
    let commit = repo.save_and_commit(request)?;
    tracing::info!(branch, commit = commit.short(), "migrated branch");
    Ok(commit)
}
