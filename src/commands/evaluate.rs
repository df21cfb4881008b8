use serde::Serialize;
use std::path::PathBuf;

use super::{open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::error::MirError;
use crate::eval::{evaluate, EvaluateConfig, Evaluation, EvaluationOutput};
use crate::model::{AnnotationSet, MirStorage, Snapshot, TaskId, TaskType};
use crate::progress::ProgressReporter;
use crate::storage::{MirRepo, RevTid};
use crate::vcs::CommitId;

/// Evaluates the prediction channel of `src_rev` against ground truth and
/// commits the confusion-matrix tagged annotations.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluateRequest {
    pub root: PathBuf,
    pub src_rev: RevTid,
    /// Ground truth taken from this revision instead of `src_rev`.
    pub gt_rev: Option<RevTid>,
    pub dst_branch: String,
    pub config: EvaluateConfig,
    /// Classes to score by name; merged into `config.class_ids`.
    pub class_names: Vec<String>,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: EvaluateRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        Some(req.src_rev.clone()),
        TaskType::Evaluate,
        req.task_id.clone(),
    );

    let mut config = req.config.clone();
    let labels = repo.labels()?;
    config.class_ids.extend(labels.resolve_names(&req.class_names)?);
    config.validate()?;

    let source = repo.load(
        Some(&req.src_rev),
        &[MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks],
    )?;
    let ground_truth = match &req.gt_rev {
        Some(rev) => load_ground_truth(&repo, rev)?,
        None => source.annotations.ground_truth.clone(),
    };

    progress.update("evaluate", 0, 1);
    let result = evaluate(&source.annotations.prediction, &ground_truth, &config);
    let output = record_failure(&repo, &target, result)?;
    progress.finish("evaluate");

    let map = output.evaluation.map();
    let (commit, evaluation) = commit_tagged(&repo, &req, &target, source, output)?;
    let mut outcome = CommandOutcome::committed(
        commit,
        target.task_id.clone(),
        format!(
            "evaluated {} into {}@{}: mAP {map:.4}",
            req.src_rev, target.branch, target.task_id
        ),
    );
    outcome.evaluation = Some(evaluation);
    Ok(outcome)
}

fn load_ground_truth(repo: &MirRepo, rev: &RevTid) -> Result<AnnotationSet, MirError> {
    let snapshot = repo.load(Some(rev), &[MirStorage::Annotations])?;
    Ok(snapshot.annotations.ground_truth)
}

fn commit_tagged(
    repo: &MirRepo,
    req: &EvaluateRequest,
    target: &TaskTarget,
    source: Snapshot,
    output: EvaluationOutput,
) -> Result<(CommitId, Evaluation), MirError> {
    let ancestor = source.head_task_id().clone();
    let mut annotations = source.annotations;
    let class_ids = output.evaluation.config.class_ids.clone();
    annotations.prediction = output.prediction;
    annotations.prediction.eval_class_ids = class_ids;
    if req.gt_rev.is_none() {
        annotations.ground_truth = output.ground_truth;
    }

    let mut task = target.task().with_parameters(req).with_ancestor(ancestor);
    task.evaluation = Some(output.evaluation.clone());
    let request = target
        .commit_request(task)
        .with_content(source.metadatas, annotations);
    let commit = repo.save_and_commit(request)?;
    Ok((commit, output.evaluation))
}
