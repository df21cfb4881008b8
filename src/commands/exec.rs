use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::config::ExecutorSettings;
use crate::error::MirError;
use crate::executor::{ExecConfig, ExecKind, ExecResult, Executor, ProcessExecutor, WorkDir};
use crate::labels::LabelSpace;
use crate::model::{
    AnnotationSet, Annotations, AssetId, Metadatas, MirStorage, ModelMeta, ObjectAnnotation,
    Snapshot, TaskId,
};
use crate::progress::ProgressReporter;
use crate::storage::{MirRepo, RevTid};
use crate::vcs::HISTORY_DIR;

/// Runs an external training, mining or inference program over a revision.
#[derive(Clone, Debug, Serialize)]
pub struct ExecRequest {
    pub root: PathBuf,
    pub kind: ExecKind,
    pub src_rev: RevTid,
    pub dst_branch: String,
    /// Defaults to `.mir/tmp/<task_id>`.
    pub work_dir: Option<PathBuf>,
    /// Passed through to the executor untouched.
    pub executor_config: serde_yaml::Value,
    /// Overrides the program configured for the repository.
    pub executor: Option<ExecutorSettings>,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: ExecRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let settings = match &req.executor {
        Some(settings) => settings.clone(),
        None => open_repo(&req.root)?
            .config()
            .executor
            .clone()
            .ok_or_else(|| {
                MirError::InvalidArgs(
                    "no executor configured; set `executor` in .mir/config.yaml or pass --executor"
                        .to_string(),
                )
            })?,
    };
    run_exec(req, &ProcessExecutor::from_settings(&settings), progress)
}

/// Runs `req` with a caller-provided executor.
pub fn run_exec(
    req: ExecRequest,
    executor: &dyn Executor,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        Some(req.src_rev.clone()),
        req.kind.task_type(),
        req.task_id.clone(),
    );
    let source = repo.load(
        Some(&req.src_rev),
        &[MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks],
    )?;
    let labels = repo.labels()?;
    let workdir = WorkDir::new(req.work_dir.clone().unwrap_or_else(|| {
        repo.root()
            .join(HISTORY_DIR)
            .join("tmp")
            .join(target.task_id.as_str())
    }));

    let result = execute(&repo, &req, &target, &source, &labels, &workdir, executor, progress);
    let output = record_failure(&repo, &target, result)?;

    let mut task = target
        .task()
        .with_parameters(&req)
        .with_ancestor(source.head_task_id().clone());
    task.model = output.model;
    let summary = format!(
        "{} on {} committed to {}@{}: {} asset(s), {} prediction(s)",
        req.kind.task_type(),
        req.src_rev,
        target.branch,
        target.task_id,
        output.metadatas.len(),
        output.annotations.prediction.object_count()
    );
    let request = target
        .commit_request(task)
        .with_content(output.metadatas, output.annotations);
    let commit = repo.save_and_commit(request)?;
    Ok(CommandOutcome::committed(commit, target.task_id.clone(), summary))
}

struct ExecOutput {
    metadatas: Metadatas,
    annotations: Annotations,
    model: Option<ModelMeta>,
}

#[allow(clippy::too_many_arguments)]
fn execute(
    repo: &MirRepo,
    req: &ExecRequest,
    target: &TaskTarget,
    source: &Snapshot,
    labels: &LabelSpace,
    workdir: &WorkDir,
    executor: &dyn Executor,
    progress: &dyn ProgressReporter,
) -> Result<ExecOutput, MirError> {
    let class_names = source
        .annotations
        .ground_truth
        .class_ids()
        .into_iter()
        .map(|id| labels.display_name(id))
        .collect();
    let config = ExecConfig {
        kind: req.kind,
        task_id: target.task_id.to_string(),
        class_names,
        executor_config: req.executor_config.clone(),
    };

    progress.update("executor", 0, 3);
    workdir.prepare(repo.assets(), &source.metadatas, &config)?;
    progress.update("executor", 1, 3);
    executor.run(workdir)?;
    progress.update("executor", 2, 3);
    let result = workdir.read_result()?;
    progress.finish("executor");

    let mut output = ExecOutput {
        metadatas: source.metadatas.clone(),
        annotations: source.annotations.clone(),
        model: result.model.clone(),
    };
    match req.kind {
        ExecKind::Training => {
            if output.model.is_none() {
                return Err(MirError::Executor {
                    exit_code: None,
                    message: "training result carries no model".to_string(),
                });
            }
        }
        ExecKind::Mining { topk } => {
            let keep = select_topk(&result, &output.metadatas, topk);
            tracing::debug!(scored = result.scores.len(), kept = keep.len(), "mining result");
            output.metadatas.attributes.retain(|asset_id, _| keep.contains(asset_id));
            output.annotations.retain_assets(|asset_id| keep.contains(asset_id));
        }
        ExecKind::Infer => {
            let mut prediction =
                predictions_from(result, &output.metadatas, labels, &target.task_id);
            prediction.executor_config =
                serde_json::to_string(&req.executor_config).unwrap_or_default();
            output.annotations.prediction = prediction;
        }
    }
    Ok(output)
}

/// Assets of `metadatas` with the `topk` highest scores, ties by asset id.
fn select_topk(result: &ExecResult, metadatas: &Metadatas, topk: Option<usize>) -> BTreeSet<AssetId> {
    let mut scored: Vec<(AssetId, f64)> = result
        .scores
        .iter()
        .map(|(id, score)| (AssetId::new(id.as_str()), *score))
        .filter(|(id, score)| metadatas.contains(id) && score.is_finite())
        .collect();
    scored.sort_by(|(a_id, a), (b_id, b)| {
        b.partial_cmp(a).unwrap_or(Ordering::Equal).then_with(|| a_id.cmp(b_id))
    });
    let limit = topk.unwrap_or(scored.len());
    scored.into_iter().take(limit).map(|(id, _)| id).collect()
}

fn predictions_from(
    result: ExecResult,
    metadatas: &Metadatas,
    labels: &LabelSpace,
    task_id: &TaskId,
) -> AnnotationSet {
    let mut set = AnnotationSet {
        task_id: task_id.clone(),
        model: result.model,
        ..Default::default()
    };
    let mut unknown: BTreeSet<String> = BTreeSet::new();
    for (asset_id, objects) in result.predictions {
        let asset_id = AssetId::new(asset_id);
        if !metadatas.contains(&asset_id) {
            tracing::warn!(asset = %asset_id, "prediction for an asset outside the input");
            continue;
        }
        let mut converted = Vec::with_capacity(objects.len());
        for object in objects {
            let Some(class_id) = labels.id_of(&object.class_name) else {
                unknown.insert(object.class_name);
                continue;
            };
            let Some(geometry) = object.geometry() else {
                continue;
            };
            converted.push(ObjectAnnotation {
                index: converted.len() as u32,
                class_id,
                geometry,
                score: object.score.unwrap_or(1.0),
                anno_quality: object.anno_quality,
                tags: object.tags,
                cm: Default::default(),
                det_link_id: None,
            });
        }
        if !converted.is_empty() {
            set.image_annotations.insert(asset_id, converted);
        }
    }
    if !unknown.is_empty() {
        tracing::warn!(names = ?unknown, "dropped predictions of unknown classes");
    }
    set
}
