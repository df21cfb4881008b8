use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{head_task_id, open_repo, record_failure, CommandOutcome, TaskTarget};
use crate::assets::{collect_media_files, probe_asset};
use crate::error::MirError;
use crate::labels::LabelSpace;
use crate::model::io_json::{read_annotation_json, NamedAnnotations};
use crate::model::{
    AnnotationSet, Annotations, AssetId, Metadatas, ObjectAnnotation, TaskId, TaskType, TvtType,
};
use crate::ops::UnknownTypesStrategy;
use crate::progress::ProgressReporter;
use crate::storage::{MirRepo, RevTid};

/// Imports a media directory and optional annotation files.
#[derive(Clone, Debug, Serialize)]
pub struct ImportRequest {
    pub root: PathBuf,
    pub media_dir: PathBuf,
    /// Prediction annotation JSON, keyed by media file name.
    pub pred_file: Option<PathBuf>,
    /// Ground-truth annotation JSON, keyed by media file name.
    pub gt_file: Option<PathBuf>,
    pub dst_branch: String,
    /// Branch the new branch starts from.
    pub src_rev: Option<RevTid>,
    /// Split stamped onto every imported asset.
    pub tvt_type: Option<TvtType>,
    pub dataset_name: Option<String>,
    pub unknown_types: UnknownTypesStrategy,
    pub task_id: Option<TaskId>,
}

pub(super) fn run(
    req: ImportRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let repo = open_repo(&req.root)?;
    let target = TaskTarget::new(
        req.dst_branch.clone(),
        req.src_rev.clone(),
        TaskType::Import,
        req.task_id.clone(),
    );

    // Argument problems surface before anything is stored.
    let pred = req.pred_file.as_deref().map(read_annotation_json).transpose()?;
    let gt = req.gt_file.as_deref().map(read_annotation_json).transpose()?;
    let mut labels = repo.labels()?;
    let added = resolve_unknown_names(&mut labels, [&pred, &gt], req.unknown_types)?;

    let result = import(&repo, &req, &target, &labels, pred, gt, progress);
    let (metadatas, annotations) = record_failure(&repo, &target, result)?;

    let mut task = target.task().with_parameters(&req);
    let labels_extended = !added.is_empty();
    task.new_types_added = added;
    if let Some(ancestor) = &req.src_rev {
        task = task.with_ancestor(head_task_id(&repo, ancestor)?);
    }

    let assets = metadatas.len();
    let objects = annotations.ground_truth.object_count() + annotations.prediction.object_count();
    let mut request = target.commit_request(task);
    request.metadatas = Some(metadatas);
    request.annotations = Some(annotations);
    let commit = if !labels_extended {
        repo.save_and_commit(request)?
    } else {
        repo.save_and_commit_with_labels(request, &labels)?
    };
    Ok(CommandOutcome::committed(
        commit,
        target.task_id.clone(),
        format!(
            "imported {assets} asset(s) and {objects} object(s) into {}@{}",
            target.branch, target.task_id
        ),
    ))
}

/// Applies the unknown-name strategy; returns the names added to `labels`.
fn resolve_unknown_names(
    labels: &mut LabelSpace,
    files: [&Option<NamedAnnotations>; 2],
    strategy: UnknownTypesStrategy,
) -> Result<Vec<String>, MirError> {
    let names: BTreeSet<&str> = files
        .into_iter()
        .flatten()
        .flat_map(|file| file.values().flatten())
        .map(|object| object.class_name.trim())
        .collect();
    let unknown: Vec<String> = names
        .into_iter()
        .filter(|name| labels.id_of(name).is_none())
        .map(str::to_string)
        .collect();
    if unknown.is_empty() {
        return Ok(unknown);
    }
    match strategy {
        UnknownTypesStrategy::Stop => Err(MirError::UnknownClassTypes { names: unknown }),
        UnknownTypesStrategy::Ignore => {
            tracing::warn!(names = ?unknown, "ignoring objects of unknown classes");
            Ok(Vec::new())
        }
        UnknownTypesStrategy::Add => {
            labels.add_names(&unknown);
            Ok(unknown)
        }
    }
}

fn import(
    repo: &MirRepo,
    req: &ImportRequest,
    target: &TaskTarget,
    labels: &LabelSpace,
    pred: Option<NamedAnnotations>,
    gt: Option<NamedAnnotations>,
    progress: &dyn ProgressReporter,
) -> Result<(Metadatas, Annotations), MirError> {
    let files = collect_media_files(&req.media_dir)?;
    if files.is_empty() {
        return Err(MirError::MediaDirectory {
            path: req.media_dir.clone(),
            message: "no media files found".to_string(),
        });
    }

    let now = chrono::Utc::now().timestamp();
    let mut metadatas = Metadatas::default();
    let mut by_name: BTreeMap<String, AssetId> = BTreeMap::new();
    let total = files.len() as u64;
    for (done, path) in files.iter().enumerate() {
        let bytes = fs::read(path)?;
        let asset_id = repo.assets().put(&bytes)?;
        let mut meta = probe_asset(path, &bytes);
        meta.timestamp = now;
        if let Some(tvt) = req.tvt_type {
            meta.tvt_type = tvt;
        }
        if let Some(name) = &req.dataset_name {
            meta.dataset_name = name.clone();
        }
        by_name.insert(relative_name(&req.media_dir, path), asset_id.clone());
        by_name.entry(meta.origin_name.clone()).or_insert_with(|| asset_id.clone());
        metadatas.attributes.insert(asset_id, meta);
        progress.update("store assets", done as u64 + 1, total);
    }
    progress.finish("store assets");

    let mut annotations = Annotations::default();
    if let Some(pred) = pred {
        annotations.prediction = to_annotation_set(pred, &by_name, labels, &target.task_id);
    }
    if let Some(gt) = gt {
        annotations.ground_truth = to_annotation_set(gt, &by_name, labels, &target.task_id);
    }
    Ok((metadatas, annotations))
}

fn relative_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn to_annotation_set(
    file: NamedAnnotations,
    by_name: &BTreeMap<String, AssetId>,
    labels: &LabelSpace,
    task_id: &TaskId,
) -> AnnotationSet {
    let mut set = AnnotationSet {
        task_id: task_id.clone(),
        ..Default::default()
    };
    let mut skipped = 0usize;
    for (file_name, objects) in file {
        let Some(asset_id) = by_name.get(&file_name) else {
            tracing::warn!(file = %file_name, "annotations for a file that was not imported");
            skipped += objects.len();
            continue;
        };
        let mut converted = Vec::with_capacity(objects.len());
        for object in objects {
            let (Some(class_id), Some(geometry)) = (labels.id_of(&object.class_name), object.geometry())
            else {
                skipped += 1;
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
            set.image_annotations
                .entry(asset_id.clone())
                .or_default()
                .extend(converted);
        }
    }
    set.reindex();
    if skipped > 0 {
        tracing::warn!(skipped, "skipped objects without a known class or geometry");
    }
    set
}
