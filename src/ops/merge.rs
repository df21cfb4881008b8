//! Merge engine: combines a host snapshot with guests and subtracts excludes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::MirError;
use crate::model::{
    AnnotationSet, Annotations, AssetId, Metadatas, ObjectAnnotation, Snapshot, TaskId, TvtType,
};

/// What to do with an asset present in both the merged result and a guest.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Abort the merge.
    #[default]
    Stop,
    /// Keep what is already there.
    Host,
    /// Replace metadata and annotations with the guest's.
    Guest,
}

/// One merge input with its optional split override.
#[derive(Clone, Debug)]
pub struct MergeSource {
    pub metadatas: Metadatas,
    pub annotations: Annotations,
    pub head_task_id: TaskId,
    pub tvt_type: Option<TvtType>,
}

impl MergeSource {
    pub fn new(snapshot: Snapshot, tvt_type: Option<TvtType>) -> Self {
        let head_task_id = snapshot.tasks.head_task_id;
        Self {
            metadatas: snapshot.metadatas,
            annotations: snapshot.annotations,
            head_task_id,
            tvt_type,
        }
    }

    fn stamp_split(&mut self) {
        if let Some(tvt) = self.tvt_type {
            for meta in self.metadatas.attributes.values_mut() {
                meta.tvt_type = tvt;
            }
        }
    }
}

/// Merged collections plus counts for logging and reports.
#[derive(Clone, Debug, Default)]
pub struct MergeOutput {
    pub metadatas: Metadatas,
    pub annotations: Annotations,
    /// Head task of the host; ancestor of the merge task.
    pub ancestor_task_id: TaskId,
    pub added: usize,
    pub conflicts: usize,
    pub excluded: usize,
}

/// Merges `guests` into `host` in order, then removes every asset found in
/// `excludes`.
///
/// # Errors
/// [`MirError::MergeConflict`] on the first shared asset under
/// [`MergeStrategy::Stop`].
pub fn merge_snapshots(
    mut host: MergeSource,
    guests: Vec<MergeSource>,
    excludes: &[BTreeSet<AssetId>],
    strategy: MergeStrategy,
) -> Result<MergeOutput, MirError> {
    host.stamp_split();
    let mut out = MergeOutput {
        ancestor_task_id: host.head_task_id.clone(),
        metadatas: host.metadatas,
        annotations: host.annotations,
        ..Default::default()
    };

    for mut guest in guests {
        guest.stamp_split();
        merge_guest(&mut out, guest, strategy)?;
    }

    let excluded: BTreeSet<&AssetId> = excludes.iter().flatten().collect();
    let before = out.metadatas.len();
    out.metadatas
        .attributes
        .retain(|asset_id, _| !excluded.contains(asset_id));
    out.annotations.retain_assets(|asset_id| !excluded.contains(asset_id));
    out.excluded = before - out.metadatas.len();

    tracing::debug!(
        assets = out.metadatas.len(),
        added = out.added,
        conflicts = out.conflicts,
        excluded = out.excluded,
        "merged"
    );
    Ok(out)
}

fn merge_guest(
    out: &mut MergeOutput,
    guest: MergeSource,
    strategy: MergeStrategy,
) -> Result<(), MirError> {
    let MergeSource {
        metadatas,
        annotations: mut guest_annotations,
        ..
    } = guest;
    let mut contributed_predictions = false;

    for (asset_id, meta) in metadatas.attributes {
        let shared = out.metadatas.contains(&asset_id);
        if shared {
            out.conflicts += 1;
            match strategy {
                MergeStrategy::Stop => {
                    return Err(MirError::MergeConflict {
                        asset_id: asset_id.to_string(),
                    })
                }
                MergeStrategy::Host => continue,
                MergeStrategy::Guest => {}
            }
        } else {
            out.added += 1;
        }

        let pred = take_objects(&mut guest_annotations.prediction, &asset_id);
        let gt = take_objects(&mut guest_annotations.ground_truth, &asset_id);
        contributed_predictions |= pred.is_some();
        replace_objects(&mut out.annotations.prediction, &asset_id, pred);
        replace_objects(&mut out.annotations.ground_truth, &asset_id, gt);
        out.metadatas.attributes.insert(asset_id, meta);
    }

    if contributed_predictions {
        adopt_provenance(&mut out.annotations.prediction, &guest_annotations.prediction);
    }
    Ok(())
}

fn take_objects(
    set: &mut AnnotationSet,
    asset_id: &AssetId,
) -> Option<Vec<ObjectAnnotation>> {
    set.image_annotations
        .remove(asset_id)
        .filter(|objects| !objects.is_empty())
}

fn replace_objects(
    set: &mut AnnotationSet,
    asset_id: &AssetId,
    objects: Option<Vec<ObjectAnnotation>>,
) {
    match objects {
        Some(objects) => {
            set.image_annotations.insert(asset_id.clone(), objects);
        }
        None => {
            set.image_annotations.remove(asset_id);
        }
    }
}

/// The merged prediction channel keeps one provenance. A guest from a
/// different upstream task invalidates the model and executor settings.
fn adopt_provenance(merged: &mut AnnotationSet, guest: &AnnotationSet) {
    if merged.task_id.is_empty() {
        merged.task_id = guest.task_id.clone();
        merged.model = guest.model.clone();
        merged.executor_config = guest.executor_config.clone();
        merged.eval_class_ids = guest.eval_class_ids.clone();
    } else if merged.task_id != guest.task_id {
        merged.model = None;
        merged.executor_config.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetMeta, AssetType, BBox, ModelMeta, Task, TaskType, Tasks};

    fn source(assets: &[(&str, i32)], task: &str) -> MergeSource {
        let mut snapshot = Snapshot::default();
        for (name, class) in assets {
            let id = AssetId::new(*name);
            snapshot
                .metadatas
                .attributes
                .insert(id.clone(), AssetMeta::new(AssetType::ImageJpeg, 10, 10));
            let object = ObjectAnnotation::new(0, *class, BBox::from_xyxy(0.0, 0.0, 5.0, 5.0));
            snapshot
                .annotations
                .ground_truth
                .image_annotations
                .insert(id.clone(), vec![object.clone()]);
            snapshot
                .annotations
                .prediction
                .image_annotations
                .insert(id, vec![object.with_score(0.7)]);
        }
        snapshot.annotations.prediction.task_id = TaskId::new(task);
        snapshot.annotations.prediction.model = Some(ModelMeta {
            model_hash: format!("model-{task}"),
            ..Default::default()
        });
        snapshot.tasks = Tasks::with_head(Task::new(TaskType::Import, task));
        MergeSource::new(snapshot, None)
    }

    fn gt_class(out: &MergeOutput, asset: &str) -> i32 {
        out.annotations.ground_truth.objects(&AssetId::new(asset))[0].class_id.0
    }

    #[test]
    fn test_guest_only_assets_added() {
        let out = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("b", 2)], "g")],
            &[],
            MergeStrategy::Stop,
        )
        .expect("merge");
        assert_eq!(out.metadatas.len(), 2);
        assert_eq!(out.added, 1);
        assert_eq!(gt_class(&out, "b"), 2);
        assert_eq!(out.ancestor_task_id, TaskId::new("h"));
    }

    #[test]
    fn test_stop_on_conflict() {
        let err = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("a", 2)], "g")],
            &[],
            MergeStrategy::Stop,
        )
        .expect_err("conflict");
        assert!(matches!(err, MirError::MergeConflict { ref asset_id } if asset_id == "a"));
    }

    #[test]
    fn test_host_and_guest_priority() {
        let host = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("a", 2)], "g")],
            &[],
            MergeStrategy::Host,
        )
        .expect("merge");
        assert_eq!(gt_class(&host, "a"), 1);
        assert_eq!(host.conflicts, 1);

        let guest = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("a", 2)], "g")],
            &[],
            MergeStrategy::Guest,
        )
        .expect("merge");
        assert_eq!(gt_class(&guest, "a"), 2);
    }

    #[test]
    fn test_split_override_and_excludes() {
        let mut host = source(&[("a", 1), ("b", 1)], "h");
        host.tvt_type = Some(TvtType::Training);
        let mut guest = source(&[("c", 1)], "g");
        guest.tvt_type = Some(TvtType::Validation);
        let exclude: BTreeSet<AssetId> = [AssetId::new("b")].into_iter().collect();

        let out = merge_snapshots(host, vec![guest], &[exclude], MergeStrategy::Stop)
            .expect("merge");
        let tvt = |a: &str| out.metadatas.attributes[&AssetId::new(a)].tvt_type;
        assert_eq!(tvt("a"), TvtType::Training);
        assert_eq!(tvt("c"), TvtType::Validation);
        assert!(!out.metadatas.contains(&AssetId::new("b")));
        assert!(out.annotations.ground_truth.objects(&AssetId::new("b")).is_empty());
        assert_eq!(out.excluded, 1);
    }

    #[test]
    fn test_foreign_predictions_drop_model() {
        let out = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("b", 1)], "g")],
            &[],
            MergeStrategy::Stop,
        )
        .expect("merge");
        assert!(out.annotations.prediction.model.is_none());
        assert_eq!(out.annotations.prediction.task_id, TaskId::new("h"));

        let same = merge_snapshots(
            source(&[("a", 1)], "h"),
            vec![source(&[("b", 1)], "h")],
            &[],
            MergeStrategy::Stop,
        )
        .expect("merge");
        assert!(same.annotations.prediction.model.is_some());
    }
}
