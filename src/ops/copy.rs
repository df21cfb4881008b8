//! Copy engine: remaps a foreign snapshot onto the local label space.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::MirError;
use crate::labels::LabelSpace;
use crate::model::{AnnotationSet, Annotations, ClassId, Metadatas};

/// Handling of class names the local label space does not know.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypesStrategy {
    /// Fail with [`MirError::UnknownClassTypes`].
    #[default]
    Stop,
    /// Drop objects of unknown classes.
    Ignore,
    /// Add the names to the local label space first.
    ///
    /// The engine expects the caller to have extended the label space with
    /// [`unknown_class_names`]; names still unknown fail as with `Stop`.
    Add,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyOptions {
    #[serde(default)]
    pub unknown_types: UnknownTypesStrategy,
    /// Copy asset metadata only.
    #[serde(default)]
    pub drop_annotations: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CopyOutput {
    pub metadatas: Metadatas,
    pub annotations: Annotations,
    /// Foreign class names missing from the local label space, sorted.
    pub unknown_names: Vec<String>,
    pub dropped_objects: usize,
}

/// Foreign class names used by `annotations` that `local` cannot resolve.
pub fn unknown_class_names(
    annotations: &Annotations,
    foreign: &LabelSpace,
    local: &LabelSpace,
) -> Vec<String> {
    let used: BTreeSet<ClassId> = [&annotations.prediction, &annotations.ground_truth]
        .into_iter()
        .flat_map(|set| set.class_ids().into_iter().chain(set.eval_class_ids.iter().copied()))
        .collect();
    let names: BTreeSet<String> = used
        .into_iter()
        .map(|id| foreign.display_name(id))
        .filter(|name| local.id_of(name).is_none())
        .collect();
    names.into_iter().collect()
}

/// Remaps `annotations` from `foreign` class ids to `local` ones by name.
///
/// # Errors
/// [`MirError::UnknownClassTypes`] when names are unknown and the strategy
/// is not `Ignore`.
pub fn copy_snapshot(
    metadatas: &Metadatas,
    annotations: &Annotations,
    foreign: &LabelSpace,
    local: &LabelSpace,
    opts: &CopyOptions,
) -> Result<CopyOutput, MirError> {
    let mut out = CopyOutput {
        metadatas: metadatas.clone(),
        ..Default::default()
    };
    if opts.drop_annotations {
        return Ok(out);
    }

    out.unknown_names = unknown_class_names(annotations, foreign, local);
    if !out.unknown_names.is_empty() && opts.unknown_types != UnknownTypesStrategy::Ignore {
        return Err(MirError::UnknownClassTypes {
            names: out.unknown_names,
        });
    }

    let mapping: BTreeMap<ClassId, ClassId> = [&annotations.prediction, &annotations.ground_truth]
        .into_iter()
        .flat_map(|set| set.class_ids().into_iter().chain(set.eval_class_ids.iter().copied()))
        .filter_map(|id| local.id_of(&foreign.display_name(id)).map(|local_id| (id, local_id)))
        .collect();

    let (prediction, pred_changed) =
        remap_set(&annotations.prediction, &mapping, &mut out.dropped_objects);
    let (ground_truth, gt_changed) =
        remap_set(&annotations.ground_truth, &mapping, &mut out.dropped_objects);
    out.annotations.prediction = prediction;
    out.annotations.ground_truth = ground_truth;
    if pred_changed || gt_changed {
        // Links of either channel index into the other one, which was renumbered.
        out.annotations.prediction.clear_confusion();
        out.annotations.ground_truth.clear_confusion();
    }

    if !out.unknown_names.is_empty() {
        tracing::warn!(
            names = ?out.unknown_names,
            dropped = out.dropped_objects,
            "ignoring objects of unknown classes"
        );
    }
    Ok(out)
}

/// Returns the remapped set and whether any object was dropped.
fn remap_set(
    set: &AnnotationSet,
    mapping: &BTreeMap<ClassId, ClassId>,
    dropped: &mut usize,
) -> (AnnotationSet, bool) {
    let mut out = set.clone();
    let mut changed = false;
    for objects in out.image_annotations.values_mut() {
        let before = objects.len();
        objects.retain_mut(|object| match mapping.get(&object.class_id) {
            Some(local) => {
                object.class_id = *local;
                true
            }
            None => false,
        });
        if objects.len() != before {
            *dropped += before - objects.len();
            changed = true;
        }
    }
    out.image_annotations.retain(|_, objects| !objects.is_empty());
    out.eval_class_ids = set
        .eval_class_ids
        .iter()
        .filter_map(|id| mapping.get(id).copied())
        .collect();
    if changed {
        out.reindex();
    }
    (out, changed)
}
