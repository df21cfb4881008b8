//! Annotation collections: per-channel mappings from asset to objects.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::geometry::{BBox, Geometry};
use super::ids::{AssetId, ClassId, TaskId};
use super::task::ModelMeta;

/// Tag key marking a ground-truth object as a crowd region.
pub const CROWD_TAG: &str = "iscrowd";

/// Per-object outcome recorded by evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionMatrixType {
    #[default]
    NotSet,
    /// Prediction matched a ground-truth object.
    Tp,
    /// Prediction matched nothing.
    Fp,
    /// Ground truth no prediction claimed.
    Fn,
    Tn,
    Unknown,
    /// Ground truth claimed by a prediction.
    Mtp,
    /// Below the confidence threshold, or matched against a crowd region.
    Ignored,
}

impl fmt::Display for ConfusionMatrixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfusionMatrixType::NotSet => "not_set",
            ConfusionMatrixType::Tp => "tp",
            ConfusionMatrixType::Fp => "fp",
            ConfusionMatrixType::Fn => "fn",
            ConfusionMatrixType::Tn => "tn",
            ConfusionMatrixType::Unknown => "unknown",
            ConfusionMatrixType::Mtp => "mtp",
            ConfusionMatrixType::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// One annotated object within an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    /// Position within the image; dense from 0 and unique per image.
    pub index: u32,
    pub class_id: ClassId,
    pub geometry: Geometry,
    /// Confidence score. Ground truth objects conventionally carry 1.0.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anno_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub cm: ConfusionMatrixType,
    /// Index of the matched object in the other channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub det_link_id: Option<u32>,
}

impl ObjectAnnotation {
    /// Creates a box annotation with score 1.0.
    pub fn new(index: u32, class_id: impl Into<ClassId>, bbox: BBox) -> Self {
        Self {
            index,
            class_id: class_id.into(),
            geometry: Geometry::Box(bbox),
            score: 1.0,
            anno_quality: None,
            tags: BTreeMap::new(),
            cm: ConfusionMatrixType::NotSet,
            det_link_id: None,
        }
    }

    /// Sets the confidence score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Bounding box of the geometry.
    pub fn bbox(&self) -> BBox {
        self.geometry.bounding_box()
    }

    /// Returns true if the object is tagged as a crowd region.
    pub fn is_crowd(&self) -> bool {
        self.tags
            .get(CROWD_TAG)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

/// Which of the two annotation channels a set belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Prediction,
    GroundTruth,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Prediction => f.write_str("prediction"),
            Channel::GroundTruth => f.write_str("ground_truth"),
        }
    }
}

/// The annotations of one channel, plus the provenance of that channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub image_annotations: BTreeMap<AssetId, Vec<ObjectAnnotation>>,
    /// Task that produced these annotations.
    #[serde(default)]
    pub task_id: TaskId,
    #[serde(default)]
    pub eval_class_ids: Vec<ClassId>,
    /// Model the annotations came from, if any.
    #[serde(default)]
    pub model: Option<ModelMeta>,
    #[serde(default)]
    pub executor_config: String,
}

impl AnnotationSet {
    /// Total number of objects over all assets.
    pub fn object_count(&self) -> usize {
        self.image_annotations.values().map(Vec::len).sum()
    }

    /// Returns true if no asset carries any object.
    pub fn is_empty(&self) -> bool {
        self.object_count() == 0
    }

    /// Objects of one asset, empty if the asset has none.
    pub fn objects(&self, asset_id: &AssetId) -> &[ObjectAnnotation] {
        self.image_annotations
            .get(asset_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Class ids present on one asset.
    pub fn class_ids_of(&self, asset_id: &AssetId) -> BTreeSet<ClassId> {
        self.objects(asset_id).iter().map(|o| o.class_id).collect()
    }

    /// Class ids present anywhere in the set.
    pub fn class_ids(&self) -> BTreeSet<ClassId> {
        self.image_annotations
            .values()
            .flatten()
            .map(|o| o.class_id)
            .collect()
    }

    /// Keeps only assets for which `keep` returns true.
    pub fn retain_assets(&mut self, mut keep: impl FnMut(&AssetId) -> bool) {
        self.image_annotations.retain(|asset_id, _| keep(asset_id));
    }

    /// Renumbers object indices so they are dense from 0 in list order.
    pub fn reindex(&mut self) {
        for objects in self.image_annotations.values_mut() {
            for (i, object) in objects.iter_mut().enumerate() {
                object.index = i as u32;
            }
        }
    }

    /// Drops all evaluation results (cm tags and links).
    pub fn clear_confusion(&mut self) {
        for object in self.image_annotations.values_mut().flatten() {
            object.cm = ConfusionMatrixType::NotSet;
            object.det_link_id = None;
        }
    }
}

/// Both annotation channels of a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub prediction: AnnotationSet,
    pub ground_truth: AnnotationSet,
}

impl Annotations {
    /// Returns the set of one channel.
    pub fn channel(&self, channel: Channel) -> &AnnotationSet {
        match channel {
            Channel::Prediction => &self.prediction,
            Channel::GroundTruth => &self.ground_truth,
        }
    }

    /// Class ids of an asset over both channels.
    pub fn class_ids_of(&self, asset_id: &AssetId) -> BTreeSet<ClassId> {
        let mut ids = self.prediction.class_ids_of(asset_id);
        ids.extend(self.ground_truth.class_ids_of(asset_id));
        ids
    }

    /// Keeps only assets for which `keep` returns true, in both channels.
    pub fn retain_assets(&mut self, mut keep: impl FnMut(&AssetId) -> bool) {
        self.prediction.retain_assets(&mut keep);
        self.ground_truth.retain_assets(&mut keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(asset: &str, classes: &[i32]) -> AnnotationSet {
        let objects = classes
            .iter()
            .enumerate()
            .map(|(i, c)| ObjectAnnotation::new(i as u32, *c, BBox::from_xyxy(0.0, 0.0, 1.0, 1.0)))
            .collect();
        let mut set = AnnotationSet::default();
        set.image_annotations.insert(AssetId::new(asset), objects);
        set
    }

    #[test]
    fn test_class_ids_union_over_channels() {
        let annotations = Annotations {
            prediction: set_with("a", &[1, 2]),
            ground_truth: set_with("a", &[3]),
        };
        let ids: Vec<i32> = annotations
            .class_ids_of(&AssetId::new("a"))
            .into_iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_reindex_makes_indices_dense() {
        let mut set = set_with("a", &[1, 1, 1]);
        for object in set.image_annotations.values_mut().flatten() {
            object.index = 7;
        }
        set.reindex();
        let indices: Vec<u32> = set.objects(&AssetId::new("a")).iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_crowd_tag() {
        let object = ObjectAnnotation::new(0, 1, BBox::default()).with_tag(CROWD_TAG, "1");
        assert!(object.is_crowd());
        assert!(!ObjectAnnotation::new(0, 1, BBox::default()).is_crowd());
    }
}
