//! Snapshot semantic diffing.

mod report;

pub use report::{DiffAnnotationCounts, DiffCounts, DiffDetail, DiffReport, ModifiedAnnotation};

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AnnotationSet, AssetId, BBox, Channel, ClassId, ObjectAnnotation, Snapshot};

/// Object matching strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MatchBy {
    /// Match objects by index within shared assets.
    #[default]
    Index,
    /// Match objects greedily by IoU within shared asset + class.
    Iou,
}

/// Diff options.
#[derive(Clone, Debug)]
pub struct DiffOptions {
    pub match_by: MatchBy,
    pub iou_threshold: f64,
    pub detail: bool,
    pub max_items: usize,
    pub bbox_eps: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            match_by: MatchBy::Index,
            iou_threshold: 0.5,
            detail: false,
            max_items: 20,
            bbox_eps: 1e-6,
        }
    }
}

/// Computes a semantic diff between two snapshots.
pub fn diff_snapshots(a: &Snapshot, b: &Snapshot, opts: &DiffOptions) -> DiffReport {
    let ids_a = a.asset_ids();
    let ids_b = b.asset_ids();

    let shared: Vec<&AssetId> = ids_a.intersection(&ids_b).collect();
    let only_in_a: Vec<&AssetId> = ids_a.difference(&ids_b).collect();
    let only_in_b: Vec<&AssetId> = ids_b.difference(&ids_a).collect();

    let mut report = DiffReport {
        assets: DiffCounts {
            shared: shared.len(),
            only_in_a: only_in_a.len(),
            only_in_b: only_in_b.len(),
        },
        ..Default::default()
    };

    let mut detail = opts.detail.then(|| DiffDetail {
        assets_only_in_a: only_in_a.iter().map(ToString::to_string).collect(),
        assets_only_in_b: only_in_b.iter().map(ToString::to_string).collect(),
        modified_annotations: Vec::new(),
        max_items: opts.max_items,
    });

    for channel in [Channel::GroundTruth, Channel::Prediction] {
        let set_a = a.annotations.channel(channel);
        let set_b = b.annotations.channel(channel);
        let mut counts = DiffAnnotationCounts::default();

        for asset_id in &shared {
            let list_a = set_a.objects(asset_id);
            let list_b = set_b.objects(asset_id);
            match opts.match_by {
                MatchBy::Index => diff_objects_by_index(
                    channel,
                    asset_id,
                    list_a,
                    list_b,
                    &mut counts,
                    detail.as_mut(),
                    opts,
                ),
                MatchBy::Iou => diff_objects_by_iou(list_a, list_b, &mut counts, opts),
            }
        }
        counts.only_in_a += object_count(set_a, &only_in_a);
        counts.only_in_b += object_count(set_b, &only_in_b);
        *report.channel_mut(channel) = counts;
    }

    report.detail = detail;
    report
}

fn object_count(set: &AnnotationSet, asset_ids: &[&AssetId]) -> usize {
    asset_ids.iter().map(|id| set.objects(id).len()).sum()
}

fn bbox_eq_eps(a: &BBox, b: &BBox, eps: f64) -> bool {
    (a.xmin - b.xmin).abs() <= eps
        && (a.ymin - b.ymin).abs() <= eps
        && (a.xmax - b.xmax).abs() <= eps
        && (a.ymax - b.ymax).abs() <= eps
}

fn diff_objects_by_index(
    channel: Channel,
    asset_id: &AssetId,
    list_a: &[ObjectAnnotation],
    list_b: &[ObjectAnnotation],
    counts: &mut DiffAnnotationCounts,
    mut detail: Option<&mut DiffDetail>,
    opts: &DiffOptions,
) {
    let map_a: BTreeMap<u32, &ObjectAnnotation> = list_a.iter().map(|o| (o.index, o)).collect();
    let map_b: BTreeMap<u32, &ObjectAnnotation> = list_b.iter().map(|o| (o.index, o)).collect();

    for (index, object_a) in &map_a {
        let Some(object_b) = map_b.get(index) else {
            counts.only_in_a += 1;
            continue;
        };
        counts.shared += 1;

        let mut reasons: Vec<&str> = Vec::new();
        if object_a.class_id != object_b.class_id {
            reasons.push("class changed");
        }
        if !bbox_eq_eps(&object_a.bbox(), &object_b.bbox(), opts.bbox_eps) {
            reasons.push("box changed");
        }
        if (object_a.score - object_b.score).abs() > opts.bbox_eps {
            reasons.push("score changed");
        }
        if object_a.tags != object_b.tags {
            reasons.push("tags changed");
        }

        if !reasons.is_empty() {
            counts.modified += 1;
            if let Some(detail) = detail.as_deref_mut() {
                if detail.modified_annotations.len() < opts.max_items {
                    detail.modified_annotations.push(ModifiedAnnotation {
                        channel,
                        asset_id: asset_id.to_string(),
                        index: *index,
                        reason: reasons.join(", "),
                    });
                }
            }
        }
    }
    counts.only_in_b += map_b.keys().filter(|i| !map_a.contains_key(i)).count();
}

fn diff_objects_by_iou(
    list_a: &[ObjectAnnotation],
    list_b: &[ObjectAnnotation],
    counts: &mut DiffAnnotationCounts,
    opts: &DiffOptions,
) {
    let mut grouped_a: BTreeMap<ClassId, Vec<&ObjectAnnotation>> = BTreeMap::new();
    let mut grouped_b: BTreeMap<ClassId, Vec<&ObjectAnnotation>> = BTreeMap::new();
    for object in list_a {
        grouped_a.entry(object.class_id).or_default().push(object);
    }
    for object in list_b {
        grouped_b.entry(object.class_id).or_default().push(object);
    }

    let classes: BTreeSet<ClassId> = grouped_a.keys().chain(grouped_b.keys()).copied().collect();
    for class_id in classes {
        let group_a = grouped_a.remove(&class_id).unwrap_or_default();
        let group_b = grouped_b.remove(&class_id).unwrap_or_default();
        let mut used_b = vec![false; group_b.len()];

        for object_a in &group_a {
            let box_a = object_a.bbox();
            let best = group_b
                .iter()
                .enumerate()
                .filter(|(idx, _)| !used_b[*idx])
                .map(|(idx, object_b)| (idx, box_a.iou(&object_b.bbox())))
                .fold(None, |best: Option<(usize, f64)>, (idx, iou)| match best {
                    Some((_, best_iou)) if best_iou >= iou => best,
                    _ => Some((idx, iou)),
                });

            match best {
                Some((idx, iou)) if iou >= opts.iou_threshold => {
                    used_b[idx] = true;
                    counts.shared += 1;
                }
                _ => counts.only_in_a += 1,
            }
        }
        counts.only_in_b += used_b.iter().filter(|matched| !**matched).count();
    }
}
