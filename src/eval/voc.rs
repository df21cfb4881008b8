//! Single-IoU VOC-style evaluation.
//!
//! One global confidence-sorted pass per class: each prediction is compared
//! with the ground truth object of its asset that overlaps it most, claimed
//! or not. Integration uses the same recall grid as the COCO variant.

use std::collections::{BTreeMap, BTreeSet};

use super::coco::{accumulate, average_classes, Detection};
use super::report::SingleIouEvaluation;
use crate::model::{AssetId, ClassId, ObjectAnnotation};

pub(crate) fn evaluate_single_iou(
    preds: &BTreeMap<AssetId, Vec<ObjectAnnotation>>,
    gts: &BTreeMap<AssetId, Vec<ObjectAnnotation>>,
    asset_ids: &BTreeSet<AssetId>,
    class_ids: &[ClassId],
    conf_thr: f64,
    iou_thr: f64,
    need_pr_curve: bool,
) -> SingleIouEvaluation {
    let ci_evaluations: BTreeMap<ClassId, _> = class_ids
        .iter()
        .map(|&class_id| {
            let mut candidates: Vec<(&AssetId, &ObjectAnnotation)> = asset_ids
                .iter()
                .flat_map(move |asset_id| {
                    preds
                        .get(asset_id)
                        .into_iter()
                        .flatten()
                        .filter(move |o| o.class_id == class_id && o.score >= conf_thr)
                        .map(move |o| (asset_id, o))
                })
                .collect();
            candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

            let mut claimed: BTreeSet<(&AssetId, usize)> = BTreeSet::new();
            let mut npig = 0;
            for asset_id in asset_ids {
                npig += gts
                    .get(asset_id)
                    .into_iter()
                    .flatten()
                    .filter(|g| g.class_id == class_id && !g.is_crowd())
                    .count();
            }

            let detections = candidates
                .into_iter()
                .map(|(asset_id, pred)| {
                    let pbox = pred.bbox();
                    let best = gts
                        .get(asset_id)
                        .into_iter()
                        .flatten()
                        .enumerate()
                        .filter(|(_, g)| g.class_id == class_id)
                        .map(|(pos, g)| (pos, g, pbox.iou(&g.bbox())))
                        .fold(None::<(usize, &ObjectAnnotation, f64)>, |best, cur| match best {
                            Some(b) if b.2 >= cur.2 => Some(b),
                            _ => Some(cur),
                        });
                    match best {
                        Some((pos, gt, iou)) if iou >= iou_thr => {
                            if gt.is_crowd() {
                                Detection { score: pred.score, matched: true, ignored: true }
                            } else {
                                let fresh = claimed.insert((asset_id, pos));
                                Detection { score: pred.score, matched: fresh, ignored: false }
                            }
                        }
                        _ => Detection { score: pred.score, matched: false, ignored: false },
                    }
                })
                .collect();

            (class_id, accumulate(detections, npig, need_pr_curve))
        })
        .collect();

    let ci_averaged = average_classes(&ci_evaluations);
    SingleIouEvaluation {
        ci_evaluations,
        ci_averaged,
    }
}
