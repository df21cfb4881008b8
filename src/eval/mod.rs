//! Detection evaluation: scores a prediction channel against ground truth.
//!
//! The COCO-style engine ([`evaluate`]) supports several IoU thresholds,
//! crowd regions and confusion-matrix tagging. [`evaluate_voc`] is the
//! single-threshold VOC-style variant.
//!
//! Neither function touches its inputs: confusion-matrix tags are written
//! to copies returned in [`EvaluationOutput`].

pub(crate) mod coco;
mod config;
mod report;
mod voc;

pub use coco::{recall_grid, RECALL_POINTS};
pub use config::{parse_iou_thrs, EvaluateConfig, MAX_IOU_THRESHOLDS};
pub use report::{
    iou_key, ClassEvaluation, Evaluation, PrPoint, SingleIouEvaluation, ABSENT,
};

use std::collections::{BTreeMap, BTreeSet};

use crate::error::MirError;
use crate::model::{AnnotationSet, AssetId, ClassId, ConfusionMatrixType};
use report::mean_present;

/// Evaluation result plus the tagged copies of both channels.
#[derive(Clone, Debug)]
pub struct EvaluationOutput {
    pub evaluation: Evaluation,
    pub prediction: AnnotationSet,
    pub ground_truth: AnnotationSet,
}

/// Runs the COCO-style evaluation.
///
/// Confusion-matrix tags are computed at the primary (first) IoU threshold.
pub fn evaluate(
    prediction: &AnnotationSet,
    ground_truth: &AnnotationSet,
    config: &EvaluateConfig,
) -> Result<EvaluationOutput, MirError> {
    config.validate()?;
    let (asset_ids, class_ids) = scope(prediction, ground_truth, config)?;
    tracing::debug!(
        assets = asset_ids.len(),
        classes = class_ids.len(),
        thresholds = config.iou_thrs.len(),
        "evaluating"
    );

    let table = coco::match_all(
        &prediction.image_annotations,
        &ground_truth.image_annotations,
        &asset_ids,
        &class_ids,
        config,
    );
    let iou_evaluations = coco::accumulate_all(&table, config);
    let iou_averaged = average_thresholds(&iou_evaluations, config);

    let (tagged_pred, tagged_gt) = apply_confusion(prediction, ground_truth, &table, config);

    let mut evaluation_config = config.clone();
    evaluation_config.class_ids = class_ids;
    Ok(EvaluationOutput {
        evaluation: Evaluation {
            config: evaluation_config,
            iou_evaluations,
            iou_averaged,
        },
        prediction: tagged_pred,
        ground_truth: tagged_gt,
    })
}

/// Runs the VOC-style evaluation at the primary IoU threshold of `config`.
pub fn evaluate_voc(
    prediction: &AnnotationSet,
    ground_truth: &AnnotationSet,
    config: &EvaluateConfig,
) -> Result<SingleIouEvaluation, MirError> {
    config.validate()?;
    let (asset_ids, class_ids) = scope(prediction, ground_truth, config)?;
    Ok(voc::evaluate_single_iou(
        &prediction.image_annotations,
        &ground_truth.image_annotations,
        &asset_ids,
        &class_ids,
        config.conf_thr,
        config.primary_iou_thr(),
        config.need_pr_curve,
    ))
}

/// Assets and classes taking part in an evaluation.
fn scope(
    prediction: &AnnotationSet,
    ground_truth: &AnnotationSet,
    config: &EvaluateConfig,
) -> Result<(BTreeSet<AssetId>, Vec<ClassId>), MirError> {
    if ground_truth.is_empty() {
        return Err(MirError::NoAnnotations(
            "ground truth has no objects to evaluate against".to_string(),
        ));
    }
    let asset_ids: BTreeSet<AssetId> = ground_truth
        .image_annotations
        .keys()
        .chain(prediction.image_annotations.keys())
        .cloned()
        .collect();
    let class_ids = if config.class_ids.is_empty() {
        ground_truth.class_ids().into_iter().collect()
    } else {
        let mut ids = config.class_ids.clone();
        ids.sort();
        ids.dedup();
        ids
    };
    Ok((asset_ids, class_ids))
}

fn average_thresholds(
    iou_evaluations: &BTreeMap<String, SingleIouEvaluation>,
    config: &EvaluateConfig,
) -> SingleIouEvaluation {
    let primary = iou_evaluations.get(&iou_key(config.primary_iou_thr()));
    let Some(primary) = primary else {
        return SingleIouEvaluation::default();
    };

    let ci_evaluations: BTreeMap<ClassId, ClassEvaluation> = primary
        .ci_evaluations
        .iter()
        .map(|(class_id, counts)| {
            let per_thr = || {
                iou_evaluations
                    .values()
                    .filter_map(move |single| single.ci_evaluations.get(class_id))
            };
            let averaged = ClassEvaluation {
                ap: mean_present(per_thr().map(|c| c.ap)),
                ar: mean_present(per_thr().map(|c| c.ar)),
                tp: counts.tp,
                fp: counts.fp,
                fn_count: counts.fn_count,
                pr_curve: Vec::new(),
            };
            (*class_id, averaged)
        })
        .collect();
    let ci_averaged = coco::average_classes(&ci_evaluations);
    SingleIouEvaluation {
        ci_evaluations,
        ci_averaged,
    }
}

/// Writes confusion-matrix tags into copies of both channels.
fn apply_confusion(
    prediction: &AnnotationSet,
    ground_truth: &AnnotationSet,
    table: &coco::MatchTable,
    config: &EvaluateConfig,
) -> (AnnotationSet, AnnotationSet) {
    let mut pred = prediction.clone();
    let mut gt = ground_truth.clone();
    pred.clear_confusion();
    gt.clear_confusion();

    let evaluated: BTreeSet<ClassId> = table.keys().copied().collect();
    for object in pred.image_annotations.values_mut().flatten() {
        if evaluated.contains(&object.class_id) && object.score < config.conf_thr {
            object.cm = ConfusionMatrixType::Ignored;
        }
    }

    for cells in table.values() {
        for (asset_id, cell) in cells {
            let gt_objects = ground_truth.objects(asset_id);
            let pred_objects = prediction.objects(asset_id);

            if let Some(objects) = pred.image_annotations.get_mut(asset_id) {
                for (p, &pos) in cell.pred_pos.iter().enumerate() {
                    let object = &mut objects[pos];
                    match cell.matches[p].first().copied().flatten() {
                        Some(m) if m.ignored => object.cm = ConfusionMatrixType::Ignored,
                        Some(m) => {
                            object.cm = ConfusionMatrixType::Tp;
                            object.det_link_id = Some(gt_objects[m.gt_pos].index);
                        }
                        None => object.cm = ConfusionMatrixType::Fp,
                    }
                }
            }

            if let Some(objects) = gt.image_annotations.get_mut(asset_id) {
                let claimed = cell.gt_claimed_by.first();
                for (g, &pos) in cell.gt_pos.iter().enumerate() {
                    let object = &mut objects[pos];
                    if cell.gt_ignored[g] {
                        object.cm = ConfusionMatrixType::Ignored;
                        continue;
                    }
                    match claimed.and_then(|c| c[g]) {
                        Some(pred_pos) => {
                            object.cm = ConfusionMatrixType::Mtp;
                            object.det_link_id = Some(pred_objects[pred_pos].index);
                        }
                        None => object.cm = ConfusionMatrixType::Fn,
                    }
                }
            }
        }
    }

    (pred, gt)
}
