//! COCO-style detection matching and accumulation.
//!
//! Work is split into cells, one per (class, asset). Each cell is matched
//! independently at every IoU threshold; accumulation then merges the cells
//! of a class in global confidence order.

use std::collections::{BTreeMap, BTreeSet};

use super::config::EvaluateConfig;
use super::report::{iou_key, mean_present, ClassEvaluation, PrPoint, SingleIouEvaluation, ABSENT};
use crate::model::{AssetId, ClassId, ObjectAnnotation};

/// Number of points on the recall grid: 0.00, 0.01, ... 1.00.
pub const RECALL_POINTS: usize = 101;

/// The recall grid.
pub fn recall_grid() -> impl Iterator<Item = f64> {
    (0..RECALL_POINTS).map(|i| i as f64 / (RECALL_POINTS - 1) as f64)
}

/// Where a ground-truth match of one prediction landed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct GtMatch {
    /// Index of the ground-truth object in its asset's list.
    pub gt_pos: usize,
    pub ignored: bool,
}

/// Matching result of one (class, asset) cell at one IoU threshold.
#[derive(Clone, Debug, Default)]
pub(crate) struct CellMatches {
    /// Positions (in the asset's prediction list) of kept predictions, in
    /// descending score order.
    pub pred_pos: Vec<usize>,
    pub scores: Vec<f64>,
    /// Per kept prediction, per threshold.
    pub matches: Vec<Vec<Option<GtMatch>>>,
    /// Positions of ground-truth objects, non-ignored first.
    pub gt_pos: Vec<usize>,
    pub gt_ignored: Vec<bool>,
    /// Per threshold: which prediction (position) claimed each gt, in
    /// `gt_pos` order.
    pub gt_claimed_by: Vec<Vec<Option<usize>>>,
}

impl CellMatches {
    fn non_ignored_gt(&self) -> usize {
        self.gt_ignored.iter().filter(|i| !**i).count()
    }
}

/// Matches the predictions of one cell against its ground truth.
///
/// `preds` and `gts` are the full object lists of the asset; only objects of
/// `class_id` take part.
pub(crate) fn match_cell(
    preds: &[ObjectAnnotation],
    gts: &[ObjectAnnotation],
    class_id: ClassId,
    config: &EvaluateConfig,
) -> CellMatches {
    let mut gt_pos: Vec<usize> = gts
        .iter()
        .enumerate()
        .filter(|(_, o)| o.class_id == class_id)
        .map(|(i, _)| i)
        .collect();
    // Stable sort keeps index order within each group.
    gt_pos.sort_by_key(|&i| gts[i].is_crowd());
    let gt_ignored: Vec<bool> = gt_pos.iter().map(|&i| gts[i].is_crowd()).collect();

    let mut pred_pos: Vec<usize> = preds
        .iter()
        .enumerate()
        .filter(|(_, o)| o.class_id == class_id && o.score >= config.conf_thr)
        .map(|(i, _)| i)
        .collect();
    pred_pos.sort_by(|&a, &b| preds[b].score.total_cmp(&preds[a].score));
    let scores: Vec<f64> = pred_pos.iter().map(|&i| preds[i].score).collect();

    // ious[p][g]
    let ious: Vec<Vec<f64>> = pred_pos
        .iter()
        .map(|&p| {
            let pbox = preds[p].bbox();
            gt_pos
                .iter()
                .zip(&gt_ignored)
                .map(|(&g, &crowd)| {
                    let gbox = gts[g].bbox();
                    if crowd {
                        pbox.iou_crowd(&gbox)
                    } else {
                        pbox.iou(&gbox)
                    }
                })
                .collect()
        })
        .collect();

    let mut matches = vec![Vec::with_capacity(config.iou_thrs.len()); pred_pos.len()];
    let mut gt_claimed_by = Vec::with_capacity(config.iou_thrs.len());

    for &thr in &config.iou_thrs {
        let mut claimed: Vec<Option<usize>> = vec![None; gt_pos.len()];
        for (p, row) in ious.iter().enumerate() {
            let mut best_iou = thr.min(1.0 - 1e-10);
            let mut best: Option<usize> = None;
            for (g, &iou) in row.iter().enumerate() {
                if claimed[g].is_some() && !gt_ignored[g] {
                    continue;
                }
                if let Some(m) = best {
                    if !gt_ignored[m] && gt_ignored[g] {
                        break;
                    }
                }
                if iou < best_iou {
                    continue;
                }
                best_iou = iou;
                best = Some(g);
            }
            let found = best.map(|g| {
                claimed[g] = Some(pred_pos[p]);
                GtMatch {
                    gt_pos: gt_pos[g],
                    ignored: gt_ignored[g],
                }
            });
            matches[p].push(found);
        }
        gt_claimed_by.push(claimed);
    }

    CellMatches {
        pred_pos,
        scores,
        matches,
        gt_pos,
        gt_ignored,
        gt_claimed_by,
    }
}

/// One scored detection entering accumulation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Detection {
    pub score: f64,
    pub matched: bool,
    pub ignored: bool,
}

/// Integrates detections of one class into AP/AR and counts.
///
/// `detections` must be in cell order (asset order, score-descending within
/// a cell); a stable sort merges them by score.
pub(crate) fn accumulate(
    mut detections: Vec<Detection>,
    npig: usize,
    need_pr_curve: bool,
) -> ClassEvaluation {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    detections.retain(|d| !d.ignored);

    let mut tp_cum = Vec::with_capacity(detections.len());
    let mut fp_cum = Vec::with_capacity(detections.len());
    let (mut tp, mut fp) = (0u64, 0u64);
    for d in &detections {
        if d.matched {
            tp += 1;
        } else {
            fp += 1;
        }
        tp_cum.push(tp);
        fp_cum.push(fp);
    }

    if npig == 0 {
        return ClassEvaluation {
            ap: ABSENT,
            ar: ABSENT,
            tp,
            fp,
            fn_count: 0,
            pr_curve: Vec::new(),
        };
    }

    let recall: Vec<f64> = tp_cum.iter().map(|&t| t as f64 / npig as f64).collect();
    let mut precision: Vec<f64> = tp_cum
        .iter()
        .zip(&fp_cum)
        .map(|(&t, &f)| {
            let denom = t + f;
            if denom == 0 {
                0.0
            } else {
                t as f64 / denom as f64
            }
        })
        .collect();
    for i in (1..precision.len()).rev() {
        if precision[i] > precision[i - 1] {
            precision[i - 1] = precision[i];
        }
    }

    let mut sampled = [0.0; RECALL_POINTS];
    let mut pr_curve = Vec::new();
    for (slot, r) in sampled.iter_mut().zip(recall_grid()) {
        let idx = recall.partition_point(|&rc| rc < r);
        let (p, confidence) = if idx < precision.len() {
            (precision[idx], detections[idx].score)
        } else {
            (0.0, 0.0)
        };
        *slot = p;
        if need_pr_curve {
            pr_curve.push(PrPoint {
                recall: r,
                precision: p,
                confidence,
            });
        }
    }

    ClassEvaluation {
        ap: sampled.iter().sum::<f64>() / RECALL_POINTS as f64,
        ar: recall.last().copied().unwrap_or(0.0),
        tp,
        fp,
        fn_count: npig as u64 - tp.min(npig as u64),
        pr_curve,
    }
}

/// Averages class results into the `ci_averaged` slot.
pub(crate) fn average_classes(ci_evaluations: &BTreeMap<ClassId, ClassEvaluation>) -> ClassEvaluation {
    ClassEvaluation {
        ap: mean_present(ci_evaluations.values().map(|c| c.ap)),
        ar: mean_present(ci_evaluations.values().map(|c| c.ar)),
        tp: ci_evaluations.values().map(|c| c.tp).sum(),
        fp: ci_evaluations.values().map(|c| c.fp).sum(),
        fn_count: ci_evaluations.values().map(|c| c.fn_count).sum(),
        pr_curve: Vec::new(),
    }
}

/// All cell matches of one evaluation, keyed by class then asset.
pub(crate) type MatchTable = BTreeMap<ClassId, BTreeMap<AssetId, CellMatches>>;

/// Matches every (class, asset) cell.
pub(crate) fn match_all(
    preds: &BTreeMap<AssetId, Vec<ObjectAnnotation>>,
    gts: &BTreeMap<AssetId, Vec<ObjectAnnotation>>,
    asset_ids: &BTreeSet<AssetId>,
    class_ids: &[ClassId],
    config: &EvaluateConfig,
) -> MatchTable {
    let empty: Vec<ObjectAnnotation> = Vec::new();
    class_ids
        .iter()
        .map(|&class_id| {
            let cells = asset_ids
                .iter()
                .map(|asset_id| {
                    let p = preds.get(asset_id).unwrap_or(&empty);
                    let g = gts.get(asset_id).unwrap_or(&empty);
                    (asset_id.clone(), match_cell(p, g, class_id, config))
                })
                .collect();
            (class_id, cells)
        })
        .collect()
}

/// Accumulates the match table into one result per IoU threshold.
pub(crate) fn accumulate_all(
    table: &MatchTable,
    config: &EvaluateConfig,
) -> BTreeMap<String, SingleIouEvaluation> {
    config
        .iou_thrs
        .iter()
        .enumerate()
        .map(|(t, &thr)| {
            let ci_evaluations: BTreeMap<ClassId, ClassEvaluation> = table
                .iter()
                .map(|(&class_id, cells)| {
                    let mut detections = Vec::new();
                    let mut npig = 0;
                    for cell in cells.values() {
                        npig += cell.non_ignored_gt();
                        for (p, score) in cell.scores.iter().enumerate() {
                            let found = cell.matches[p][t];
                            detections.push(Detection {
                                score: *score,
                                matched: found.is_some(),
                                ignored: found.is_some_and(|m| m.ignored),
                            });
                        }
                    }
                    (class_id, accumulate(detections, npig, config.need_pr_curve))
                })
                .collect();
            let ci_averaged = average_classes(&ci_evaluations);
            (
                iou_key(thr),
                SingleIouEvaluation {
                    ci_evaluations,
                    ci_averaged,
                },
            )
        })
        .collect()
}
