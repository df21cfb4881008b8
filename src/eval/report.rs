//! Evaluation result types and text formatting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::config::EvaluateConfig;
use crate::model::ClassId;

/// Value reported for AP/AR when a class has no scorable ground truth.
pub const ABSENT: f64 = -1.0;

/// One point of a precision/recall curve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub recall: f64,
    pub precision: f64,
    /// Score of the prediction at which this recall is first reached.
    pub confidence: f64,
}

/// Scores of one class (or an average over classes) at one IoU threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassEvaluation {
    pub ap: f64,
    pub ar: f64,
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pr_curve: Vec<PrPoint>,
}

impl Default for ClassEvaluation {
    fn default() -> Self {
        Self {
            ap: ABSENT,
            ar: ABSENT,
            tp: 0,
            fp: 0,
            fn_count: 0,
            pr_curve: Vec::new(),
        }
    }
}

impl ClassEvaluation {
    /// Returns true if the class had ground truth to score against.
    pub fn is_present(&self) -> bool {
        self.ap > ABSENT
    }
}

/// All classes at one IoU threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleIouEvaluation {
    pub ci_evaluations: BTreeMap<ClassId, ClassEvaluation>,
    /// AP/AR averaged over present classes; counts summed over all classes.
    pub ci_averaged: ClassEvaluation,
}

/// The full result of one evaluation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub config: EvaluateConfig,
    /// Keyed by [`iou_key`].
    pub iou_evaluations: BTreeMap<String, SingleIouEvaluation>,
    /// Per class AP/AR averaged over IoU thresholds. Counts are those of the
    /// first (primary) threshold.
    pub iou_averaged: SingleIouEvaluation,
}

impl Evaluation {
    /// Mean average precision over classes and IoU thresholds.
    pub fn map(&self) -> f64 {
        self.iou_averaged.ci_averaged.ap
    }
}

/// Map key for an IoU threshold.
pub fn iou_key(iou_thr: f64) -> String {
    format!("{iou_thr:.2}")
}

/// Mean of the present values, or [`ABSENT`] when none is present.
pub(crate) fn mean_present(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| *v > ABSENT)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        ABSENT
    } else {
        sum / n as f64
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Evaluation: conf_thr {:.2}, {} IoU threshold(s)",
            self.config.conf_thr,
            self.config.iou_thrs.len()
        )?;
        writeln!(f, "mAP: {}", format_score(self.map()))?;

        for (key, single) in &self.iou_evaluations {
            writeln!(f)?;
            writeln!(
                f,
                "IoU {key}: AP {}  AR {}",
                format_score(single.ci_averaged.ap),
                format_score(single.ci_averaged.ar)
            )?;
            for (class_id, ce) in &single.ci_evaluations {
                writeln!(
                    f,
                    "  class {:>4}  AP {}  AR {}  TP {:>5}  FP {:>5}  FN {:>5}",
                    class_id.0,
                    format_score(ce.ap),
                    format_score(ce.ar),
                    ce.tp,
                    ce.fp,
                    ce.fn_count
                )?;
            }
        }

        Ok(())
    }
}

fn format_score(value: f64) -> String {
    if value > ABSENT {
        format!("{value:.4}")
    } else {
        "  n/a ".to_string()
    }
}
