//! Evaluation configuration.

use serde::{Deserialize, Serialize};

use crate::error::MirError;
use crate::model::ClassId;

/// What to score and how.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluateConfig {
    /// Predictions scoring below this are ignored. In `[0, 1]`.
    pub conf_thr: f64,
    /// One or more IoU thresholds, each in `[0, 1]`. The first one is the
    /// primary threshold used for confusion-matrix tags.
    pub iou_thrs: Vec<f64>,
    pub need_pr_curve: bool,
    /// Classes to score. Empty means every class present in ground truth.
    pub class_ids: Vec<ClassId>,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            conf_thr: 0.005,
            iou_thrs: vec![0.5],
            need_pr_curve: false,
            class_ids: Vec::new(),
        }
    }
}

impl EvaluateConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), MirError> {
        if !(0.0..=1.0).contains(&self.conf_thr) {
            return Err(MirError::InvalidArgs(format!(
                "confidence threshold {} is outside [0, 1]",
                self.conf_thr
            )));
        }
        if self.iou_thrs.is_empty() {
            return Err(MirError::InvalidArgs(
                "at least one IoU threshold is required".to_string(),
            ));
        }
        if self.iou_thrs.len() > MAX_IOU_THRESHOLDS {
            return Err(MirError::InvalidArgs(format!(
                "{} IoU thresholds given, at most {MAX_IOU_THRESHOLDS} allowed",
                self.iou_thrs.len()
            )));
        }
        if let Some(bad) = self.iou_thrs.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(MirError::InvalidArgs(format!(
                "IoU threshold {bad} is outside [0, 1]"
            )));
        }
        Ok(())
    }

    /// The primary IoU threshold.
    pub fn primary_iou_thr(&self) -> f64 {
        self.iou_thrs.first().copied().unwrap_or(0.5)
    }
}

/// Upper bound on the number of IoU thresholds of one evaluation.
pub const MAX_IOU_THRESHOLDS: usize = 100;

/// Parses an IoU threshold spec: either a single value (`0.5`) or an
/// interval `from:to:step` expanded like a half-open range
/// (`0.5:1.0:0.05` gives 0.50, 0.55, ... 0.95).
pub fn parse_iou_thrs(spec: &str) -> Result<Vec<f64>, MirError> {
    let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| MirError::InvalidArgs(format!("invalid IoU threshold '{s}' in '{spec}'")))
    };
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);

    match parts.as_slice() {
        [single] => {
            let value = parse(single)?;
            if !in_unit(value) {
                return Err(MirError::InvalidArgs(format!(
                    "IoU threshold {value} is outside [0, 1]"
                )));
            }
            Ok(vec![value])
        }
        [from, to, step] => {
            let (from, to, step) = (parse(from)?, parse(to)?, parse(step)?);
            if !(in_unit(from) && in_unit(to) && in_unit(step)) {
                return Err(MirError::InvalidArgs(format!(
                    "IoU interval '{spec}' must have all values in [0, 1]"
                )));
            }
            if from >= to {
                return Err(MirError::InvalidArgs(format!(
                    "IoU interval '{spec}' needs from < to"
                )));
            }
            if step <= 0.0 {
                return Err(MirError::InvalidArgs(format!(
                    "IoU interval '{spec}' needs a positive step"
                )));
            }
            let count = ((to - from) / step - 1e-9).ceil();
            if count > MAX_IOU_THRESHOLDS as f64 {
                return Err(MirError::InvalidArgs(format!(
                    "IoU interval '{spec}' expands to more than {MAX_IOU_THRESHOLDS} thresholds"
                )));
            }
            let count = count as usize;
            Ok((0..count)
                .map(|i| ((from + i as f64 * step) * 1e6).round() / 1e6)
                .collect())
        }
        _ => Err(MirError::InvalidArgs(format!(
            "invalid IoU threshold spec '{spec}' (expected 'v' or 'from:to:step')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        assert_eq!(parse_iou_thrs("0.5").expect("parse"), vec![0.5]);
    }

    #[test]
    fn test_parse_interval_is_half_open() {
        let thrs = parse_iou_thrs("0.5:1.0:0.05").expect("parse");
        assert_eq!(thrs.len(), 10);
        assert_eq!(thrs[0], 0.5);
        assert_eq!(thrs[9], 0.95);
    }

    #[test]
    fn test_parse_caps_threshold_count() {
        assert_eq!(parse_iou_thrs("0:1:0.01").expect("parse").len(), 100);
        let err = parse_iou_thrs("0:1:0.0000001").expect_err("too many");
        assert!(err.to_string().contains("more than 100"));
        assert!(parse_iou_thrs("0:1:1e-10").is_err());

        let config = EvaluateConfig {
            iou_thrs: vec![0.5; MAX_IOU_THRESHOLDS + 1],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        assert!(parse_iou_thrs("0.9:0.5:0.1").is_err());
        assert!(parse_iou_thrs("1.5").is_err());
        assert!(parse_iou_thrs("0.5:0.9").is_err());
        assert!(parse_iou_thrs("abc").is_err());
        assert!(parse_iou_thrs("0.5:0.9:0").is_err());
    }

    #[test]
    fn test_validate_conf_range() {
        let config = EvaluateConfig {
            conf_thr: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(EvaluateConfig::default().validate().is_ok());
    }
}
