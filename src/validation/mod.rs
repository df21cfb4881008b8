//! Snapshot validation.
//!
//! This module checks the structural invariants of a snapshot:
//! - Task provenance (head task present and resolvable)
//! - Referential integrity (annotations only on known assets)
//! - Object indices unique and dense per image
//! - Geometric validity (finite, ordered, within image bounds)
//! - Derived keyword indices in sync with the annotations

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::BTreeSet;

use crate::model::{AnnotationSet, AssetType, Channel, Geometry, Metadatas, Snapshot};
use crate::storage::build_index;

/// Options for validation behavior.
#[derive(Clone, Debug)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
    /// Compare stored keyword indices against a rebuild. Off when the
    /// caller is about to rebuild them anyway.
    pub check_keywords: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            strict: false,
            check_keywords: true,
        }
    }
}

/// Validates a snapshot and returns a report of all issues found.
pub fn validate_snapshot(snapshot: &Snapshot, opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_tasks(snapshot, &mut report);
    validate_assets(&snapshot.metadatas, &mut report);
    for channel in [Channel::Prediction, Channel::GroundTruth] {
        let set = snapshot.annotations.channel(channel);
        validate_annotations(channel, set, &snapshot.metadatas, &mut report);
        if opts.check_keywords {
            validate_keywords(channel, snapshot, &mut report);
        }
    }

    if opts.strict {
        for issue in &mut report.issues {
            issue.severity = Severity::Error;
        }
    }
    report
}

fn validate_tasks(snapshot: &Snapshot, report: &mut ValidationReport) {
    let head = snapshot.head_task_id();
    if head.is_empty() {
        report.add(ValidationIssue::error(
            IssueCode::MissingHeadTask,
            "Snapshot has no head task id",
            IssueContext::Snapshot,
        ));
    } else if snapshot.head_task().is_none() {
        report.add(ValidationIssue::error(
            IssueCode::HeadTaskNotInMap,
            format!("Head task '{}' is not in the task map", head),
            IssueContext::Snapshot,
        ));
    }
}

fn validate_assets(metadatas: &Metadatas, report: &mut ValidationReport) {
    for (asset_id, meta) in &metadatas.attributes {
        if !asset_id.is_well_formed() {
            report.add(ValidationIssue::warning(
                IssueCode::MalformedAssetId,
                "Asset id is not a lowercase hex SHA-256",
                IssueContext::Asset {
                    id: asset_id.clone(),
                },
            ));
        }
        let is_image = !matches!(meta.asset_type, AssetType::Unknown | AssetType::Video);
        if is_image && (meta.width == 0 || meta.height == 0) {
            report.add(ValidationIssue::warning(
                IssueCode::InvalidAssetDimensions,
                format!("Invalid dimensions {}x{}", meta.width, meta.height),
                IssueContext::Asset {
                    id: asset_id.clone(),
                },
            ));
        }
    }
}

fn validate_annotations(
    channel: Channel,
    set: &AnnotationSet,
    metadatas: &Metadatas,
    report: &mut ValidationReport,
) {
    for (asset_id, objects) in &set.image_annotations {
        let meta = metadatas.attributes.get(asset_id);
        if meta.is_none() && !objects.is_empty() {
            report.add(ValidationIssue::error(
                IssueCode::AnnotationOnUnknownAsset,
                format!("{} object(s) on an asset missing from metadata", objects.len()),
                IssueContext::Asset {
                    id: asset_id.clone(),
                },
            ));
        }

        let mut seen = BTreeSet::new();
        for object in objects {
            let context = || IssueContext::Annotation {
                channel,
                asset: asset_id.clone(),
                index: object.index,
            };

            if !seen.insert(object.index) {
                report.add(ValidationIssue::error(
                    IssueCode::DuplicateAnnotationIndex,
                    format!("Duplicate object index {}", object.index),
                    context(),
                ));
            }

            if !object.score.is_finite() || !(0.0..=1.0).contains(&object.score) {
                report.add(ValidationIssue::warning(
                    IssueCode::ScoreOutOfRange,
                    format!("Score {} is outside [0, 1]", object.score),
                    context(),
                ));
            }

            if !object.geometry.is_finite() {
                report.add(ValidationIssue::error(
                    IssueCode::BBoxNotFinite,
                    "Non-finite coordinates",
                    context(),
                ));
                continue;
            }

            let bbox = object.bbox();
            if let Geometry::Box(b) = &object.geometry {
                if !b.is_ordered() {
                    report.add(ValidationIssue::error(
                        IssueCode::InvalidBBoxOrdering,
                        format!(
                            "Invalid ordering: min ({}, {}) should be <= max ({}, {})",
                            b.xmin, b.ymin, b.xmax, b.ymax
                        ),
                        context(),
                    ));
                    continue;
                }
            }

            if let Some(meta) = meta.filter(|m| m.width > 0 && m.height > 0) {
                let (w, h) = (meta.width as f64, meta.height as f64);
                let tolerance = 0.5;
                if bbox.xmin < -tolerance
                    || bbox.ymin < -tolerance
                    || bbox.xmax > w + tolerance
                    || bbox.ymax > h + tolerance
                {
                    report.add(ValidationIssue::warning(
                        IssueCode::BBoxOutOfBounds,
                        format!(
                            "Box ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                            bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax, meta.width, meta.height
                        ),
                        context(),
                    ));
                }
            }
        }

        let dense = seen.len() == objects.len()
            && seen.iter().enumerate().all(|(i, index)| *index as usize == i);
        if !dense && seen.len() == objects.len() {
            report.add(ValidationIssue::error(
                IssueCode::NonDenseAnnotationIndex,
                format!("Object indices are not 0..{}", objects.len()),
                IssueContext::Asset {
                    id: asset_id.clone(),
                },
            ));
        }
    }
}

fn validate_keywords(channel: Channel, snapshot: &Snapshot, report: &mut ValidationReport) {
    let stored = match channel {
        Channel::Prediction => &snapshot.keywords.prediction,
        Channel::GroundTruth => &snapshot.keywords.ground_truth,
    };
    let rebuilt = build_index(snapshot.annotations.channel(channel));
    if stored != &rebuilt {
        report.add(ValidationIssue::error(
            IssueCode::KeywordIndexOutOfSync,
            "Keyword index does not match the annotations",
            IssueContext::Keywords { channel },
        ));
    }
}
