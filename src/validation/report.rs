//! Findings produced by snapshot validation.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::{AssetId, Channel};

/// Every finding of one validation pass, in discovery order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// No errors; warnings allowed.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// No findings at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    /// Finding counts per code, for the summary line.
    pub fn counts_by_code(&self) -> BTreeMap<IssueCode, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.code).or_insert(0) += 1;
        }
        counts
    }

    /// Borrowed view used for JSON output.
    pub fn summary(&self) -> ValidationSummary<'_> {
        ValidationSummary {
            error_count: self.error_count(),
            warning_count: self.warning_count(),
            issues: &self.issues,
        }
    }
}

/// JSON shape of a report: counts followed by the findings.
#[derive(Debug, Serialize)]
pub struct ValidationSummary<'a> {
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: &'a [ValidationIssue],
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "Validation passed: snapshot is consistent");
        }

        writeln!(
            f,
            "Validation found {} error(s) and {} warning(s)",
            self.error_count(),
            self.warning_count()
        )?;
        for (code, n) in self.counts_by_code() {
            writeln!(f, "  {code:?}: {n}")?;
        }
        writeln!(f)?;

        // Errors first; each group keeps discovery order.
        for severity in [Severity::Error, Severity::Warning] {
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                writeln!(f, "  {issue}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    #[serde(serialize_with = "serialize_display")]
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message, context)
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warn",
        };
        write!(f, "{tag:<5} {}: {} ({:?})", self.context, self.message, self.code)
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &IssueContext,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Warnings are reported but only fail a commit in strict mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Stable identifier of a finding kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueCode {
    /// The snapshot has no head task id.
    MissingHeadTask,
    /// The head task id does not resolve in the task map.
    HeadTaskNotInMap,
    /// An asset id is not a lowercase hex SHA-256.
    MalformedAssetId,
    /// An image asset has zero width or height.
    InvalidAssetDimensions,
    /// An annotation is attached to an asset missing from the metadata.
    AnnotationOnUnknownAsset,
    DuplicateAnnotationIndex,
    /// Object indices of an image are not 0..n.
    NonDenseAnnotationIndex,
    /// A score is outside [0, 1] or not finite.
    ScoreOutOfRange,
    BBoxNotFinite,
    /// xmin > xmax or ymin > ymax.
    InvalidBBoxOrdering,
    BBoxOutOfBounds,
    /// The keyword index does not match the annotations.
    KeywordIndexOutOfSync,
}

/// Where a finding was made.
#[derive(Clone, Debug)]
pub enum IssueContext {
    Snapshot,
    Asset {
        id: AssetId,
    },
    Annotation {
        channel: Channel,
        asset: AssetId,
        index: u32,
    },
    Keywords {
        channel: Channel,
    },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Snapshot => f.write_str("snapshot"),
            IssueContext::Asset { id } => write!(f, "asset {id}"),
            IssueContext::Annotation {
                channel,
                asset,
                index,
            } => write!(f, "{channel} #{index} on {asset}"),
            IssueContext::Keywords { channel } => write!(f, "{channel} keywords"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_errors_before_warnings() {
        let mut report = ValidationReport::new();
        report.add(ValidationIssue::warning(
            IssueCode::ScoreOutOfRange,
            "score 1.5",
            IssueContext::Snapshot,
        ));
        report.add(ValidationIssue::error(
            IssueCode::MissingHeadTask,
            "no head task",
            IssueContext::Snapshot,
        ));

        let text = report.to_string();
        let error_at = text.find("no head task").expect("error listed");
        let warn_at = text.find("score 1.5").expect("warning listed");
        assert!(error_at < warn_at);
        assert!(text.contains("1 error(s) and 1 warning(s)"));
    }

    #[test]
    fn test_summary_serializes_counts_and_context() {
        let mut report = ValidationReport::new();
        report.add(ValidationIssue::error(
            IssueCode::KeywordIndexOutOfSync,
            "stale",
            IssueContext::Keywords {
                channel: Channel::GroundTruth,
            },
        ));
        let json = serde_json::to_value(report.summary()).expect("json");
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["issues"][0]["severity"], "error");
        assert_eq!(json["issues"][0]["code"], "KeywordIndexOutOfSync");
        assert!(json["issues"][0]["context"]
            .as_str()
            .expect("context string")
            .contains("keywords"));
    }
}
