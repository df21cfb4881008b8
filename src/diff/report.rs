//! Diff report types and text formatting.

use serde::Serialize;
use std::fmt;

use crate::model::Channel;

/// Snapshot diff report.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiffReport {
    /// Asset-level counts.
    pub assets: DiffCounts,
    /// Per-channel object counts.
    pub prediction: DiffAnnotationCounts,
    pub ground_truth: DiffAnnotationCounts,
    /// Optional detail section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<DiffDetail>,
}

impl DiffReport {
    pub fn channel(&self, channel: Channel) -> &DiffAnnotationCounts {
        match channel {
            Channel::Prediction => &self.prediction,
            Channel::GroundTruth => &self.ground_truth,
        }
    }

    pub(crate) fn channel_mut(&mut self, channel: Channel) -> &mut DiffAnnotationCounts {
        match channel {
            Channel::Prediction => &mut self.prediction,
            Channel::GroundTruth => &mut self.ground_truth,
        }
    }

    /// Returns true if nothing differs.
    pub fn is_identical(&self) -> bool {
        let unchanged = |c: &DiffAnnotationCounts| c.only_in_a == 0 && c.only_in_b == 0 && c.modified == 0;
        self.assets.only_in_a == 0
            && self.assets.only_in_b == 0
            && unchanged(&self.prediction)
            && unchanged(&self.ground_truth)
    }
}

/// Shared / only-in-A / only-in-B counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub shared: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
}

/// Object diff counts of one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffAnnotationCounts {
    pub shared: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
    pub modified: usize,
}

/// Optional detail section for text/json output.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiffDetail {
    pub assets_only_in_a: Vec<String>,
    pub assets_only_in_b: Vec<String>,
    pub modified_annotations: Vec<ModifiedAnnotation>,
    pub max_items: usize,
}

/// One modified object.
#[derive(Clone, Debug, Serialize)]
pub struct ModifiedAnnotation {
    pub channel: Channel,
    pub asset_id: String,
    pub index: u32,
    pub reason: String,
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[String], max: usize) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{title}:")?;
    if items.is_empty() {
        return writeln!(f, "  - (none)");
    }
    for item in items.iter().take(max) {
        writeln!(f, "  - {item}")?;
    }
    if items.len() > max {
        writeln!(f, "  ... and {} more", items.len() - max)?;
    }
    Ok(())
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Assets:       {} shared, {} only in A, {} only in B",
            self.assets.shared, self.assets.only_in_a, self.assets.only_in_b
        )?;
        for channel in [Channel::GroundTruth, Channel::Prediction] {
            let counts = self.channel(channel);
            writeln!(
                f,
                "{:<13} {} shared, {} only in A, {} only in B, {} modified",
                format!("{channel}:"),
                counts.shared,
                counts.only_in_a,
                counts.only_in_b,
                counts.modified
            )?;
        }

        if let Some(detail) = &self.detail {
            write_list(f, "Assets only in A", &detail.assets_only_in_a, detail.max_items)?;
            write_list(f, "Assets only in B", &detail.assets_only_in_b, detail.max_items)?;

            writeln!(f)?;
            writeln!(
                f,
                "Objects modified (showing first {}):",
                detail.max_items
            )?;
            if detail.modified_annotations.is_empty() {
                writeln!(f, "  - (none)")?;
            } else {
                for item in &detail.modified_annotations {
                    writeln!(
                        f,
                        "  - {} {}#{}: {}",
                        item.channel, item.asset_id, item.index, item.reason
                    )?;
                }
            }
        }

        Ok(())
    }
}
