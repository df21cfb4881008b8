//! Show report types and terminal formatting.

use serde::Serialize;
use std::fmt;

/// Summary of one snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct ShowReport {
    pub head_task: Option<TaskSummary>,
    pub assets: AssetSummary,
    pub ground_truth: ChannelSummary,
    pub prediction: ChannelSummary,
    /// Names of the project classes; empty when none are configured.
    pub project_classes: Vec<String>,
    pub project_negative_assets: u64,
    #[serde(skip)]
    pub(crate) bar_width: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub task_type: String,
    pub ancestor_task_id: String,
    pub timestamp: String,
    pub return_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub return_msg: String,
    /// mAP of an evaluation stored on the task, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AssetSummary {
    pub total: u64,
    pub total_mbytes: u64,
    pub training: u64,
    pub validation: u64,
    pub test: u64,
    pub unknown_split: u64,
}

/// Per-channel summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChannelSummary {
    pub objects: u64,
    pub positive_assets: u64,
    pub negative_assets: u64,
    /// Sorted by asset count descending, then name.
    pub classes: Vec<ClassCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClassCount {
    pub name: String,
    pub assets: u64,
    pub objects: u64,
}

impl fmt::Display for ShowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_task(f)?;
        writeln!(f)?;
        self.fmt_assets(f)?;
        for (title, channel) in [("Ground truth", &self.ground_truth), ("Prediction", &self.prediction)] {
            writeln!(f)?;
            fmt_channel(f, title, channel, self.bar_width)?;
        }
        if !self.project_classes.is_empty() {
            writeln!(f)?;
            writeln!(f, "┌─ Project ─")?;
            writeln!(f, "│   Classes:            {}", self.project_classes.join(", "))?;
            writeln!(
                f,
                "│   Negative assets:    {:>8}",
                format_number(self.project_negative_assets)
            )?;
            writeln!(f, "└─")?;
        }
        Ok(())
    }
}

impl ShowReport {
    fn fmt_task(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌─ Head task ─")?;
        match &self.head_task {
            None => writeln!(f, "│   (none)")?,
            Some(task) => {
                writeln!(f, "│   Id:        {}", task.task_id)?;
                writeln!(f, "│   Type:      {}", task.task_type)?;
                if !task.ancestor_task_id.is_empty() {
                    writeln!(f, "│   Ancestor:  {}", task.ancestor_task_id)?;
                }
                writeln!(f, "│   Time:      {}", task.timestamp)?;
                if task.return_code != 0 {
                    writeln!(f, "│   ✗ Failed:  code {} {}", task.return_code, task.return_msg)?;
                }
                if let Some(map) = task.map {
                    writeln!(f, "│   mAP:       {map:.4}")?;
                }
            }
        }
        writeln!(f, "└─")
    }

    fn fmt_assets(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.assets;
        writeln!(f, "┌─ Assets ─")?;
        writeln!(f, "│   Total:       {:>8}  ({} MB)", format_number(a.total), a.total_mbytes)?;
        for (name, count) in [
            ("Training", a.training),
            ("Validation", a.validation),
            ("Test", a.test),
            ("Unassigned", a.unknown_split),
        ] {
            if count > 0 {
                writeln!(f, "│   {:<11}  {:>8}", format!("{name}:"), format_number(count))?;
            }
        }
        writeln!(f, "└─")
    }
}

fn fmt_channel(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    c: &ChannelSummary,
    bar_width: usize,
) -> fmt::Result {
    writeln!(f, "┌─ {title} ─")?;
    writeln!(f, "│   Objects:     {:>8}", format_number(c.objects))?;
    writeln!(
        f,
        "│   Positive:    {:>8}   Negative: {}",
        format_number(c.positive_assets),
        format_number(c.negative_assets)
    )?;
    if let Some(model) = &c.model_hash {
        writeln!(f, "│   Model:       {model}")?;
    }
    if !c.classes.is_empty() {
        writeln!(f, "│")?;
        let max_assets = c.classes.iter().map(|e| e.assets).max().unwrap_or(1);
        for entry in &c.classes {
            writeln!(
                f,
                "│   {:<16} {:>7} assets {:>7} objects  {}",
                truncate_label(&entry.name, 16),
                format_number(entry.assets),
                format_number(entry.objects),
                render_bar(entry.assets, max_assets, bar_width)
            )?;
        }
    }
    writeln!(f, "└─")
}

/// Format a number with thousands separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Render a horizontal bar using Unicode block characters.
fn render_bar(count: u64, max_count: u64, width: usize) -> String {
    if max_count == 0 || width == 0 {
        return String::new();
    }
    let filled = ((count as u128 * width as u128) / max_count as u128) as usize;
    let filled = filled.min(width);
    "█".repeat(filled) + &"░".repeat(width - filled)
}

/// Truncate a label to fit in the display column.
fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        label.to_string()
    } else {
        let head: String = label.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
