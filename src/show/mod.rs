//! Snapshot summaries.
//!
//! Everything shown here is read from the keywords context and the task
//! collection; no annotation is scanned.

mod report;

pub use report::{AssetSummary, ChannelSummary, ClassCount, ShowReport, TaskSummary};

use chrono::{TimeZone, Utc};

use crate::labels::LabelSpace;
use crate::model::{AnnoStats, KeywordIndex, Keywords, ModelMeta, Task, Tasks, TvtType};

/// Options for the show report.
#[derive(Clone, Debug)]
pub struct ShowOptions {
    /// Width of histogram bars (in characters).
    pub bar_width: usize,
}

impl Default for ShowOptions {
    fn default() -> Self {
        Self { bar_width: 20 }
    }
}

/// Summarizes a snapshot from its keywords and tasks.
pub fn show_snapshot(
    keywords: &Keywords,
    tasks: &Tasks,
    labels: &LabelSpace,
    model: Option<&ModelMeta>,
    opts: &ShowOptions,
) -> ShowReport {
    let context = &keywords.context;
    let tvt = |t: TvtType| context.tvt_cnt.get(&t).copied().unwrap_or(0);

    ShowReport {
        head_task: tasks.head().map(summarize_task),
        assets: AssetSummary {
            total: context.images_cnt,
            total_mbytes: context.total_asset_mbytes(),
            training: tvt(TvtType::Training),
            validation: tvt(TvtType::Validation),
            test: tvt(TvtType::Test),
            unknown_split: tvt(TvtType::Unknown),
        },
        ground_truth: summarize_channel(&context.gt_stats, &keywords.ground_truth, labels, None),
        prediction: summarize_channel(&context.pred_stats, &keywords.prediction, labels, model),
        project_classes: context
            .project_class_ids
            .iter()
            .map(|id| labels.display_name(*id))
            .collect(),
        project_negative_assets: context.project_negative_images_cnt,
        bar_width: opts.bar_width,
    }
}

fn summarize_task(task: &Task) -> TaskSummary {
    let timestamp = Utc
        .timestamp_opt(task.timestamp, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| task.timestamp.to_string());
    TaskSummary {
        task_id: task.task_id.to_string(),
        task_type: task.task_type.to_string(),
        ancestor_task_id: task.ancestor_task_id.to_string(),
        timestamp,
        return_code: task.return_code,
        return_msg: task.return_msg.clone(),
        map: task.evaluation.as_ref().map(|e| e.map()),
    }
}

fn summarize_channel(
    stats: &AnnoStats,
    index: &KeywordIndex,
    labels: &LabelSpace,
    model: Option<&ModelMeta>,
) -> ChannelSummary {
    let mut classes: Vec<ClassCount> = index
        .class_to_assets
        .iter()
        .map(|(class_id, assets)| ClassCount {
            name: labels.display_name(*class_id),
            assets: assets.len() as u64,
            objects: stats.class_obj_cnt.get(class_id).copied().unwrap_or(0),
        })
        .collect();
    classes.sort_by(|a, b| b.assets.cmp(&a.assets).then_with(|| a.name.cmp(&b.name)));

    ChannelSummary {
        objects: stats.total_cnt,
        positive_assets: stats.positive_asset_cnt,
        negative_assets: stats.negative_asset_cnt,
        classes,
        model_hash: model.map(|m| m.model_hash.clone()),
    }
}
