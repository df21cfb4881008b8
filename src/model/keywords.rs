//! Derived collections: keyword index and context aggregates.
//!
//! Both are rebuilt from the annotation set by the storage engine on every
//! commit (see [`crate::storage::rebuild_keywords`]); nothing else writes them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::asset::TvtType;
use super::ids::{AssetId, ClassId};

/// Lookup tables for one annotation channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndex {
    /// class id -> assets carrying at least one object of that class.
    pub class_to_assets: BTreeMap<ClassId, BTreeSet<AssetId>>,
    /// asset id -> classes present on that asset.
    pub asset_to_classes: BTreeMap<AssetId, BTreeSet<ClassId>>,
    /// object tag key -> assets carrying an object with that tag.
    pub tag_to_assets: BTreeMap<String, BTreeSet<AssetId>>,
}

/// Per-channel statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnoStats {
    /// Number of objects.
    pub total_cnt: u64,
    /// Assets with at least one object.
    pub positive_asset_cnt: u64,
    /// Assets with no object.
    pub negative_asset_cnt: u64,
    /// class id -> number of assets carrying it.
    pub class_asset_cnt: BTreeMap<ClassId, u64>,
    /// class id -> number of objects.
    pub class_obj_cnt: BTreeMap<ClassId, u64>,
    /// tag key -> number of objects carrying it.
    pub tags_cnt: BTreeMap<String, u64>,
    pub eval_class_ids: Vec<ClassId>,
}

/// Aggregate counts over a whole snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub images_cnt: u64,
    pub total_asset_bytes: u64,
    pub tvt_cnt: BTreeMap<TvtType, u64>,
    pub pred_stats: AnnoStats,
    pub gt_stats: AnnoStats,
    /// Classes the repository is focused on.
    pub project_class_ids: Vec<ClassId>,
    /// Assets carrying none of `project_class_ids` in either channel.
    pub project_negative_images_cnt: u64,
}

impl Context {
    /// Total asset size in megabytes, rounded down.
    pub fn total_asset_mbytes(&self) -> u64 {
        self.total_asset_bytes / (1024 * 1024)
    }
}

/// The fourth snapshot collection: both keyword indices plus the context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Keywords {
    pub prediction: KeywordIndex,
    pub ground_truth: KeywordIndex,
    pub context: Context,
}
