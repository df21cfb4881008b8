//! Protobuf messages for the snapshot files.
//!
//! Field tags are part of the on-disk format: never renumber them. Maps use
//! `BTreeMap` so encoding is deterministic and identical snapshots produce
//! identical bytes.

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireAssetType {
    Unknown = 0,
    ImageJpeg = 1,
    ImagePng = 2,
    ImageBmp = 3,
    ImageWebp = 4,
    Video = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireTvtType {
    Unknown = 0,
    Training = 1,
    Validation = 2,
    Test = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireConfusionMatrixType {
    NotSet = 0,
    Tp = 1,
    Fp = 2,
    Fn = 3,
    Tn = 4,
    Unknown = 5,
    Mtp = 11,
    Ignored = 12,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireTaskType {
    Unknown = 0,
    Init = 1,
    Import = 2,
    Filter = 3,
    Merge = 4,
    Copy = 5,
    Training = 6,
    Mining = 7,
    Infer = 8,
    Evaluate = 9,
    Update = 10,
}

// metadatas.mir

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireMetadatas {
    #[prost(btree_map = "string, message", tag = "1")]
    pub attributes: BTreeMap<String, WireAssetAttributes>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAssetAttributes {
    #[prost(enumeration = "WireAssetType", tag = "1")]
    pub asset_type: i32,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(uint32, tag = "4")]
    pub channels: u32,
    #[prost(uint64, tag = "5")]
    pub byte_size: u64,
    #[prost(string, tag = "6")]
    pub origin_name: String,
    #[prost(string, tag = "7")]
    pub dataset_name: String,
    #[prost(enumeration = "WireTvtType", tag = "8")]
    pub tvt_type: i32,
    #[prost(int64, tag = "9")]
    pub timestamp: i64,
}

// annotations.mir

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAnnotations {
    #[prost(message, optional, tag = "1")]
    pub prediction: Option<WireAnnotationSet>,
    #[prost(message, optional, tag = "2")]
    pub ground_truth: Option<WireAnnotationSet>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAnnotationSet {
    #[prost(btree_map = "string, message", tag = "1")]
    pub image_annotations: BTreeMap<String, WireImageAnnotations>,
    #[prost(string, tag = "2")]
    pub task_id: String,
    #[prost(int32, repeated, tag = "3")]
    pub eval_class_ids: Vec<i32>,
    #[prost(message, optional, tag = "4")]
    pub model: Option<WireModelMeta>,
    #[prost(string, tag = "5")]
    pub executor_config: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireImageAnnotations {
    #[prost(message, repeated, tag = "1")]
    pub objects: Vec<WireObjectAnnotation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireObjectAnnotation {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(int32, tag = "2")]
    pub class_id: i32,
    #[prost(message, optional, tag = "3")]
    pub rect: Option<WireRect>,
    #[prost(message, repeated, tag = "4")]
    pub polygon: Vec<WirePoint>,
    #[prost(double, tag = "5")]
    pub score: f64,
    #[prost(double, optional, tag = "6")]
    pub anno_quality: Option<f64>,
    #[prost(btree_map = "string, string", tag = "7")]
    pub tags: BTreeMap<String, String>,
    #[prost(enumeration = "WireConfusionMatrixType", tag = "8")]
    pub cm: i32,
    /// `-1` when unmatched.
    #[prost(int32, tag = "9")]
    pub det_link_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireRect {
    #[prost(double, tag = "1")]
    pub xmin: f64,
    #[prost(double, tag = "2")]
    pub ymin: f64,
    #[prost(double, tag = "3")]
    pub xmax: f64,
    #[prost(double, tag = "4")]
    pub ymax: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePoint {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireModelMeta {
    #[prost(string, tag = "1")]
    pub model_hash: String,
    #[prost(string, tag = "2")]
    pub stage_name: String,
    #[prost(double, tag = "3")]
    pub mean_average_precision: f64,
    #[prost(string, repeated, tag = "4")]
    pub class_names: Vec<String>,
}

// keywords.mir

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireKeywords {
    #[prost(message, optional, tag = "1")]
    pub pred_idx: Option<WireKeywordIndex>,
    #[prost(message, optional, tag = "2")]
    pub gt_idx: Option<WireKeywordIndex>,
    /// Absent in format versions before 3.
    #[prost(message, optional, tag = "3")]
    pub context: Option<WireContext>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireKeywordIndex {
    #[prost(btree_map = "int32, message", tag = "1")]
    pub class_to_assets: BTreeMap<i32, WireAssetIdList>,
    #[prost(btree_map = "string, message", tag = "2")]
    pub asset_to_classes: BTreeMap<String, WireClassIdList>,
    #[prost(btree_map = "string, message", tag = "3")]
    pub tag_to_assets: BTreeMap<String, WireAssetIdList>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAssetIdList {
    #[prost(string, repeated, tag = "1")]
    pub asset_ids: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireClassIdList {
    #[prost(int32, repeated, tag = "1")]
    pub class_ids: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireContext {
    #[prost(uint64, tag = "1")]
    pub images_cnt: u64,
    #[prost(uint64, tag = "2")]
    pub total_asset_bytes: u64,
    #[prost(btree_map = "int32, uint64", tag = "3")]
    pub tvt_cnt: BTreeMap<i32, u64>,
    #[prost(message, optional, tag = "4")]
    pub pred_stats: Option<WireAnnoStats>,
    #[prost(message, optional, tag = "5")]
    pub gt_stats: Option<WireAnnoStats>,
    #[prost(int32, repeated, tag = "6")]
    pub project_class_ids: Vec<i32>,
    #[prost(uint64, tag = "7")]
    pub project_negative_images_cnt: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireAnnoStats {
    #[prost(uint64, tag = "1")]
    pub total_cnt: u64,
    #[prost(uint64, tag = "2")]
    pub positive_asset_cnt: u64,
    #[prost(uint64, tag = "3")]
    pub negative_asset_cnt: u64,
    #[prost(btree_map = "int32, uint64", tag = "4")]
    pub class_asset_cnt: BTreeMap<i32, u64>,
    #[prost(btree_map = "int32, uint64", tag = "5")]
    pub class_obj_cnt: BTreeMap<i32, u64>,
    #[prost(btree_map = "string, uint64", tag = "6")]
    pub tags_cnt: BTreeMap<String, u64>,
    #[prost(int32, repeated, tag = "7")]
    pub eval_class_ids: Vec<i32>,
}

// tasks.mir

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireTasks {
    #[prost(btree_map = "string, message", tag = "1")]
    pub tasks: BTreeMap<String, WireTask>,
    #[prost(string, tag = "2")]
    pub head_task_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireTask {
    #[prost(enumeration = "WireTaskType", tag = "1")]
    pub task_type: i32,
    #[prost(string, tag = "2")]
    pub task_id: String,
    #[prost(string, tag = "3")]
    pub ancestor_task_id: String,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    #[prost(int32, tag = "5")]
    pub return_code: i32,
    #[prost(string, tag = "6")]
    pub return_msg: String,
    #[prost(string, tag = "7")]
    pub serialized_task_parameters: String,
    #[prost(message, optional, tag = "8")]
    pub model: Option<WireModelMeta>,
    #[prost(message, optional, tag = "9")]
    pub evaluation: Option<WireEvaluation>,
    #[prost(string, repeated, tag = "10")]
    pub new_types_added: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireEvaluation {
    #[prost(message, optional, tag = "1")]
    pub config: Option<WireEvaluateConfig>,
    /// Keyed by the IoU threshold formatted with two decimals.
    #[prost(btree_map = "string, message", tag = "2")]
    pub iou_evaluations: BTreeMap<String, WireSingleIouEvaluation>,
    #[prost(message, optional, tag = "3")]
    pub iou_averaged: Option<WireSingleIouEvaluation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireEvaluateConfig {
    #[prost(double, tag = "1")]
    pub conf_thr: f64,
    #[prost(double, repeated, tag = "2")]
    pub iou_thrs: Vec<f64>,
    #[prost(bool, tag = "3")]
    pub need_pr_curve: bool,
    #[prost(int32, repeated, tag = "4")]
    pub class_ids: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireSingleIouEvaluation {
    #[prost(btree_map = "int32, message", tag = "1")]
    pub ci_evaluations: BTreeMap<i32, WireClassEvaluation>,
    #[prost(message, optional, tag = "2")]
    pub ci_averaged: Option<WireClassEvaluation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireClassEvaluation {
    #[prost(double, tag = "1")]
    pub ap: f64,
    #[prost(double, tag = "2")]
    pub ar: f64,
    #[prost(uint64, tag = "3")]
    pub tp: u64,
    #[prost(uint64, tag = "4")]
    pub fp: u64,
    #[prost(uint64, tag = "5")]
    pub fn_count: u64,
    #[prost(message, repeated, tag = "6")]
    pub pr_curve: Vec<WirePrPoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePrPoint {
    #[prost(double, tag = "1")]
    pub recall: f64,
    #[prost(double, tag = "2")]
    pub precision: f64,
    #[prost(double, tag = "3")]
    pub confidence: f64,
}
