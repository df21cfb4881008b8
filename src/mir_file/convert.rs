//! Conversions between the domain model and the wire messages.

use std::collections::BTreeMap;

use super::wire::*;
use crate::eval::{ClassEvaluation, EvaluateConfig, Evaluation, PrPoint, SingleIouEvaluation};
use crate::model::{
    AnnoStats, AnnotationSet, Annotations, AssetId, AssetMeta, AssetType, BBox, ClassId,
    ConfusionMatrixType, Context, Coord, Geometry, KeywordIndex, Keywords, Metadatas, ModelMeta,
    ObjectAnnotation, Task, TaskId, TaskType, Tasks, TvtType,
};

// enums

fn asset_type_to_wire(t: AssetType) -> WireAssetType {
    match t {
        AssetType::Unknown => WireAssetType::Unknown,
        AssetType::ImageJpeg => WireAssetType::ImageJpeg,
        AssetType::ImagePng => WireAssetType::ImagePng,
        AssetType::ImageBmp => WireAssetType::ImageBmp,
        AssetType::ImageWebp => WireAssetType::ImageWebp,
        AssetType::Video => WireAssetType::Video,
    }
}

fn asset_type_from_wire(t: WireAssetType) -> AssetType {
    match t {
        WireAssetType::Unknown => AssetType::Unknown,
        WireAssetType::ImageJpeg => AssetType::ImageJpeg,
        WireAssetType::ImagePng => AssetType::ImagePng,
        WireAssetType::ImageBmp => AssetType::ImageBmp,
        WireAssetType::ImageWebp => AssetType::ImageWebp,
        WireAssetType::Video => AssetType::Video,
    }
}

pub(crate) fn tvt_to_wire(t: TvtType) -> WireTvtType {
    match t {
        TvtType::Unknown => WireTvtType::Unknown,
        TvtType::Training => WireTvtType::Training,
        TvtType::Validation => WireTvtType::Validation,
        TvtType::Test => WireTvtType::Test,
    }
}

pub(crate) fn tvt_from_wire(t: WireTvtType) -> TvtType {
    match t {
        WireTvtType::Unknown => TvtType::Unknown,
        WireTvtType::Training => TvtType::Training,
        WireTvtType::Validation => TvtType::Validation,
        WireTvtType::Test => TvtType::Test,
    }
}

fn cm_to_wire(cm: ConfusionMatrixType) -> WireConfusionMatrixType {
    match cm {
        ConfusionMatrixType::NotSet => WireConfusionMatrixType::NotSet,
        ConfusionMatrixType::Tp => WireConfusionMatrixType::Tp,
        ConfusionMatrixType::Fp => WireConfusionMatrixType::Fp,
        ConfusionMatrixType::Fn => WireConfusionMatrixType::Fn,
        ConfusionMatrixType::Tn => WireConfusionMatrixType::Tn,
        ConfusionMatrixType::Unknown => WireConfusionMatrixType::Unknown,
        ConfusionMatrixType::Mtp => WireConfusionMatrixType::Mtp,
        ConfusionMatrixType::Ignored => WireConfusionMatrixType::Ignored,
    }
}

fn cm_from_wire(cm: WireConfusionMatrixType) -> ConfusionMatrixType {
    match cm {
        WireConfusionMatrixType::NotSet => ConfusionMatrixType::NotSet,
        WireConfusionMatrixType::Tp => ConfusionMatrixType::Tp,
        WireConfusionMatrixType::Fp => ConfusionMatrixType::Fp,
        WireConfusionMatrixType::Fn => ConfusionMatrixType::Fn,
        WireConfusionMatrixType::Tn => ConfusionMatrixType::Tn,
        WireConfusionMatrixType::Unknown => ConfusionMatrixType::Unknown,
        WireConfusionMatrixType::Mtp => ConfusionMatrixType::Mtp,
        WireConfusionMatrixType::Ignored => ConfusionMatrixType::Ignored,
    }
}

fn task_type_to_wire(t: TaskType) -> WireTaskType {
    match t {
        TaskType::Unknown => WireTaskType::Unknown,
        TaskType::Init => WireTaskType::Init,
        TaskType::Import => WireTaskType::Import,
        TaskType::Filter => WireTaskType::Filter,
        TaskType::Merge => WireTaskType::Merge,
        TaskType::Copy => WireTaskType::Copy,
        TaskType::Training => WireTaskType::Training,
        TaskType::Mining => WireTaskType::Mining,
        TaskType::Infer => WireTaskType::Infer,
        TaskType::Evaluate => WireTaskType::Evaluate,
        TaskType::Update => WireTaskType::Update,
    }
}

fn task_type_from_wire(t: WireTaskType) -> TaskType {
    match t {
        WireTaskType::Unknown => TaskType::Unknown,
        WireTaskType::Init => TaskType::Init,
        WireTaskType::Import => TaskType::Import,
        WireTaskType::Filter => TaskType::Filter,
        WireTaskType::Merge => TaskType::Merge,
        WireTaskType::Copy => TaskType::Copy,
        WireTaskType::Training => TaskType::Training,
        WireTaskType::Mining => TaskType::Mining,
        WireTaskType::Infer => TaskType::Infer,
        WireTaskType::Evaluate => TaskType::Evaluate,
        WireTaskType::Update => TaskType::Update,
    }
}

fn class_ids_to_wire(ids: &[ClassId]) -> Vec<i32> {
    ids.iter().map(ClassId::as_i32).collect()
}

fn class_ids_from_wire(ids: &[i32]) -> Vec<ClassId> {
    ids.iter().copied().map(ClassId::new).collect()
}

// metadatas

pub(crate) fn metadatas_to_wire(metadatas: &Metadatas) -> WireMetadatas {
    let attributes = metadatas
        .attributes
        .iter()
        .map(|(asset_id, meta)| {
            let wire = WireAssetAttributes {
                asset_type: asset_type_to_wire(meta.asset_type) as i32,
                width: meta.width,
                height: meta.height,
                channels: meta.channels,
                byte_size: meta.byte_size,
                origin_name: meta.origin_name.clone(),
                dataset_name: meta.dataset_name.clone(),
                tvt_type: tvt_to_wire(meta.tvt_type) as i32,
                timestamp: meta.timestamp,
            };
            (asset_id.as_str().to_string(), wire)
        })
        .collect();
    WireMetadatas { attributes }
}

pub(crate) fn metadatas_from_wire(wire: WireMetadatas) -> Metadatas {
    let attributes = wire
        .attributes
        .into_iter()
        .map(|(asset_id, attrs)| {
            let meta = AssetMeta {
                asset_type: asset_type_from_wire(attrs.asset_type()),
                width: attrs.width,
                height: attrs.height,
                channels: attrs.channels,
                byte_size: attrs.byte_size,
                origin_name: attrs.origin_name.clone(),
                dataset_name: attrs.dataset_name.clone(),
                tvt_type: tvt_from_wire(attrs.tvt_type()),
                timestamp: attrs.timestamp,
            };
            (AssetId::new(asset_id), meta)
        })
        .collect();
    Metadatas { attributes }
}

// annotations

fn model_to_wire(model: &ModelMeta) -> WireModelMeta {
    WireModelMeta {
        model_hash: model.model_hash.clone(),
        stage_name: model.stage_name.clone(),
        mean_average_precision: model.mean_average_precision,
        class_names: model.class_names.clone(),
    }
}

fn model_from_wire(model: WireModelMeta) -> ModelMeta {
    ModelMeta {
        model_hash: model.model_hash,
        stage_name: model.stage_name,
        mean_average_precision: model.mean_average_precision,
        class_names: model.class_names,
    }
}

fn object_to_wire(object: &ObjectAnnotation) -> WireObjectAnnotation {
    let (rect, polygon) = match &object.geometry {
        Geometry::Box(bbox) => (
            Some(WireRect {
                xmin: bbox.xmin,
                ymin: bbox.ymin,
                xmax: bbox.xmax,
                ymax: bbox.ymax,
            }),
            Vec::new(),
        ),
        Geometry::Polygon(points) => (
            None,
            points
                .iter()
                .map(|p| WirePoint { x: p.x, y: p.y })
                .collect(),
        ),
    };
    WireObjectAnnotation {
        index: object.index as i32,
        class_id: object.class_id.as_i32(),
        rect,
        polygon,
        score: object.score,
        anno_quality: object.anno_quality,
        tags: object.tags.clone(),
        cm: cm_to_wire(object.cm) as i32,
        det_link_id: object.det_link_id.map(|i| i as i32).unwrap_or(-1),
    }
}

fn object_from_wire(wire: WireObjectAnnotation) -> ObjectAnnotation {
    let cm = cm_from_wire(wire.cm());
    let geometry = match wire.rect {
        Some(rect) => Geometry::Box(BBox::from_xyxy(rect.xmin, rect.ymin, rect.xmax, rect.ymax)),
        None => Geometry::Polygon(wire.polygon.iter().map(|p| Coord::new(p.x, p.y)).collect()),
    };
    ObjectAnnotation {
        index: wire.index.max(0) as u32,
        class_id: ClassId::new(wire.class_id),
        geometry,
        score: wire.score,
        anno_quality: wire.anno_quality,
        tags: wire.tags,
        cm,
        det_link_id: u32::try_from(wire.det_link_id).ok(),
    }
}

fn annotation_set_to_wire(set: &AnnotationSet) -> WireAnnotationSet {
    WireAnnotationSet {
        image_annotations: set
            .image_annotations
            .iter()
            .map(|(asset_id, objects)| {
                (
                    asset_id.as_str().to_string(),
                    WireImageAnnotations {
                        objects: objects.iter().map(object_to_wire).collect(),
                    },
                )
            })
            .collect(),
        task_id: set.task_id.as_str().to_string(),
        eval_class_ids: class_ids_to_wire(&set.eval_class_ids),
        model: set.model.as_ref().map(model_to_wire),
        executor_config: set.executor_config.clone(),
    }
}

fn annotation_set_from_wire(wire: WireAnnotationSet) -> AnnotationSet {
    AnnotationSet {
        image_annotations: wire
            .image_annotations
            .into_iter()
            .map(|(asset_id, image)| {
                (
                    AssetId::new(asset_id),
                    image.objects.into_iter().map(object_from_wire).collect(),
                )
            })
            .collect(),
        task_id: TaskId::new(wire.task_id),
        eval_class_ids: class_ids_from_wire(&wire.eval_class_ids),
        model: wire.model.map(model_from_wire),
        executor_config: wire.executor_config,
    }
}

pub(crate) fn annotations_to_wire(annotations: &Annotations) -> WireAnnotations {
    WireAnnotations {
        prediction: Some(annotation_set_to_wire(&annotations.prediction)),
        ground_truth: Some(annotation_set_to_wire(&annotations.ground_truth)),
    }
}

pub(crate) fn annotations_from_wire(wire: WireAnnotations) -> Annotations {
    Annotations {
        prediction: wire
            .prediction
            .map(annotation_set_from_wire)
            .unwrap_or_default(),
        ground_truth: wire
            .ground_truth
            .map(annotation_set_from_wire)
            .unwrap_or_default(),
    }
}

// keywords

fn keyword_index_to_wire(index: &KeywordIndex) -> WireKeywordIndex {
    let asset_list = |ids: &std::collections::BTreeSet<AssetId>| WireAssetIdList {
        asset_ids: ids.iter().map(|a| a.as_str().to_string()).collect(),
    };
    WireKeywordIndex {
        class_to_assets: index
            .class_to_assets
            .iter()
            .map(|(class_id, assets)| (class_id.as_i32(), asset_list(assets)))
            .collect(),
        asset_to_classes: index
            .asset_to_classes
            .iter()
            .map(|(asset_id, classes)| {
                (
                    asset_id.as_str().to_string(),
                    WireClassIdList {
                        class_ids: classes.iter().map(ClassId::as_i32).collect(),
                    },
                )
            })
            .collect(),
        tag_to_assets: index
            .tag_to_assets
            .iter()
            .map(|(tag, assets)| (tag.clone(), asset_list(assets)))
            .collect(),
    }
}

fn keyword_index_from_wire(wire: WireKeywordIndex) -> KeywordIndex {
    let assets = |list: WireAssetIdList| list.asset_ids.into_iter().map(AssetId::new).collect();
    KeywordIndex {
        class_to_assets: wire
            .class_to_assets
            .into_iter()
            .map(|(class_id, list)| (ClassId::new(class_id), assets(list)))
            .collect(),
        asset_to_classes: wire
            .asset_to_classes
            .into_iter()
            .map(|(asset_id, list)| {
                (
                    AssetId::new(asset_id),
                    list.class_ids.into_iter().map(ClassId::new).collect(),
                )
            })
            .collect(),
        tag_to_assets: wire
            .tag_to_assets
            .into_iter()
            .map(|(tag, list)| (tag, assets(list)))
            .collect(),
    }
}

fn class_counts_to_wire(counts: &BTreeMap<ClassId, u64>) -> BTreeMap<i32, u64> {
    counts.iter().map(|(k, v)| (k.as_i32(), *v)).collect()
}

fn class_counts_from_wire(counts: BTreeMap<i32, u64>) -> BTreeMap<ClassId, u64> {
    counts.into_iter().map(|(k, v)| (ClassId::new(k), v)).collect()
}

fn stats_to_wire(stats: &AnnoStats) -> WireAnnoStats {
    WireAnnoStats {
        total_cnt: stats.total_cnt,
        positive_asset_cnt: stats.positive_asset_cnt,
        negative_asset_cnt: stats.negative_asset_cnt,
        class_asset_cnt: class_counts_to_wire(&stats.class_asset_cnt),
        class_obj_cnt: class_counts_to_wire(&stats.class_obj_cnt),
        tags_cnt: stats.tags_cnt.clone(),
        eval_class_ids: class_ids_to_wire(&stats.eval_class_ids),
    }
}

fn stats_from_wire(wire: WireAnnoStats) -> AnnoStats {
    AnnoStats {
        total_cnt: wire.total_cnt,
        positive_asset_cnt: wire.positive_asset_cnt,
        negative_asset_cnt: wire.negative_asset_cnt,
        class_asset_cnt: class_counts_from_wire(wire.class_asset_cnt),
        class_obj_cnt: class_counts_from_wire(wire.class_obj_cnt),
        tags_cnt: wire.tags_cnt,
        eval_class_ids: class_ids_from_wire(&wire.eval_class_ids),
    }
}

fn context_to_wire(context: &Context) -> WireContext {
    WireContext {
        images_cnt: context.images_cnt,
        total_asset_bytes: context.total_asset_bytes,
        tvt_cnt: context
            .tvt_cnt
            .iter()
            .map(|(tvt, cnt)| (tvt_to_wire(*tvt) as i32, *cnt))
            .collect(),
        pred_stats: Some(stats_to_wire(&context.pred_stats)),
        gt_stats: Some(stats_to_wire(&context.gt_stats)),
        project_class_ids: class_ids_to_wire(&context.project_class_ids),
        project_negative_images_cnt: context.project_negative_images_cnt,
    }
}

fn context_from_wire(wire: WireContext) -> Context {
    Context {
        images_cnt: wire.images_cnt,
        total_asset_bytes: wire.total_asset_bytes,
        tvt_cnt: wire
            .tvt_cnt
            .into_iter()
            .map(|(tvt, cnt)| {
                let tvt = WireTvtType::try_from(tvt).unwrap_or(WireTvtType::Unknown);
                (tvt_from_wire(tvt), cnt)
            })
            .collect(),
        pred_stats: wire.pred_stats.map(stats_from_wire).unwrap_or_default(),
        gt_stats: wire.gt_stats.map(stats_from_wire).unwrap_or_default(),
        project_class_ids: class_ids_from_wire(&wire.project_class_ids),
        project_negative_images_cnt: wire.project_negative_images_cnt,
    }
}

pub(crate) fn keywords_to_wire(keywords: &Keywords) -> WireKeywords {
    WireKeywords {
        pred_idx: Some(keyword_index_to_wire(&keywords.prediction)),
        gt_idx: Some(keyword_index_to_wire(&keywords.ground_truth)),
        context: Some(context_to_wire(&keywords.context)),
    }
}

pub(crate) fn keywords_from_wire(wire: WireKeywords) -> Keywords {
    Keywords {
        prediction: wire.pred_idx.map(keyword_index_from_wire).unwrap_or_default(),
        ground_truth: wire.gt_idx.map(keyword_index_from_wire).unwrap_or_default(),
        context: wire.context.map(context_from_wire).unwrap_or_default(),
    }
}

// tasks

fn class_evaluation_to_wire(ce: &ClassEvaluation) -> WireClassEvaluation {
    WireClassEvaluation {
        ap: ce.ap,
        ar: ce.ar,
        tp: ce.tp,
        fp: ce.fp,
        fn_count: ce.fn_count,
        pr_curve: ce
            .pr_curve
            .iter()
            .map(|p| WirePrPoint {
                recall: p.recall,
                precision: p.precision,
                confidence: p.confidence,
            })
            .collect(),
    }
}

fn class_evaluation_from_wire(wire: WireClassEvaluation) -> ClassEvaluation {
    ClassEvaluation {
        ap: wire.ap,
        ar: wire.ar,
        tp: wire.tp,
        fp: wire.fp,
        fn_count: wire.fn_count,
        pr_curve: wire
            .pr_curve
            .into_iter()
            .map(|p| PrPoint {
                recall: p.recall,
                precision: p.precision,
                confidence: p.confidence,
            })
            .collect(),
    }
}

fn single_iou_to_wire(single: &SingleIouEvaluation) -> WireSingleIouEvaluation {
    WireSingleIouEvaluation {
        ci_evaluations: single
            .ci_evaluations
            .iter()
            .map(|(class_id, ce)| (class_id.as_i32(), class_evaluation_to_wire(ce)))
            .collect(),
        ci_averaged: Some(class_evaluation_to_wire(&single.ci_averaged)),
    }
}

fn single_iou_from_wire(wire: WireSingleIouEvaluation) -> SingleIouEvaluation {
    SingleIouEvaluation {
        ci_evaluations: wire
            .ci_evaluations
            .into_iter()
            .map(|(class_id, ce)| (ClassId::new(class_id), class_evaluation_from_wire(ce)))
            .collect(),
        ci_averaged: wire
            .ci_averaged
            .map(class_evaluation_from_wire)
            .unwrap_or_default(),
    }
}

fn evaluation_to_wire(evaluation: &Evaluation) -> WireEvaluation {
    let config = &evaluation.config;
    WireEvaluation {
        config: Some(WireEvaluateConfig {
            conf_thr: config.conf_thr,
            iou_thrs: config.iou_thrs.clone(),
            need_pr_curve: config.need_pr_curve,
            class_ids: class_ids_to_wire(&config.class_ids),
        }),
        iou_evaluations: evaluation
            .iou_evaluations
            .iter()
            .map(|(key, single)| (key.clone(), single_iou_to_wire(single)))
            .collect(),
        iou_averaged: Some(single_iou_to_wire(&evaluation.iou_averaged)),
    }
}

fn evaluation_from_wire(wire: WireEvaluation) -> Evaluation {
    let config = wire
        .config
        .map(|c| EvaluateConfig {
            conf_thr: c.conf_thr,
            iou_thrs: c.iou_thrs,
            need_pr_curve: c.need_pr_curve,
            class_ids: class_ids_from_wire(&c.class_ids),
        })
        .unwrap_or_default();
    Evaluation {
        config,
        iou_evaluations: wire
            .iou_evaluations
            .into_iter()
            .map(|(key, single)| (key, single_iou_from_wire(single)))
            .collect(),
        iou_averaged: wire
            .iou_averaged
            .map(single_iou_from_wire)
            .unwrap_or_default(),
    }
}

fn task_to_wire(task: &Task) -> WireTask {
    WireTask {
        task_type: task_type_to_wire(task.task_type) as i32,
        task_id: task.task_id.as_str().to_string(),
        ancestor_task_id: task.ancestor_task_id.as_str().to_string(),
        timestamp: task.timestamp,
        return_code: task.return_code,
        return_msg: task.return_msg.clone(),
        serialized_task_parameters: task.serialized_task_parameters.clone(),
        model: task.model.as_ref().map(model_to_wire),
        evaluation: task.evaluation.as_ref().map(evaluation_to_wire),
        new_types_added: task.new_types_added.clone(),
    }
}

fn task_from_wire(wire: WireTask) -> Task {
    Task {
        task_type: task_type_from_wire(wire.task_type()),
        task_id: TaskId::new(wire.task_id),
        ancestor_task_id: TaskId::new(wire.ancestor_task_id),
        timestamp: wire.timestamp,
        return_code: wire.return_code,
        return_msg: wire.return_msg,
        serialized_task_parameters: wire.serialized_task_parameters,
        model: wire.model.map(model_from_wire),
        evaluation: wire.evaluation.map(evaluation_from_wire),
        new_types_added: wire.new_types_added,
    }
}

pub(crate) fn tasks_to_wire(tasks: &Tasks) -> WireTasks {
    WireTasks {
        tasks: tasks
            .tasks
            .iter()
            .map(|(task_id, task)| (task_id.as_str().to_string(), task_to_wire(task)))
            .collect(),
        head_task_id: tasks.head_task_id.as_str().to_string(),
    }
}

pub(crate) fn tasks_from_wire(wire: WireTasks) -> Tasks {
    Tasks {
        tasks: wire
            .tasks
            .into_iter()
            .map(|(task_id, task)| (TaskId::new(task_id), task_from_wire(task)))
            .collect(),
        head_task_id: TaskId::new(wire.head_task_id),
    }
}
