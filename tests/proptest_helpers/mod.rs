#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use mirvcs::model::{
    AnnotationSet, Annotations, AssetId, AssetMeta, AssetType, BBox, ClassId, Metadatas,
    ObjectAnnotation, Snapshot, Task, TaskId, TaskType, Tasks, TvtType,
};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const IMAGE_SIDE: u32 = 100;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Well-formed asset id for position `i`.
pub fn asset_id(i: usize) -> AssetId {
    AssetId::from_bytes(format!("asset-{i}").as_bytes())
}

pub fn arb_tvt() -> impl Strategy<Value = TvtType> {
    prop_oneof![
        Just(TvtType::Unknown),
        Just(TvtType::Training),
        Just(TvtType::Validation),
        Just(TvtType::Test),
    ]
}

/// A box inside a `IMAGE_SIDE` square image, at least one pixel wide.
pub fn arb_bbox() -> impl Strategy<Value = BBox> {
    (0u32..90, 0u32..90, 1u32..=10, 1u32..=10).prop_map(|(x, y, w, h)| {
        BBox::from_xywh(x as f64, y as f64, w as f64, h as f64)
    })
}

pub fn arb_object(max_classes: i32) -> impl Strategy<Value = (i32, BBox, f64)> {
    (0..max_classes, arb_bbox(), 0.0f64..=1.0)
}

/// Objects for each of `assets` positions, indices dense per asset.
pub fn arb_annotation_set(
    assets: usize,
    max_classes: i32,
    max_objects: usize,
) -> BoxedStrategy<AnnotationSet> {
    prop::collection::vec(
        prop::collection::vec(arb_object(max_classes), 0..=max_objects),
        assets,
    )
    .prop_map(|per_asset| {
        let mut set = AnnotationSet::default();
        for (i, objects) in per_asset.into_iter().enumerate() {
            if objects.is_empty() {
                continue;
            }
            let objects = objects
                .into_iter()
                .enumerate()
                .map(|(index, (class, bbox, score))| {
                    ObjectAnnotation::new(index as u32, class, bbox).with_score(score)
                })
                .collect();
            set.image_annotations.insert(asset_id(i), objects);
        }
        set
    })
    .boxed()
}

pub fn metadatas_for(tvts: &[TvtType]) -> Metadatas {
    let mut metadatas = Metadatas::default();
    for (i, tvt) in tvts.iter().enumerate() {
        metadatas.attributes.insert(
            asset_id(i),
            AssetMeta::new(AssetType::ImageJpeg, IMAGE_SIDE, IMAGE_SIDE)
                .with_tvt_type(*tvt)
                .with_byte_size(1024),
        );
    }
    metadatas
}

/// Metadata and both annotation channels over up to `max_assets` assets.
pub fn arb_content(
    max_assets: usize,
    max_classes: i32,
    max_objects: usize,
) -> BoxedStrategy<(Metadatas, Annotations)> {
    (0..=max_assets)
        .prop_flat_map(move |n| {
            (
                prop::collection::vec(arb_tvt(), n),
                arb_annotation_set(n, max_classes, max_objects),
                arb_annotation_set(n, max_classes, max_objects),
            )
        })
        .prop_map(|(tvts, prediction, ground_truth)| {
            (
                metadatas_for(&tvts),
                Annotations {
                    prediction,
                    ground_truth,
                },
            )
        })
        .boxed()
}

/// A full snapshot with a head task; keywords left empty.
pub fn arb_snapshot(max_assets: usize, max_classes: i32, max_objects: usize) -> BoxedStrategy<Snapshot> {
    arb_content(max_assets, max_classes, max_objects)
        .prop_map(|(metadatas, annotations)| Snapshot {
            metadatas,
            annotations,
            keywords: Default::default(),
            tasks: Tasks::with_head(Task::new(TaskType::Import, TaskId::new("t0"))),
        })
        .boxed()
}

pub fn asset_set(metadatas: &Metadatas) -> BTreeSet<AssetId> {
    metadatas.attributes.keys().cloned().collect()
}

/// Class ids per asset over both channels.
pub fn classes_by_asset(annotations: &Annotations) -> BTreeMap<AssetId, BTreeSet<ClassId>> {
    let mut out: BTreeMap<AssetId, BTreeSet<ClassId>> = BTreeMap::new();
    for set in [&annotations.prediction, &annotations.ground_truth] {
        for (asset_id, objects) in &set.image_annotations {
            out.entry(asset_id.clone())
                .or_default()
                .extend(objects.iter().map(|o| o.class_id));
        }
    }
    out
}
