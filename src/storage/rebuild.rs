//! Derivation of the keywords collection from metadata and annotations.

use std::collections::BTreeSet;

use crate::model::{
    AnnoStats, AnnotationSet, Annotations, ClassId, Context, KeywordIndex, Keywords, Metadatas,
};

/// Rebuilds both keyword indices and the context.
///
/// This is the only producer of [`Keywords`]; the storage engine calls it on
/// every commit, so stored keywords always reflect the stored annotations.
pub fn rebuild_keywords(
    metadatas: &Metadatas,
    annotations: &Annotations,
    project_class_ids: &[ClassId],
) -> Keywords {
    Keywords {
        prediction: build_index(&annotations.prediction),
        ground_truth: build_index(&annotations.ground_truth),
        context: build_context(metadatas, annotations, project_class_ids),
    }
}

/// Builds the lookup tables of one channel.
pub fn build_index(set: &AnnotationSet) -> KeywordIndex {
    let mut index = KeywordIndex::default();
    for (asset_id, objects) in &set.image_annotations {
        for object in objects {
            index
                .class_to_assets
                .entry(object.class_id)
                .or_default()
                .insert(asset_id.clone());
            index
                .asset_to_classes
                .entry(asset_id.clone())
                .or_default()
                .insert(object.class_id);
            for tag in object.tags.keys() {
                index
                    .tag_to_assets
                    .entry(tag.clone())
                    .or_default()
                    .insert(asset_id.clone());
            }
        }
    }
    index
}

fn build_stats(metadatas: &Metadatas, set: &AnnotationSet) -> AnnoStats {
    let mut stats = AnnoStats {
        eval_class_ids: set.eval_class_ids.clone(),
        ..Default::default()
    };
    for (asset_id, objects) in &set.image_annotations {
        if objects.is_empty() {
            continue;
        }
        if metadatas.contains(asset_id) {
            stats.positive_asset_cnt += 1;
        }
        let classes: BTreeSet<ClassId> = objects.iter().map(|o| o.class_id).collect();
        for class_id in classes {
            *stats.class_asset_cnt.entry(class_id).or_default() += 1;
        }
        for object in objects {
            stats.total_cnt += 1;
            *stats.class_obj_cnt.entry(object.class_id).or_default() += 1;
            for tag in object.tags.keys() {
                *stats.tags_cnt.entry(tag.clone()).or_default() += 1;
            }
        }
    }
    stats.negative_asset_cnt = (metadatas.len() as u64).saturating_sub(stats.positive_asset_cnt);
    stats
}

fn build_context(
    metadatas: &Metadatas,
    annotations: &Annotations,
    project_class_ids: &[ClassId],
) -> Context {
    let mut context = Context {
        images_cnt: metadatas.len() as u64,
        pred_stats: build_stats(metadatas, &annotations.prediction),
        gt_stats: build_stats(metadatas, &annotations.ground_truth),
        project_class_ids: project_class_ids.to_vec(),
        ..Default::default()
    };
    for meta in metadatas.attributes.values() {
        context.total_asset_bytes += meta.byte_size;
        *context.tvt_cnt.entry(meta.tvt_type).or_default() += 1;
    }
    if !project_class_ids.is_empty() {
        let project: BTreeSet<ClassId> = project_class_ids.iter().copied().collect();
        context.project_negative_images_cnt = metadatas
            .asset_ids()
            .filter(|asset_id| annotations.class_ids_of(asset_id).is_disjoint(&project))
            .count() as u64;
    }
    context
}
