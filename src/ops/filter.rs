//! Filter engine: keeps the assets whose classes match include/exclude sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::MirError;
use crate::labels::LabelSpace;
use crate::model::{Annotations, AssetId, ClassId, Metadatas, TvtType};

/// Filter options. Class names are resolved through the label space.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Keep assets carrying at least one of these classes. Empty keeps all.
    #[serde(default)]
    pub include: Vec<String>,
    /// Drop assets carrying any of these classes.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Keep at most this many assets, the first ones in id order.
    #[serde(default)]
    pub sample_count: Option<usize>,
    /// Keep only assets of this split.
    #[serde(default)]
    pub tvt_type: Option<TvtType>,
}

#[derive(Clone, Debug, Default)]
pub struct FilterOutput {
    pub metadatas: Metadatas,
    pub annotations: Annotations,
    pub dropped: usize,
}

/// Applies `opts` to a snapshot's metadata and annotations.
///
/// An asset is kept iff its classes (both channels) meet the include set,
/// avoid the exclude set, and its split matches. Filtering the output again
/// with the same options returns it unchanged.
///
/// # Errors
/// [`MirError::InvalidArgs`] if a class name is not in `labels`.
pub fn filter_snapshot(
    metadatas: &Metadatas,
    annotations: &Annotations,
    labels: &LabelSpace,
    opts: &FilterOptions,
) -> Result<FilterOutput, MirError> {
    let include: BTreeSet<ClassId> = labels.resolve_names(&opts.include)?.into_iter().collect();
    let exclude: BTreeSet<ClassId> = labels.resolve_names(&opts.exclude)?.into_iter().collect();

    let keep = |asset_id: &AssetId| {
        let classes = annotations.class_ids_of(asset_id);
        (include.is_empty() || !classes.is_disjoint(&include))
            && (exclude.is_empty() || classes.is_disjoint(&exclude))
    };

    let mut kept: BTreeSet<AssetId> = metadatas
        .attributes
        .iter()
        .filter(|(_, meta)| opts.tvt_type.is_none_or(|tvt| meta.tvt_type == tvt))
        .map(|(asset_id, _)| asset_id)
        .filter(|asset_id| keep(asset_id))
        .cloned()
        .collect();
    if let Some(count) = opts.sample_count {
        kept = kept.into_iter().take(count).collect();
    }

    let mut out = FilterOutput {
        metadatas: metadatas.clone(),
        annotations: annotations.clone(),
        dropped: 0,
    };
    out.metadatas
        .attributes
        .retain(|asset_id, _| kept.contains(asset_id));
    out.annotations.retain_assets(|asset_id| kept.contains(asset_id));
    out.dropped = metadatas.len() - out.metadatas.len();
    tracing::debug!(kept = kept.len(), dropped = out.dropped, "filtered");
    Ok(out)
}
