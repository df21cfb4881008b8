//! Asset metadata collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ids::AssetId;

/// Media kind of an asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Unknown,
    ImageJpeg,
    ImagePng,
    ImageBmp,
    ImageWebp,
    Video,
}

impl AssetType {
    /// Guesses the asset type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => AssetType::ImageJpeg,
            "png" => AssetType::ImagePng,
            "bmp" => AssetType::ImageBmp,
            "webp" => AssetType::ImageWebp,
            "mp4" | "avi" | "mov" => AssetType::Video,
            _ => AssetType::Unknown,
        }
    }
}

/// Train / validation / test split tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TvtType {
    #[default]
    Unknown,
    Training,
    Validation,
    Test,
}

impl TvtType {
    /// Short prefix used in typed revs (`tr:branch@task`).
    pub fn prefix(&self) -> &'static str {
        match self {
            TvtType::Unknown => "",
            TvtType::Training => "tr",
            TvtType::Validation => "va",
            TvtType::Test => "te",
        }
    }
}

impl FromStr for TvtType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "unknown" => Ok(TvtType::Unknown),
            "tr" | "train" | "training" => Ok(TvtType::Training),
            "va" | "val" | "validation" => Ok(TvtType::Validation),
            "te" | "test" => Ok(TvtType::Test),
            other => Err(format!("unknown split type '{other}' (expected tr, va or te)")),
        }
    }
}

impl fmt::Display for TvtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TvtType::Unknown => "unknown",
            TvtType::Training => "training",
            TvtType::Validation => "validation",
            TvtType::Test => "test",
        };
        f.write_str(name)
    }
}

/// Metadata of one asset. Immutable once the asset is hashed, except for the
/// split tag which merge may restamp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub asset_type: AssetType,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub byte_size: u64,
    /// File name the asset was imported from.
    #[serde(default)]
    pub origin_name: String,
    #[serde(default)]
    pub dataset_name: String,
    #[serde(default)]
    pub tvt_type: TvtType,
    /// Ingestion time, unix seconds.
    pub timestamp: i64,
}

impl AssetMeta {
    /// Creates metadata for an image of the given dimensions.
    pub fn new(asset_type: AssetType, width: u32, height: u32) -> Self {
        Self {
            asset_type,
            width,
            height,
            channels: 3,
            ..Default::default()
        }
    }

    /// Sets the split tag.
    pub fn with_tvt_type(mut self, tvt_type: TvtType) -> Self {
        self.tvt_type = tvt_type;
        self
    }

    /// Sets the byte size.
    pub fn with_byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = byte_size;
        self
    }
}

/// All asset metadata of one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadatas {
    pub attributes: BTreeMap<AssetId, AssetMeta>,
}

impl Metadatas {
    /// Number of assets.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if there are no assets.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns true if the asset is present.
    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.attributes.contains_key(asset_id)
    }

    /// Iterates over asset ids in order.
    pub fn asset_ids(&self) -> impl Iterator<Item = &AssetId> {
        self.attributes.keys()
    }
}
