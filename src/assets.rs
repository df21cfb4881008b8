//! Content-addressed media store (`.mir_assets/`).
//!
//! An asset's id is the SHA-256 of its bytes and its blob lives at
//! `<store>/<first two hex chars>/<id>`, so storing the same bytes twice is
//! a no-op.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::MirError;
use crate::model::{AssetId, AssetMeta, AssetType};

/// Default blob directory name under the repository root.
pub const ASSET_DIR: &str = ".mir_assets";

/// File extensions picked up when importing a media directory.
pub const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Clone, Debug)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn path_of(&self, asset_id: &AssetId) -> PathBuf {
        let id = asset_id.as_str();
        let shard = id.get(0..2).unwrap_or("xx");
        self.root.join(shard).join(id)
    }

    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.path_of(asset_id).is_file()
    }

    /// Stores bytes and returns their id.
    pub fn put(&self, bytes: &[u8]) -> Result<AssetId, MirError> {
        let asset_id = AssetId::new(hex::encode(Sha256::digest(bytes)));
        let dest = self.path_of(&asset_id);
        if dest.is_file() {
            return Ok(asset_id);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = dest.with_extension(format!("{}.partial", std::process::id()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &dest)?;
        Ok(asset_id)
    }

    pub fn read(&self, asset_id: &AssetId) -> Result<Vec<u8>, MirError> {
        Ok(fs::read(self.path_of(asset_id))?)
    }

    /// Copies one blob from another store unless already present.
    /// Returns true if a copy was made.
    pub fn copy_from(&self, other: &AssetStore, asset_id: &AssetId) -> Result<bool, MirError> {
        if self.contains(asset_id) {
            return Ok(false);
        }
        let bytes = other.read(asset_id)?;
        let stored = self.put(&bytes)?;
        if &stored != asset_id {
            return Err(MirError::InvalidRepo {
                path: other.root.clone(),
                message: format!("blob {asset_id} does not match its content hash"),
            });
        }
        Ok(true)
    }
}

/// Reads metadata for a media file from its bytes.
///
/// Non-image files and unreadable headers yield an `Unknown` asset with zero
/// dimensions rather than an error.
pub fn probe_asset(path: &Path, bytes: &[u8]) -> AssetMeta {
    let asset_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(AssetType::from_extension)
        .unwrap_or(AssetType::Unknown);
    let (width, height) = match imagesize::blob_size(bytes) {
        Ok(size) => (
            u32::try_from(size.width).unwrap_or(u32::MAX),
            u32::try_from(size.height).unwrap_or(u32::MAX),
        ),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read image dimensions");
            (0, 0)
        }
    };
    let mut meta = AssetMeta::new(asset_type, width, height).with_byte_size(bytes.len() as u64);
    meta.origin_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    meta
}

/// Media files under `dir`, sorted by path.
pub fn collect_media_files(dir: &Path) -> Result<Vec<PathBuf>, MirError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|source| MirError::MediaDirectory {
            path: dir.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;
        if entry.file_type().is_file() && has_media_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn has_media_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    MEDIA_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
}
