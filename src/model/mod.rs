//! Snapshot data model.
//!
//! A snapshot holds four coupled collections:
//!
//! 1. **Metadatas**: asset id (content hash) -> asset metadata.
//! 2. **Annotations**: prediction and ground-truth channels, each mapping
//!    asset id -> ordered object annotations.
//! 3. **Keywords**: derived lookup tables and aggregate context, rebuilt on
//!    every commit.
//! 4. **Tasks**: the provenance record of the command that made the commit.
//!
//! These types are permissive: a snapshot with broken invariants can be
//! represented so that [`crate::validation`] can report what is wrong.
//!
//! # Example
//!
//! ```
//! use mirvcs::model::{AssetId, AssetMeta, AssetType, BBox, ObjectAnnotation, Snapshot};
//!
//! let asset_id = AssetId::from_bytes(b"image bytes");
//! let mut snapshot = Snapshot::default();
//! snapshot
//!     .metadatas
//!     .attributes
//!     .insert(asset_id.clone(), AssetMeta::new(AssetType::ImageJpeg, 640, 480));
//! snapshot.annotations.ground_truth.image_annotations.insert(
//!     asset_id,
//!     vec![ObjectAnnotation::new(0, 1, BBox::from_xyxy(10.0, 20.0, 100.0, 200.0))],
//! );
//! assert_eq!(snapshot.annotations.ground_truth.object_count(), 1);
//! ```

mod annotation;
mod asset;
mod geometry;
mod ids;
pub mod io_json;
mod keywords;
mod snapshot;
mod task;

pub use annotation::{
    AnnotationSet, Annotations, Channel, ConfusionMatrixType, ObjectAnnotation, CROWD_TAG,
};
pub use asset::{AssetMeta, AssetType, Metadatas, TvtType};
pub use geometry::{BBox, Coord, Geometry};
pub use ids::{is_valid_ref_name, AssetId, ClassId, TaskId};
pub use keywords::{AnnoStats, Context, KeywordIndex, Keywords};
pub use snapshot::{MirStorage, Snapshot};
pub use task::{ModelMeta, Task, TaskType, Tasks};
