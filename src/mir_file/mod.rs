//! Binary encoding of the four snapshot collections.
//!
//! Every collection is stored as one protobuf message in a fixed-name file.
//! [`MirCollection`] ties a domain collection to its file and its wire
//! message; [`encode`] and [`decode`] do the rest.

mod convert;
pub mod wire;

use prost::Message;

use crate::error::MirError;
use crate::model::{Annotations, Keywords, Metadatas, MirStorage, Snapshot, Tasks};

/// On-disk format version written by this build.
///
/// History:
/// - 1: object indices were not required to be dense.
/// - 2: dense indices; keyword context kept outside `keywords.mir`.
/// - 3: context stored inside `keywords.mir`.
pub const FORMAT_VERSION: u32 = 3;

/// A snapshot collection with a fixed file and wire representation.
pub trait MirCollection: Sized {
    const STORAGE: MirStorage;
    type Wire: Message + Default;

    fn to_wire(&self) -> Self::Wire;
    fn from_wire(wire: Self::Wire) -> Self;
}

impl MirCollection for Metadatas {
    const STORAGE: MirStorage = MirStorage::Metadatas;
    type Wire = wire::WireMetadatas;

    fn to_wire(&self) -> Self::Wire {
        convert::metadatas_to_wire(self)
    }

    fn from_wire(wire: Self::Wire) -> Self {
        convert::metadatas_from_wire(wire)
    }
}

impl MirCollection for Annotations {
    const STORAGE: MirStorage = MirStorage::Annotations;
    type Wire = wire::WireAnnotations;

    fn to_wire(&self) -> Self::Wire {
        convert::annotations_to_wire(self)
    }

    fn from_wire(wire: Self::Wire) -> Self {
        convert::annotations_from_wire(wire)
    }
}

impl MirCollection for Keywords {
    const STORAGE: MirStorage = MirStorage::Keywords;
    type Wire = wire::WireKeywords;

    fn to_wire(&self) -> Self::Wire {
        convert::keywords_to_wire(self)
    }

    fn from_wire(wire: Self::Wire) -> Self {
        convert::keywords_from_wire(wire)
    }
}

impl MirCollection for Tasks {
    const STORAGE: MirStorage = MirStorage::Tasks;
    type Wire = wire::WireTasks;

    fn to_wire(&self) -> Self::Wire {
        convert::tasks_to_wire(self)
    }

    fn from_wire(wire: Self::Wire) -> Self {
        convert::tasks_from_wire(wire)
    }
}

/// Encodes a collection to bytes.
pub fn encode<C: MirCollection>(collection: &C) -> Vec<u8> {
    collection.to_wire().encode_to_vec()
}

/// Decodes a collection from bytes.
pub fn decode<C: MirCollection>(bytes: &[u8]) -> Result<C, MirError> {
    decode_wire::<C::Wire>(C::STORAGE, bytes).map(C::from_wire)
}

/// Decodes a raw wire message, attributing failures to `storage`.
pub fn decode_wire<W: Message + Default>(storage: MirStorage, bytes: &[u8]) -> Result<W, MirError> {
    W::decode(bytes).map_err(|source| MirError::MirDecode {
        file: storage.file_name().to_string(),
        source,
    })
}

/// The four collection files of one snapshot, still in wire form.
///
/// Migrations operate on this so older layouts can be rewritten before the
/// domain model ever sees them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WireSnapshot {
    pub metadatas: wire::WireMetadatas,
    pub annotations: wire::WireAnnotations,
    pub keywords: wire::WireKeywords,
    pub tasks: wire::WireTasks,
}

impl WireSnapshot {
    /// Decodes all four files. `read` returns the bytes of a file by storage.
    pub fn decode_with(
        mut read: impl FnMut(MirStorage) -> Result<Vec<u8>, MirError>,
    ) -> Result<Self, MirError> {
        Ok(Self {
            metadatas: decode_wire(MirStorage::Metadatas, &read(MirStorage::Metadatas)?)?,
            annotations: decode_wire(MirStorage::Annotations, &read(MirStorage::Annotations)?)?,
            keywords: decode_wire(MirStorage::Keywords, &read(MirStorage::Keywords)?)?,
            tasks: decode_wire(MirStorage::Tasks, &read(MirStorage::Tasks)?)?,
        })
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            metadatas: snapshot.metadatas.to_wire(),
            annotations: snapshot.annotations.to_wire(),
            keywords: snapshot.keywords.to_wire(),
            tasks: snapshot.tasks.to_wire(),
        }
    }

    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            metadatas: Metadatas::from_wire(self.metadatas),
            annotations: Annotations::from_wire(self.annotations),
            keywords: Keywords::from_wire(self.keywords),
            tasks: Tasks::from_wire(self.tasks),
        }
    }
}

/// Encodes all four collections of a snapshot, in [`MirStorage::ALL`] order.
pub fn encode_snapshot(snapshot: &Snapshot) -> Vec<(MirStorage, Vec<u8>)> {
    vec![
        (MirStorage::Metadatas, encode(&snapshot.metadatas)),
        (MirStorage::Annotations, encode(&snapshot.annotations)),
        (MirStorage::Keywords, encode(&snapshot.keywords)),
        (MirStorage::Tasks, encode(&snapshot.tasks)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AssetId, AssetMeta, AssetType, BBox, ConfusionMatrixType, ObjectAnnotation, Task, TaskType,
        TvtType,
    };

    fn sample_snapshot() -> Snapshot {
        let asset = AssetId::from_bytes(b"a");
        let mut snapshot = Snapshot::default();
        snapshot.metadatas.attributes.insert(
            asset.clone(),
            AssetMeta::new(AssetType::ImagePng, 32, 16).with_tvt_type(TvtType::Validation),
        );
        let mut object = ObjectAnnotation::new(0, 3, BBox::from_xyxy(1.0, 2.0, 3.0, 4.0))
            .with_score(0.75)
            .with_tag("color", "red");
        object.cm = ConfusionMatrixType::Tp;
        object.det_link_id = Some(0);
        snapshot
            .annotations
            .prediction
            .image_annotations
            .insert(asset, vec![object]);
        snapshot.tasks = Tasks::with_head(Task::new(TaskType::Import, "t1"));
        snapshot
    }

    #[test]
    fn test_snapshot_survives_encoding() {
        let snapshot = sample_snapshot();
        let restored = WireSnapshot::decode_with(|storage| {
            let files = encode_snapshot(&snapshot);
            Ok(files
                .into_iter()
                .find(|(s, _)| *s == storage)
                .map(|(_, bytes)| bytes)
                .unwrap_or_default())
        })
        .expect("decode")
        .into_snapshot();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let snapshot = sample_snapshot();
        assert_eq!(encode(&snapshot.annotations), encode(&snapshot.annotations.clone()));
    }

    #[test]
    fn test_garbage_reports_file_name() {
        let err = decode::<Tasks>(&[0xff, 0xff, 0xff]).expect_err("garbage must fail");
        assert!(err.to_string().contains("tasks.mir"));
    }

    #[test]
    fn test_missing_link_is_none() {
        let object = ObjectAnnotation::new(0, 1, BBox::from_xyxy(0.0, 0.0, 1.0, 1.0));
        let mut annotations = Annotations::default();
        annotations
            .ground_truth
            .image_annotations
            .insert(AssetId::new("x"), vec![object]);
        let restored: Annotations = decode(&encode(&annotations)).expect("decode");
        let got = &restored.ground_truth.objects(&AssetId::new("x"))[0];
        assert_eq!(got.det_link_id, None);
    }
}
