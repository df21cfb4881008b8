//! The four-collection snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::annotation::Annotations;
use super::asset::Metadatas;
use super::ids::{AssetId, TaskId};
use super::keywords::Keywords;
use super::task::{Task, Tasks};

/// One of the fixed-name collections stored per commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirStorage {
    Metadatas,
    Annotations,
    Keywords,
    Tasks,
}

impl MirStorage {
    /// All collections, in the order they are written.
    pub const ALL: [MirStorage; 4] = [
        MirStorage::Metadatas,
        MirStorage::Annotations,
        MirStorage::Keywords,
        MirStorage::Tasks,
    ];

    /// Fixed file name of the collection inside a commit.
    pub fn file_name(&self) -> &'static str {
        match self {
            MirStorage::Metadatas => "metadatas.mir",
            MirStorage::Annotations => "annotations.mir",
            MirStorage::Keywords => "keywords.mir",
            MirStorage::Tasks => "tasks.mir",
        }
    }

    /// All fixed file names.
    pub fn file_names() -> Vec<&'static str> {
        Self::ALL.iter().map(MirStorage::file_name).collect()
    }
}

impl fmt::Display for MirStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A complete snapshot: what one commit holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadatas: Metadatas,
    pub annotations: Annotations,
    pub keywords: Keywords,
    pub tasks: Tasks,
}

impl Snapshot {
    /// Head task id of the snapshot.
    pub fn head_task_id(&self) -> &TaskId {
        &self.tasks.head_task_id
    }

    /// Head task, if the head id resolves in the task map.
    pub fn head_task(&self) -> Option<&Task> {
        self.tasks.head()
    }

    /// Set of asset ids in the metadata collection.
    pub fn asset_ids(&self) -> BTreeSet<AssetId> {
        self.metadatas.asset_ids().cloned().collect()
    }
}
