//! Schema migrations between repository format versions.
//!
//! Each step rewrites a decoded [`WireSnapshot`] from version `from` to
//! `from + 1`. [`migrate_wire`] runs every step between a repository's
//! version and [`FORMAT_VERSION`] in order.

use crate::error::MirError;
use crate::mir_file::{MirCollection, WireSnapshot, FORMAT_VERSION};
use crate::model::{ClassId, Keywords};
use crate::storage::rebuild_keywords;

/// One step of the chain.
pub struct Migration {
    pub from: u32,
    pub description: &'static str,
    apply: fn(&mut WireSnapshot, &[ClassId]),
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} -> v{}: {}", self.from, self.from + 1, self.description)
    }
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        description: "assign dense object indices",
        apply: assign_dense_indices,
    },
    Migration {
        from: 2,
        description: "rebuild keywords with context",
        apply: rebuild_context,
    },
];

/// Steps needed to bring `version` to [`FORMAT_VERSION`].
pub fn migrations_from(version: u32) -> Result<Vec<&'static Migration>, MirError> {
    if version == 0 || version > FORMAT_VERSION {
        return Err(MirError::InvalidRepo {
            path: Default::default(),
            message: format!(
                "unsupported repository format {version} (this build supports 1 to {FORMAT_VERSION})"
            ),
        });
    }
    Ok(MIGRATIONS.iter().filter(|m| m.from >= version).collect())
}

/// Upgrades a snapshot decoded from a repository at `version`.
///
/// `project_class_ids` feeds the context rebuilt by the v2 step.
pub fn migrate_wire(
    mut snapshot: WireSnapshot,
    version: u32,
    project_class_ids: &[ClassId],
) -> Result<WireSnapshot, MirError> {
    for migration in migrations_from(version)? {
        tracing::debug!(?migration, "applying migration");
        (migration.apply)(&mut snapshot, project_class_ids);
    }
    Ok(snapshot)
}

// v1 files carried no object index; every object decodes as index 0.
fn assign_dense_indices(snapshot: &mut WireSnapshot, _project_class_ids: &[ClassId]) {
    let sets = [
        snapshot.annotations.prediction.as_mut(),
        snapshot.annotations.ground_truth.as_mut(),
    ];
    for set in sets.into_iter().flatten() {
        for image in set.image_annotations.values_mut() {
            for (i, object) in image.objects.iter_mut().enumerate() {
                object.index = i as i32;
                object.det_link_id = -1;
            }
        }
    }
}

fn rebuild_context(snapshot: &mut WireSnapshot, project_class_ids: &[ClassId]) {
    let decoded = snapshot.clone().into_snapshot();
    let keywords = rebuild_keywords(&decoded.metadatas, &decoded.annotations, project_class_ids);
    snapshot.keywords = Keywords::to_wire(&keywords);
}
