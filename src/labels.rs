//! Label space: the shared class id <-> name mapping of a repository.
//!
//! Stored as `labels.yaml` at the repository root:
//!
//! ```yaml
//! version: 2
//! labels:
//!   - id: 0
//!     name: person
//!     aliases: [human, pedestrian]
//!   - id: 1
//!     name: cat
//! ```
//!
//! Lookups by name are case-insensitive and also match aliases.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::MirError;
use crate::model::ClassId;

/// File name of the label space under the repository root.
pub const LABELS_FILE: &str = "labels.yaml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: ClassId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Label {
    fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpace {
    /// Bumped on every change.
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl LabelSpace {
    /// Builds a space assigning ids 0.. in order.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut space = Self::default();
        space.add_names(names);
        space.version = 1;
        space
    }

    pub fn load(path: &Path) -> Result<Self, MirError> {
        let text = fs::read_to_string(path)?;
        let space: Self = serde_yaml::from_str(&text).map_err(|source| MirError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?;
        space.check_unique(path)?;
        Ok(space)
    }

    pub fn save(&self, path: &Path) -> Result<(), MirError> {
        let text = serde_yaml::to_string(self).map_err(|source| MirError::YamlWrite {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text)?;
        Ok(())
    }

    fn check_unique(&self, path: &Path) -> Result<(), MirError> {
        let mut ids = std::collections::BTreeSet::new();
        for label in &self.labels {
            if !ids.insert(label.id) {
                return Err(MirError::InvalidArgs(format!(
                    "label space {} has duplicate class id {}",
                    path.display(),
                    label.id
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class id of a name or alias.
    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.labels.iter().find(|l| l.matches(name)).map(|l| l.id)
    }

    /// Main name of a class id.
    pub fn name_of(&self, class_id: ClassId) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.id == class_id)
            .map(|l| l.name.as_str())
    }

    /// Display name of a class id, falling back to the numeric id.
    pub fn display_name(&self, class_id: ClassId) -> String {
        self.name_of(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", class_id.0))
    }

    /// Resolves names, returning the known ids and the unknown names.
    pub fn ids_for_names<S: AsRef<str>>(&self, names: &[S]) -> (Vec<ClassId>, Vec<String>) {
        let mut ids = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            match self.id_of(name.as_ref()) {
                Some(id) => ids.push(id),
                None => unknown.push(name.as_ref().to_string()),
            }
        }
        (ids, unknown)
    }

    /// Resolves names, failing with `InvalidArgs` on the first unknown one.
    pub fn resolve_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ClassId>, MirError> {
        let (ids, unknown) = self.ids_for_names(names);
        if unknown.is_empty() {
            Ok(ids)
        } else {
            Err(MirError::InvalidArgs(format!(
                "unknown class names: {}",
                unknown.join(", ")
            )))
        }
    }

    /// Adds names not yet present, returning the ids of all `names`.
    pub fn add_names<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<ClassId> {
        let mut added = false;
        let ids = names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                if let Some(id) = self.id_of(name) {
                    return id;
                }
                let id = ClassId(self.labels.iter().map(|l| l.id.0 + 1).max().unwrap_or(0));
                self.labels.push(Label {
                    id,
                    name: name.to_string(),
                    aliases: Vec::new(),
                });
                added = true;
                id
            })
            .collect();
        if added {
            self.version += 1;
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_and_uses_aliases() {
        let mut space = LabelSpace::from_names(&["person", "cat"]);
        space.labels[0].aliases.push("Human".into());
        assert_eq!(space.id_of("PERSON"), Some(ClassId(0)));
        assert_eq!(space.id_of("human"), Some(ClassId(0)));
        assert_eq!(space.id_of("dog"), None);
    }

    #[test]
    fn test_add_names_bumps_version_once() {
        let mut space = LabelSpace::from_names(&["person"]);
        let ids = space.add_names(&["drone", "person", "kite"]);
        assert_eq!(ids, vec![ClassId(1), ClassId(0), ClassId(2)]);
        assert_eq!(space.version, 2);
        space.add_names(&["PERSON"]);
        assert_eq!(space.version, 2);
    }

    #[test]
    fn test_unknown_names_reported() {
        let space = LabelSpace::from_names(&["person"]);
        let (ids, unknown) = space.ids_for_names(&["person", "drone"]);
        assert_eq!(ids, vec![ClassId(0)]);
        assert_eq!(unknown, vec!["drone"]);
        assert!(space.resolve_names(&["drone"]).is_err());
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(LABELS_FILE);
        let space = LabelSpace::from_names(&["a", "b"]);
        space.save(&path).expect("save");
        assert_eq!(LabelSpace::load(&path).expect("load"), space);
    }
}
