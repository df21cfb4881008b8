//! Repository configuration (`.mir/config.yaml`).
//!
//! Every field is optional in the file. Command-line flags override the
//! values read here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::MirError;
use crate::model::ClassId;
use crate::ops::merge::MergeStrategy;

/// File name of the configuration under the history directory.
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Conflict policy used by `merge` when none is given.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    /// Classes the project focuses on; drives project-negative counts.
    #[serde(default)]
    pub project_class_ids: Vec<ClassId>,

    /// External program run by `exec`.
    #[serde(default)]
    pub executor: Option<ExecutorSettings>,

    /// Blob store location; relative paths are taken from the repo root.
    #[serde(default)]
    pub asset_store: Option<PathBuf>,

    /// Default tracing filter when `MIR_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            merge_strategy: MergeStrategy::default(),
            project_class_ids: Vec::new(),
            executor: None,
            asset_store: None,
            log_level: default_log_level(),
        }
    }
}

impl RepoConfig {
    /// Reads the config, returning defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, MirError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| MirError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), MirError> {
        let text = serde_yaml::to_string(self).map_err(|source| MirError::YamlWrite {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text)?;
        Ok(())
    }
}
