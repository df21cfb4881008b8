use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// Numeric status codes returned by every command. `Ok` is 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MirCode {
    Ok = 0,
    RuntimeError = 1,
    InvalidArgs = 2,
    InvalidRepo = 3,
    DirtyRepo = 4,
    InvalidBranchOrTag = 5,
    InvalidMirFile = 6,
    NoAnnotations = 7,
    MergeConflict = 8,
    ExecutorFailed = 9,
}

impl MirCode {
    /// The value reported as process exit status and stored in failure tasks.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// The main error type for repository operations.
#[derive(Debug, Error)]
pub enum MirError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid repository at {path}: {message}")]
    InvalidRepo { path: PathBuf, message: String },

    #[error("Repository has uncommitted changes in: {}", files.join(", "))]
    DirtyRepo { files: Vec<String> },

    #[error("Invalid branch or tag: {0}")]
    InvalidBranchOrTag(String),

    #[error("Invalid mir file {file}: {message}")]
    InvalidMirFile { file: String, message: String },

    #[error("Failed to decode {file}: {source}")]
    MirDecode {
        file: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Snapshot failed validation with {error_count} error(s)")]
    SnapshotInvalid {
        error_count: usize,
        report: ValidationReport,
    },

    #[error("Unknown class names: {}", names.join(", "))]
    UnknownClassTypes { names: Vec<String> },

    #[error("No annotations: {0}")]
    NoAnnotations(String),

    #[error("Merge conflict on asset {asset_id} (strategy 'stop')")]
    MergeConflict { asset_id: String },

    #[error("Executor failed with exit code {exit_code:?}: {message}")]
    Executor {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Failed to parse annotation JSON from {path}: {source}")]
    AnnotationJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write annotation JSON to {path}: {source}")]
    AnnotationJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot read media directory {path}: {message}")]
    MediaDirectory { path: PathBuf, message: String },

    #[error("Failed to parse YAML {path}: {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write YAML {path}: {source}")]
    YamlWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Corrupt history record {path}: {source}")]
    HistoryRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl MirError {
    /// Status code for this error.
    ///
    /// Unknown class names are an argument problem from the caller's point of
    /// view, so they share the `InvalidArgs` code.
    pub fn code(&self) -> MirCode {
        match self {
            MirError::Io(_) => MirCode::RuntimeError,
            MirError::InvalidArgs(_) | MirError::UnknownClassTypes { .. } => MirCode::InvalidArgs,
            MirError::InvalidRepo { .. } => MirCode::InvalidRepo,
            MirError::DirtyRepo { .. } => MirCode::DirtyRepo,
            MirError::InvalidBranchOrTag(_) => MirCode::InvalidBranchOrTag,
            MirError::InvalidMirFile { .. }
            | MirError::MirDecode { .. }
            | MirError::SnapshotInvalid { .. }
            | MirError::HistoryRecord { .. } => MirCode::InvalidMirFile,
            MirError::NoAnnotations(_) => MirCode::NoAnnotations,
            MirError::MergeConflict { .. } => MirCode::MergeConflict,
            MirError::Executor { .. } => MirCode::ExecutorFailed,
            MirError::AnnotationJsonParse { .. }
            | MirError::AnnotationJsonWrite { .. }
            | MirError::YamlParse { .. }
            | MirError::YamlWrite { .. }
            | MirError::MediaDirectory { .. } => MirCode::InvalidArgs,
        }
    }

    /// Returns true for failures that are committed as a failed task.
    pub fn records_failure(&self) -> bool {
        matches!(self.code(), MirCode::RuntimeError | MirCode::ExecutorFailed)
    }
}
