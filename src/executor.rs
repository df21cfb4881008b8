//! Boundary to external training, mining and inference programs.
//!
//! The repository never links model code. It lays out a work directory,
//! hands it to an [`Executor`], and reads back one result file:
//!
//! ```text
//! <work>/in/assets/<asset_id>   blob copies
//! <work>/in/index.tsv           asset_id <TAB> relative path <TAB> split
//! <work>/in/config.yaml         task kind, class names, executor config
//! <work>/out/result.yaml        written by the executor
//! <work>/out/stderr.log         captured by ProcessExecutor
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::assets::AssetStore;
use crate::config::ExecutorSettings;
use crate::error::MirError;
use crate::model::io_json::NamedObject;
use crate::model::{Metadatas, ModelMeta, TaskType, TvtType};

/// What the executor is asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecKind {
    Training,
    Mining {
        /// Keep the `topk` highest-scoring assets; all scored assets if unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topk: Option<usize>,
    },
    Infer,
}

impl ExecKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            ExecKind::Training => TaskType::Training,
            ExecKind::Mining { .. } => TaskType::Mining,
            ExecKind::Infer => TaskType::Infer,
        }
    }
}

/// Content of `in/config.yaml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(flatten)]
    pub kind: ExecKind,
    pub task_id: String,
    pub class_names: Vec<String>,
    /// Opaque settings passed through to the executor.
    #[serde(default)]
    pub executor_config: serde_yaml::Value,
}

/// Content of `out/result.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Trained model (training) or the model used (infer).
    #[serde(default)]
    pub model: Option<ModelMeta>,
    /// Mining scores, asset id -> score.
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    /// Inference output, asset id -> objects.
    #[serde(default)]
    pub predictions: BTreeMap<String, Vec<NamedObject>>,
}

/// A prepared work directory.
#[derive(Clone, Debug)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn in_dir(&self) -> PathBuf {
        self.root.join("in")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.in_dir().join("assets")
    }

    pub fn index_path(&self) -> PathBuf {
        self.in_dir().join("index.tsv")
    }

    pub fn config_path(&self) -> PathBuf {
        self.in_dir().join("config.yaml")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    pub fn result_path(&self) -> PathBuf {
        self.out_dir().join("result.yaml")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.out_dir().join("stderr.log")
    }

    /// Writes the inputs for `config` over the assets of `metadatas`.
    pub fn prepare(
        &self,
        assets: &AssetStore,
        metadatas: &Metadatas,
        config: &ExecConfig,
    ) -> Result<(), MirError> {
        fs::create_dir_all(self.assets_dir())?;
        fs::create_dir_all(self.out_dir())?;

        let mut index = BufWriter::new(File::create(self.index_path())?);
        for (asset_id, meta) in &metadatas.attributes {
            let source = assets.path_of(asset_id);
            let dest = self.assets_dir().join(asset_id.as_str());
            fs::copy(&source, &dest).map_err(|err| match err.kind() {
                ErrorKind::NotFound => MirError::InvalidRepo {
                    path: source.clone(),
                    message: format!("missing blob for asset {asset_id}"),
                },
                _ => err.into(),
            })?;
            writeln!(
                index,
                "{}\tassets/{}\t{}",
                asset_id,
                asset_id,
                split_name(meta.tvt_type)
            )?;
        }
        index.flush()?;

        let text = serde_yaml::to_string(config).map_err(|source| MirError::YamlWrite {
            path: self.config_path(),
            source,
        })?;
        fs::write(self.config_path(), text)?;
        tracing::debug!(
            workdir = %self.root.display(),
            assets = metadatas.len(),
            "prepared executor inputs"
        );
        Ok(())
    }

    /// Reads `out/result.yaml`.
    pub fn read_result(&self) -> Result<ExecResult, MirError> {
        let path = self.result_path();
        let text = fs::read_to_string(&path).map_err(|err| MirError::Executor {
            exit_code: None,
            message: format!("cannot read {}: {err}", path.display()),
        })?;
        serde_yaml::from_str(&text).map_err(|source| MirError::YamlParse { path, source })
    }
}

fn split_name(tvt: TvtType) -> &'static str {
    match tvt {
        TvtType::Unknown => "-",
        other => other.prefix(),
    }
}

/// Runs an external program over a prepared work directory.
pub trait Executor {
    fn run(&self, workdir: &WorkDir) -> Result<(), MirError>;
}

/// Spawns a configured program with the work directory as last argument.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }

    fn command(&self, workdir: &WorkDir) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(workdir.root());
        cmd
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, workdir: &WorkDir) -> Result<(), MirError> {
        fs::create_dir_all(workdir.out_dir())?;
        let stderr = File::create(workdir.stderr_path())?;

        tracing::info!(program = %self.program.display(), workdir = %workdir.root().display(), "running executor");
        let status = self
            .command(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|err| MirError::Executor {
                exit_code: None,
                message: format!("failed to spawn {}: {err}", self.program.display()),
            })?;

        if status.success() {
            return Ok(());
        }
        let captured = fs::read_to_string(workdir.stderr_path()).unwrap_or_default();
        let tail: Vec<&str> = captured.lines().rev().take(5).collect();
        let message = if tail.is_empty() {
            format!("{} exited with {status}", self.program.display())
        } else {
            tail.into_iter().rev().collect::<Vec<_>>().join("\n")
        };
        Err(MirError::Executor {
            exit_code: status.code(),
            message,
        })
    }
}
