//! Task provenance records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::ids::TaskId;
use crate::eval::Evaluation;

/// What kind of command produced a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Unknown,
    Init,
    Import,
    Filter,
    Merge,
    Copy,
    Training,
    Mining,
    Infer,
    Evaluate,
    Update,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Unknown => "unknown",
            TaskType::Init => "init",
            TaskType::Import => "import",
            TaskType::Filter => "filter",
            TaskType::Merge => "merge",
            TaskType::Copy => "copy",
            TaskType::Training => "training",
            TaskType::Mining => "mining",
            TaskType::Infer => "infer",
            TaskType::Evaluate => "evaluate",
            TaskType::Update => "update",
        };
        f.write_str(name)
    }
}

/// Model-association metadata attached to training results and predictions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model_hash: String,
    #[serde(default)]
    pub stage_name: String,
    #[serde(default)]
    pub mean_average_precision: f64,
    #[serde(default)]
    pub class_names: Vec<String>,
}

/// One task record. Every commit carries exactly one as its head.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: TaskType,
    pub task_id: TaskId,
    /// Head task of the snapshot this one was derived from.
    #[serde(default)]
    pub ancestor_task_id: TaskId,
    /// Unix seconds.
    pub timestamp: i64,
    /// 0 on success, otherwise the error code of the failed command.
    pub return_code: i32,
    #[serde(default)]
    pub return_msg: String,
    /// Command parameters as JSON.
    #[serde(default)]
    pub serialized_task_parameters: String,
    #[serde(default)]
    pub model: Option<ModelMeta>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    /// Class names added to the label space while running this task.
    #[serde(default)]
    pub new_types_added: Vec<String>,
}

impl Task {
    /// Creates a successful task of the given type, stamped with the current time.
    pub fn new(task_type: TaskType, task_id: impl Into<TaskId>) -> Self {
        Self {
            task_type,
            task_id: task_id.into(),
            timestamp: chrono::Utc::now().timestamp(),
            ..Default::default()
        }
    }

    /// Sets the ancestor task id.
    pub fn with_ancestor(mut self, ancestor: TaskId) -> Self {
        self.ancestor_task_id = ancestor;
        self
    }

    /// Stores command parameters, serialized as JSON.
    pub fn with_parameters<P: Serialize>(mut self, params: &P) -> Self {
        self.serialized_task_parameters = serde_json::to_string(params).unwrap_or_default();
        self
    }

    /// Marks the task as failed.
    pub fn with_failure(mut self, return_code: i32, return_msg: impl Into<String>) -> Self {
        self.return_code = return_code;
        self.return_msg = return_msg.into();
        self
    }

    /// Returns true if the task recorded a failure.
    pub fn is_failed(&self) -> bool {
        self.return_code != 0
    }
}

/// The task map of a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tasks {
    pub tasks: BTreeMap<TaskId, Task>,
    pub head_task_id: TaskId,
}

impl Tasks {
    /// A task map holding exactly `task` as head.
    pub fn with_head(task: Task) -> Self {
        let head_task_id = task.task_id.clone();
        let mut tasks = BTreeMap::new();
        tasks.insert(head_task_id.clone(), task);
        Self {
            tasks,
            head_task_id,
        }
    }

    /// Returns the head task, if the head id resolves.
    pub fn head(&self) -> Option<&Task> {
        self.tasks.get(&self.head_task_id)
    }
}
