//! Repository-mutating commands.
//!
//! [`CommandRequest`] is the closed set of commands that write history.
//! [`run_command`] dispatches on it and returns a [`CommandOutcome`];
//! failures are reported as [`MirError`], whose [`MirError::code`] is the
//! numeric status.
//!
//! Runtime and executor failures that happen after the repository was
//! opened are also recorded: a failure task is committed on the target
//! branch with the ancestor's content before the error is returned.

mod copy;
mod evaluate;
mod exec;
mod filter;
mod import;
mod init;
mod merge;
mod update;

pub use copy::CopyRequest;
pub use evaluate::EvaluateRequest;
pub use exec::{run_exec, ExecRequest};
pub use filter::FilterRequest;
pub use import::ImportRequest;
pub use init::InitRequest;
pub use merge::MergeRequest;
pub use update::UpdateRequest;

use std::path::Path;

use crate::error::{MirCode, MirError};
use crate::eval::Evaluation;
use crate::model::{MirStorage, Task, TaskId, TaskType};
use crate::progress::ProgressReporter;
use crate::storage::{CommitRequest, MirRepo, RevTid};
use crate::vcs::CommitId;

/// A command that writes to a repository.
#[derive(Debug)]
pub enum CommandRequest {
    Init(InitRequest),
    Import(ImportRequest),
    Merge(MergeRequest),
    Filter(FilterRequest),
    Copy(CopyRequest),
    Evaluate(EvaluateRequest),
    Exec(ExecRequest),
    Update(UpdateRequest),
}

impl CommandRequest {
    pub fn name(&self) -> &'static str {
        match self {
            CommandRequest::Init(_) => "init",
            CommandRequest::Import(_) => "import",
            CommandRequest::Merge(_) => "merge",
            CommandRequest::Filter(_) => "filter",
            CommandRequest::Copy(_) => "copy",
            CommandRequest::Evaluate(_) => "evaluate",
            CommandRequest::Exec(_) => "exec",
            CommandRequest::Update(_) => "update",
        }
    }
}

/// Result of a successful command.
#[derive(Clone, Debug, Default)]
pub struct CommandOutcome {
    /// Commits made, in order.
    pub commits: Vec<CommitId>,
    /// Task id of the last commit.
    pub task_id: Option<TaskId>,
    /// One-line human summary.
    pub message: String,
    pub evaluation: Option<Evaluation>,
}

impl CommandOutcome {
    pub fn code(&self) -> MirCode {
        MirCode::Ok
    }

    pub(crate) fn committed(commit: CommitId, task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            commits: vec![commit],
            task_id: Some(task_id),
            message: message.into(),
            evaluation: None,
        }
    }
}

/// Runs one command to completion.
pub fn run_command(
    request: CommandRequest,
    progress: &dyn ProgressReporter,
) -> Result<CommandOutcome, MirError> {
    let name = request.name();
    tracing::debug!(command = name, "starting");
    let result = match request {
        CommandRequest::Init(req) => init::run(req),
        CommandRequest::Import(req) => import::run(req, progress),
        CommandRequest::Merge(req) => merge::run(req, progress),
        CommandRequest::Filter(req) => filter::run(req, progress),
        CommandRequest::Copy(req) => copy::run(req, progress),
        CommandRequest::Evaluate(req) => evaluate::run(req, progress),
        CommandRequest::Exec(req) => exec::run(req, progress),
        CommandRequest::Update(req) => update::run(req, progress),
    };
    match &result {
        Ok(outcome) => tracing::info!(command = name, "{}", outcome.message),
        Err(err) => tracing::debug!(command = name, code = err.code().as_i32(), error = %err, "failed"),
    }
    result
}

/// Where a command commits and what it descends from.
#[derive(Clone, Debug)]
pub(crate) struct TaskTarget {
    pub branch: String,
    pub ancestor: Option<RevTid>,
    pub task_type: TaskType,
    pub task_id: TaskId,
}

impl TaskTarget {
    pub fn new(
        branch: impl Into<String>,
        ancestor: Option<RevTid>,
        task_type: TaskType,
        task_id: Option<TaskId>,
    ) -> Self {
        Self {
            branch: branch.into(),
            ancestor,
            task_type,
            task_id: task_id.unwrap_or_else(TaskId::generate),
        }
    }

    pub fn task(&self) -> Task {
        Task::new(self.task_type, self.task_id.clone())
    }

    pub fn commit_request(&self, task: Task) -> CommitRequest {
        let mut request = CommitRequest::new(self.branch.clone(), task);
        request.ancestor = self.ancestor.as_ref().map(|rev| rev.to_string());
        request
    }
}

/// Opens the repository at `root`.
pub(crate) fn open_repo(root: &Path) -> Result<MirRepo, MirError> {
    MirRepo::open(root)
}

/// Passes `result` through; on a runtime or executor failure commits a
/// failure task first.
pub(crate) fn record_failure<T>(
    repo: &MirRepo,
    target: &TaskTarget,
    result: Result<T, MirError>,
) -> Result<T, MirError> {
    let err = match result {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    if !err.records_failure() {
        return Err(err);
    }

    let base = target
        .ancestor
        .clone()
        .unwrap_or_else(|| RevTid::branch(target.branch.clone()));
    let committed = repo
        .load(Some(&base), &[MirStorage::Metadatas, MirStorage::Annotations, MirStorage::Tasks])
        .and_then(|snapshot| {
            let task = target
                .task()
                .with_ancestor(snapshot.head_task_id().clone())
                .with_failure(err.code().as_i32(), err.to_string());
            let mut request = target.commit_request(task);
            request.metadatas = Some(snapshot.metadatas);
            request.annotations = Some(snapshot.annotations);
            repo.save_and_commit(request)
        });
    match committed {
        Ok(commit) => tracing::warn!(
            branch = %target.branch,
            task = %target.task_id,
            commit = commit.short(),
            "recorded failure task"
        ),
        Err(commit_err) => tracing::error!(
            branch = %target.branch,
            error = %commit_err,
            "could not record failure task"
        ),
    }
    Err(err)
}

/// The ancestor head task id of `rev`, for task provenance.
pub(crate) fn head_task_id(repo: &MirRepo, rev: &RevTid) -> Result<TaskId, MirError> {
    let tasks: crate::model::Tasks = repo.load_one(Some(rev))?;
    Ok(tasks.head_task_id)
}
