use serde::Serialize;
use std::path::PathBuf;

use super::CommandOutcome;
use crate::config::RepoConfig;
use crate::error::MirError;
use crate::labels::LabelSpace;
use crate::model::ClassId;
use crate::storage::MirRepo;

#[derive(Clone, Debug, Default, Serialize)]
pub struct InitRequest {
    pub root: PathBuf,
    /// Initial label names, numbered from 0.
    pub labels: Vec<String>,
    pub project_class_names: Vec<String>,
}

pub(super) fn run(req: InitRequest) -> Result<CommandOutcome, MirError> {
    let labels = LabelSpace::from_names(&req.labels);
    let project_class_ids: Vec<ClassId> = labels.resolve_names(&req.project_class_names)?;
    let config = RepoConfig {
        project_class_ids,
        ..Default::default()
    };

    if !labels.is_empty() {
        std::fs::create_dir_all(&req.root)?;
        labels.save(&req.root.join(crate::labels::LABELS_FILE))?;
    }
    let repo = MirRepo::init(&req.root, config)?;
    let head = repo.store().head_commit()?;
    Ok(CommandOutcome {
        commits: head.into_iter().collect(),
        task_id: None,
        message: format!(
            "initialized repository at {} with {} label(s)",
            repo.root().display(),
            labels.len()
        ),
        evaluation: None,
    })
}
