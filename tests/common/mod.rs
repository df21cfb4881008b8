#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mirvcs::commands::{run_command, CommandOutcome, CommandRequest, ImportRequest, InitRequest};
use mirvcs::model::io_json::{write_annotation_json, NamedAnnotations, NamedObject};
use mirvcs::model::{BBox, TaskId};
use mirvcs::ops::UnknownTypesStrategy;
use mirvcs::progress::NoProgress;
use tempfile::TempDir;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// A repository in a temporary directory, plus scratch space beside it.
pub struct TestRepo {
    pub dir: TempDir,
    pub root: PathBuf,
}

impl TestRepo {
    /// Initializes a repository with `labels`.
    pub fn init(labels: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("repo");
        run_command(
            CommandRequest::Init(InitRequest {
                root: root.clone(),
                labels: labels.iter().map(|s| s.to_string()).collect(),
                project_class_names: Vec::new(),
            }),
            &NoProgress,
        )
        .expect("init repo");
        Self { dir, root }
    }

    /// A path outside the repository.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Imports `media` with optional annotation files onto `branch`.
    pub fn import(
        &self,
        media: &Path,
        pred: Option<PathBuf>,
        gt: Option<PathBuf>,
        branch: &str,
        task_id: &str,
    ) -> CommandOutcome {
        run_command(
            CommandRequest::Import(import_request(&self.root, media, pred, gt, branch, task_id)),
            &NoProgress,
        )
        .expect("import")
    }
}

pub fn import_request(
    root: &Path,
    media: &Path,
    pred: Option<PathBuf>,
    gt: Option<PathBuf>,
    branch: &str,
    task_id: &str,
) -> ImportRequest {
    ImportRequest {
        root: root.to_path_buf(),
        media_dir: media.to_path_buf(),
        pred_file: pred,
        gt_file: gt,
        dst_branch: branch.to_string(),
        src_rev: None,
        tvt_type: None,
        dataset_name: None,
        unknown_types: UnknownTypesStrategy::Stop,
        task_id: Some(TaskId::new(task_id)),
    }
}

/// Writes bitmaps named `names` into `dir`, each a distinct size so the
/// blobs differ.
pub fn write_media(dir: &Path, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        write_bmp(&dir.join(name), 40 + i as u32, 40);
    }
}

/// `(file, class, [xmin, ymin, xmax, ymax], score)`.
pub type Entry<'a> = (&'a str, &'a str, [f64; 4], Option<f64>);

pub fn write_annotations(path: &Path, entries: &[Entry<'_>]) {
    let mut file = NamedAnnotations::new();
    for (name, class, [xmin, ymin, xmax, ymax], score) in entries {
        file.entry(name.to_string()).or_default().push(NamedObject {
            class_name: class.to_string(),
            bbox: Some(BBox::from_xyxy(*xmin, *ymin, *xmax, *ymax)),
            polygon: None,
            score: *score,
            anno_quality: None,
            tags: Default::default(),
        });
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    write_annotation_json(path, &file).expect("write annotations");
}
