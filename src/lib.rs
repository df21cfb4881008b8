//! mirvcs: version control and evaluation for annotated media datasets.
//!
//! A repository stores snapshots of a dataset: asset metadata, prediction and
//! ground-truth annotations, derived keyword indices and the task that
//! produced them. Every command that changes a dataset commits a new
//! snapshot tagged `branch@task_id`.
//!
//! # Modules
//!
//! - [`model`]: snapshot collections (metadatas, annotations, keywords, tasks)
//! - [`storage`]: opening repositories, loading and committing snapshots
//! - [`ops`]: merge, filter and copy engines
//! - [`eval`]: COCO-style and VOC-style detection evaluation
//! - [`commands`]: the repository-mutating commands behind the CLI
//! - [`validation`], [`diff`], [`show`]: read-only reports
//! - [`error`]: error types and numeric status codes

pub mod assets;
pub mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod eval;
pub mod executor;
pub mod labels;
pub mod logging;
pub mod migrate;
pub mod mir_file;
pub mod model;
pub mod ops;
pub mod progress;
pub mod show;
pub mod storage;
pub mod validation;
pub mod vcs;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use commands::{
    run_command, CommandOutcome, CommandRequest, CopyRequest, EvaluateRequest, ExecRequest,
    FilterRequest, ImportRequest, InitRequest, MergeRequest, UpdateRequest,
};
use config::{ExecutorSettings, RepoConfig, CONFIG_FILE};
use executor::ExecKind;
use logging::LogFormat;
use model::{is_valid_ref_name, MirStorage, TaskId, TvtType};
use ops::{CopyOptions, FilterOptions, MergeStrategy, UnknownTypesStrategy};
use progress::LogProgress;
use storage::{MirRepo, RevTid, TypedRev};

pub use error::{MirCode, MirError};

/// The mir CLI application.
#[derive(Parser)]
#[command(name = "mir")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Repository root.
    #[arg(short = 'C', long, global = true, env = "MIR_ROOT", default_value = ".")]
    root: PathBuf,

    /// Log filter used when MIR_LOG is unset (overrides the repository config).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log line format.
    #[arg(long, global = true, value_enum, env = "MIR_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create a repository.
    Init(InitArgs),
    /// Import a media directory and annotation files into a branch.
    Import(ImportArgs),
    /// Merge revisions into a new branch.
    Merge(MergeArgs),
    /// Keep the assets matching class and split criteria.
    Filter(FilterArgs),
    /// Copy a revision from another repository.
    Copy(CopyArgs),
    /// Evaluate predictions against ground truth.
    Evaluate(EvaluateArgs),
    /// Run an external training, mining or inference program.
    Exec(ExecArgs),
    /// Upgrade the repository to the current format.
    Update(UpdateArgs),
    /// Summarize a snapshot.
    Show(ShowArgs),
    /// Compare two snapshots.
    Diff(DiffArgs),
    /// List the history of a branch.
    Log(LogArgs),
    /// Validate a snapshot for errors and warnings.
    Validate(ValidateArgs),
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct InitArgs {
    /// Initial label names (comma-separated or repeated).
    #[arg(long = "label", value_delimiter = ',')]
    labels: Vec<String>,

    /// Project classes, by name.
    #[arg(long = "project-class", value_delimiter = ',')]
    project_classes: Vec<String>,
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Directory of media files.
    media_dir: PathBuf,

    /// Prediction annotation JSON file.
    #[arg(long)]
    pred: Option<PathBuf>,

    /// Ground-truth annotation JSON file.
    #[arg(long)]
    gt: Option<PathBuf>,

    /// Destination branch.
    #[arg(long)]
    dst: String,

    /// Revision the destination branch starts from.
    #[arg(long)]
    src: Option<RevTid>,

    /// Split for every imported asset (tr, va or te).
    #[arg(long)]
    split: Option<TvtType>,

    #[arg(long)]
    dataset_name: Option<String>,

    /// Handling of class names missing from labels.yaml.
    #[arg(long, value_enum, default_value = "stop")]
    unknown_types: UnknownTypesStrategy,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Host revision, optionally typed (`tr:branch@task`).
    #[arg(long)]
    host: TypedRev,

    /// Guest revisions, merged in order.
    #[arg(long = "guest")]
    guests: Vec<TypedRev>,

    /// Revisions whose assets are removed from the result.
    #[arg(long = "exclude")]
    excludes: Vec<RevTid>,

    /// Conflict strategy (defaults to the repository config).
    #[arg(long, value_enum)]
    strategy: Option<MergeStrategy>,

    #[arg(long)]
    dst: String,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Source revision.
    src: RevTid,

    #[arg(long)]
    dst: String,

    /// Keep assets with any of these classes.
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Drop assets with any of these classes.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Keep at most this many assets.
    #[arg(long)]
    sample_count: Option<usize>,

    /// Keep only this split.
    #[arg(long)]
    split: Option<TvtType>,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct CopyArgs {
    /// Root of the repository to copy from.
    src_root: PathBuf,

    /// Revision in the source repository.
    src_rev: RevTid,

    #[arg(long)]
    dst: String,

    #[arg(long, value_enum, default_value = "stop")]
    unknown_types: UnknownTypesStrategy,

    /// Copy asset metadata only.
    #[arg(long)]
    drop_annotations: bool,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct EvaluateArgs {
    /// Revision holding the predictions.
    src: RevTid,

    /// Revision holding the ground truth (defaults to the source).
    #[arg(long)]
    gt: Option<RevTid>,

    #[arg(long)]
    dst: String,

    /// Confidence threshold.
    #[arg(long, default_value_t = 0.005)]
    conf_thr: f64,

    /// IoU threshold, or an interval `from:to:step`.
    #[arg(long, default_value = "0.5")]
    iou_thrs: String,

    /// Include precision/recall curves.
    #[arg(long)]
    pr_curve: bool,

    /// Classes to score (defaults to every ground-truth class).
    #[arg(long = "class", value_delimiter = ',')]
    classes: Vec<String>,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,

    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Executor task kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExecKindArg {
    Training,
    Mining,
    Infer,
}

#[derive(clap::Args)]
struct ExecArgs {
    #[arg(value_enum)]
    kind: ExecKindArg,

    /// Input revision.
    src: RevTid,

    #[arg(long)]
    dst: String,

    /// Mining: number of assets to keep.
    #[arg(long)]
    topk: Option<usize>,

    /// Work directory (defaults to .mir/tmp/<task_id>).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// YAML file passed through to the executor.
    #[arg(long)]
    executor_config: Option<PathBuf>,

    /// Executor program (overrides the repository config).
    #[arg(long)]
    executor: Option<PathBuf>,

    /// Extra argument for the executor program (repeatable).
    #[arg(long = "executor-arg", allow_hyphen_values = true)]
    executor_args: Vec<String>,

    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct UpdateArgs {
    #[arg(long, value_parser = parse_task_id)]
    task_id: Option<TaskId>,
}

#[derive(clap::Args)]
struct ShowArgs {
    /// Revision to show (defaults to the working tree).
    rev: Option<RevTid>,

    /// Width of histogram bars.
    #[arg(long, default_value_t = 20)]
    bar_width: usize,

    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct DiffArgs {
    a: RevTid,
    b: RevTid,

    /// Object matching strategy.
    #[arg(long, value_enum, default_value = "index")]
    match_by: diff::MatchBy,

    /// IoU threshold for `--match-by iou`.
    #[arg(long, default_value_t = 0.5)]
    iou_threshold: f64,

    /// List individual differences.
    #[arg(long)]
    detail: bool,

    #[arg(long, default_value_t = 20)]
    max_items: usize,

    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct LogArgs {
    /// Branch or tag to start from (defaults to the current branch).
    rev: Option<RevTid>,

    /// Maximum number of commits.
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Revision to validate (defaults to the working tree).
    rev: Option<RevTid>,

    /// Treat warnings as errors.
    #[arg(long)]
    strict: bool,

    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

fn parse_task_id(s: &str) -> Result<TaskId, String> {
    if is_valid_ref_name(s) {
        Ok(TaskId::new(s))
    } else {
        Err(format!("'{s}' is not a valid task id"))
    }
}

/// Run the mir CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), MirError> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("mir {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Version control and evaluation for annotated media datasets.");
        println!();
        println!("Run 'mir --help' for usage information.");
        return Ok(());
    };

    let level = match &cli.log_level {
        Some(level) => level.clone(),
        None => repo_config(&cli.root)?.log_level,
    };
    logging::init_logging(&level, cli.log_format)?;

    let root = cli.root;
    match command {
        Commands::Init(args) => run_request(CommandRequest::Init(InitRequest {
            root,
            labels: args.labels,
            project_class_names: args.project_classes,
        })),
        Commands::Import(args) => run_request(CommandRequest::Import(ImportRequest {
            root,
            media_dir: args.media_dir,
            pred_file: args.pred,
            gt_file: args.gt,
            dst_branch: args.dst,
            src_rev: args.src,
            tvt_type: args.split,
            dataset_name: args.dataset_name,
            unknown_types: args.unknown_types,
            task_id: args.task_id,
        })),
        Commands::Merge(args) => run_request(CommandRequest::Merge(MergeRequest {
            root,
            host: args.host,
            guests: args.guests,
            excludes: args.excludes,
            strategy: args.strategy,
            dst_branch: args.dst,
            task_id: args.task_id,
        })),
        Commands::Filter(args) => run_request(CommandRequest::Filter(FilterRequest {
            root,
            src_rev: args.src,
            dst_branch: args.dst,
            options: FilterOptions {
                include: args.include,
                exclude: args.exclude,
                sample_count: args.sample_count,
                tvt_type: args.split,
            },
            task_id: args.task_id,
        })),
        Commands::Copy(args) => run_request(CommandRequest::Copy(CopyRequest {
            root,
            src_root: args.src_root,
            src_rev: args.src_rev,
            dst_branch: args.dst,
            options: CopyOptions {
                unknown_types: args.unknown_types,
                drop_annotations: args.drop_annotations,
            },
            task_id: args.task_id,
        })),
        Commands::Evaluate(args) => run_evaluate(root, args),
        Commands::Exec(args) => run_exec(root, args),
        Commands::Update(args) => run_request(CommandRequest::Update(UpdateRequest {
            root,
            task_id: args.task_id,
        })),
        Commands::Show(args) => run_show(&root, args),
        Commands::Diff(args) => run_diff(&root, args),
        Commands::Log(args) => run_log(&root, args),
        Commands::Validate(args) => run_validate(&root, args),
    }
}

fn repo_config(root: &Path) -> Result<RepoConfig, MirError> {
    RepoConfig::load(&root.join(vcs::HISTORY_DIR).join(CONFIG_FILE))
}

fn dispatch(request: CommandRequest) -> Result<CommandOutcome, MirError> {
    let progress = LogProgress::new(request.name());
    run_command(request, &progress)
}

fn run_request(request: CommandRequest) -> Result<(), MirError> {
    let outcome = dispatch(request)?;
    println!("{}", outcome.message);
    Ok(())
}

/// Execute the evaluate subcommand.
fn run_evaluate(root: PathBuf, args: EvaluateArgs) -> Result<(), MirError> {
    let config = eval::EvaluateConfig {
        conf_thr: args.conf_thr,
        iou_thrs: eval::parse_iou_thrs(&args.iou_thrs)?,
        need_pr_curve: args.pr_curve,
        class_ids: Vec::new(),
    };
    let outcome = dispatch(CommandRequest::Evaluate(EvaluateRequest {
        root,
        src_rev: args.src,
        gt_rev: args.gt,
        dst_branch: args.dst,
        config,
        class_names: args.classes,
        task_id: args.task_id,
    }))?;

    match (args.output, &outcome.evaluation) {
        (OutputFormat::Json, Some(evaluation)) => print_json(evaluation)?,
        (OutputFormat::Text, Some(evaluation)) => {
            println!("{}", outcome.message);
            print!("{evaluation}");
        }
        (_, None) => println!("{}", outcome.message),
    }
    Ok(())
}

/// Execute the exec subcommand.
fn run_exec(root: PathBuf, args: ExecArgs) -> Result<(), MirError> {
    let kind = match args.kind {
        ExecKindArg::Training => ExecKind::Training,
        ExecKindArg::Mining => ExecKind::Mining { topk: args.topk },
        ExecKindArg::Infer => ExecKind::Infer,
    };
    let executor_config = match &args.executor_config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&text).map_err(|source| MirError::YamlParse {
                path: path.clone(),
                source,
            })?
        }
        None => serde_yaml::Value::Null,
    };
    let executor = args.executor.map(|program| ExecutorSettings {
        program,
        args: args.executor_args,
    });
    run_request(CommandRequest::Exec(ExecRequest {
        root,
        kind,
        src_rev: args.src,
        dst_branch: args.dst,
        work_dir: args.work_dir,
        executor_config,
        executor,
        task_id: args.task_id,
    }))
}

/// Execute the show subcommand.
fn run_show(root: &Path, args: ShowArgs) -> Result<(), MirError> {
    let repo = MirRepo::open(root)?;
    let snapshot = repo.load(
        args.rev.as_ref(),
        &[MirStorage::Keywords, MirStorage::Tasks, MirStorage::Annotations],
    )?;
    let labels = repo.labels()?;
    let report = show::show_snapshot(
        &snapshot.keywords,
        &snapshot.tasks,
        &labels,
        snapshot.annotations.prediction.model.as_ref(),
        &show::ShowOptions {
            bar_width: args.bar_width,
        },
    );
    match args.output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{report}");
            Ok(())
        }
    }
}

/// Execute the diff subcommand.
fn run_diff(root: &Path, args: DiffArgs) -> Result<(), MirError> {
    let repo = MirRepo::open(root)?;
    let a = repo.load_snapshot(&args.a)?;
    let b = repo.load_snapshot(&args.b)?;
    let opts = diff::DiffOptions {
        match_by: args.match_by,
        iou_threshold: args.iou_threshold,
        detail: args.detail,
        max_items: args.max_items,
        ..Default::default()
    };
    let report = diff::diff_snapshots(&a, &b, &opts);
    match args.output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{report}");
            Ok(())
        }
    }
}

/// Execute the log subcommand.
fn run_log(root: &Path, args: LogArgs) -> Result<(), MirError> {
    let repo = MirRepo::open(root)?;
    let store = repo.store();
    let start = match &args.rev {
        Some(rev) => repo.resolve(rev)?,
        None => store.head_commit()?.ok_or_else(|| {
            MirError::InvalidBranchOrTag("current branch has no commits".to_string())
        })?,
    };

    let mut tags: BTreeMap<vcs::CommitId, Vec<String>> = BTreeMap::new();
    for tag in store.list_tags()? {
        let commit = store.resolve(&tag)?;
        tags.entry(commit).or_default().push(tag);
    }

    for info in store.log(&start, args.limit)? {
        let when = chrono::DateTime::from_timestamp(info.record.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let names = tags
            .get(&info.id)
            .map(|names| format!(" ({})", names.join(", ")))
            .unwrap_or_default();
        println!("{} {when} {}{names}", info.id.short(), info.record.message);
    }
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(root: &Path, args: ValidateArgs) -> Result<(), MirError> {
    let repo = MirRepo::open(root)?;
    let snapshot = repo.load(args.rev.as_ref(), &MirStorage::ALL)?;
    let opts = validation::ValidateOptions {
        strict: args.strict,
        ..Default::default()
    };
    let report = validation::validate_snapshot(&snapshot, &opts);

    match args.output {
        OutputFormat::Json => print_json(&report.summary())?,
        OutputFormat::Text => print!("{report}"),
    }

    let has_warnings = report.warning_count() > 0;
    if report.error_count() > 0 || (args.strict && has_warnings) {
        Err(MirError::SnapshotInvalid {
            error_count: report.error_count() + if args.strict { report.warning_count() } else { 0 },
            report,
        })
    } else {
        Ok(())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), MirError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| MirError::InvalidArgs(format!("cannot serialize report: {e}")))?;
    println!("{text}");
    Ok(())
}
