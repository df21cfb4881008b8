use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::{write_annotations, write_media};

fn mir(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mir").unwrap();
    cmd.arg("-C").arg(root).env_remove("MIR_LOG");
    cmd
}

/// A repository with one imported branch `a` (tag `a@t-import`).
fn seeded(dir: &Path) -> std::path::PathBuf {
    let root = dir.join("repo");
    mir(&root)
        .args(["init", "--label", "cat,dog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized repository"));

    let media = dir.join("media");
    write_media(&media, &["a.bmp", "b.bmp"]);
    let gt = dir.join("gt.json");
    write_annotations(
        &gt,
        &[
            ("a.bmp", "cat", [2.0, 2.0, 20.0, 20.0], None),
            ("b.bmp", "dog", [4.0, 4.0, 30.0, 30.0], None),
        ],
    );
    let pred = dir.join("pred.json");
    write_annotations(&pred, &[("a.bmp", "cat", [2.0, 2.0, 20.0, 20.0], Some(0.8))]);

    mir(&root)
        .arg("import")
        .arg(&media)
        .arg("--gt")
        .arg(&gt)
        .arg("--pred")
        .arg(&pred)
        .args(["--dst", "a", "--task-id", "t-import", "--split", "tr"])
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 asset(s) and 3 object(s)"));
    root
}

#[test]
fn runs() {
    let mut cmd = Command::cargo_bin("mir").unwrap();
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("mir "));
}

#[test]
fn outputs_tool_name() {
    let mut cmd = Command::cargo_bin("mir").unwrap();
    cmd.arg("-V");
    cmd.assert()
        .success()
        .stdout(format!("mir {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn show_reports_counts_and_head_task() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    mir(&root)
        .args(["show", "a@t-import"])
        .assert()
        .success()
        .stdout(predicate::str::contains("t-import"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("Training"));

    let output = mir(&root)
        .args(["show", "a", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["assets"]["total"], 2);
    assert_eq!(json["assets"]["training"], 2);
}

#[test]
fn validate_passes_on_committed_revision() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    mir(&root)
        .args(["validate", "a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed"));

    let output = mir(&root)
        .args(["validate", "a", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["error_count"], 0);
}

#[test]
fn filter_diff_and_log() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    mir(&root)
        .args(["filter", "a", "--dst", "dogs", "--include", "dog", "--task-id", "t-dogs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dogs@t-dogs"));

    mir(&root)
        .args(["diff", "a", "dogs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 shared, 1 only in A, 0 only in B"));

    mir(&root)
        .args(["log", "dogs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dogs@t-dogs"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn evaluate_prints_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    let output = mir(&root)
        .args([
            "evaluate",
            "a@t-import",
            "--dst",
            "eval",
            "--iou-thrs",
            "0.5:1.0:0.05",
            "--class",
            "cat",
            "--output",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["iou_evaluations"].as_object().unwrap().len(), 10);
    let ap = json["iou_evaluations"]["0.50"]["ci_evaluations"]["0"]["ap"]
        .as_f64()
        .unwrap();
    assert!((ap - 1.0).abs() < 1e-9);

    mir(&root)
        .args(["show", "eval"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mAP"));
}

#[test]
fn unknown_class_exits_with_invalid_args() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());
    let gt = dir.path().join("drone.json");
    write_annotations(&gt, &[("a.bmp", "drone", [0.0, 0.0, 5.0, 5.0], None)]);

    mir(&root)
        .arg("import")
        .arg(dir.path().join("media"))
        .arg("--gt")
        .arg(&gt)
        .args(["--dst", "d"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("drone"));
}

#[test]
fn merge_conflict_exits_with_code_8() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    mir(&root)
        .args(["merge", "--host", "a", "--guest", "a@t-import", "--dst", "m"])
        .assert()
        .code(8);
    mir(&root)
        .args([
            "merge", "--host", "a", "--guest", "va:a@t-import", "--strategy", "guest", "--dst", "m",
        ])
        .assert()
        .success();
}

#[test]
fn missing_repository_exits_with_code_3() {
    let dir = tempfile::tempdir().unwrap();
    mir(&dir.path().join("nowhere"))
        .args(["show"])
        .assert()
        .code(3);
}

#[test]
fn malformed_revision_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());
    mir(&root)
        .args(["show", "a@b@c"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("a@b@c"));
}

#[cfg(unix)]
#[test]
fn exec_runs_external_program() {
    let dir = tempfile::tempdir().unwrap();
    let root = seeded(dir.path());

    mir(&root)
        .args([
            "exec",
            "training",
            "a",
            "--dst",
            "trained",
            "--task-id",
            "t-train",
            "--executor",
            "sh",
            "--executor-arg",
            "-c",
            "--executor-arg",
            "printf 'model:\\n  model_hash: abc123\\n' > \"$1/out/result.yaml\"",
            "--executor-arg",
            "sh",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("trained@t-train"));

    mir(&root)
        .args([
            "exec",
            "training",
            "a",
            "--dst",
            "broken",
            "--task-id",
            "t-broken",
            "--executor",
            "sh",
            "--executor-arg",
            "-c",
            "--executor-arg",
            "echo boom >&2; exit 3",
            "--executor-arg",
            "sh",
        ])
        .assert()
        .code(9)
        .stderr(predicate::str::contains("boom"));

    mir(&root)
        .args(["show", "broken@t-broken"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed"));
}
