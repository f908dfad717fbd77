//! Error handling tests.
//!
//! Broken input must never take the index down: each failure is reported
//! as a diagnostic and the rest of the workspace stays queryable.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use zuul_index::*;

fn workspace(files: &[(&str, &[u8])]) -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    for (rel, content) in files {
        let path = temp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    temp
}

async fn index(root: &Path) -> (IndexController, IndexReport, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let config = IndexConfig {
        use_cache: false,
        ..IndexConfig::default()
    };
    let controller = IndexController::with_sink(root, config, sink.clone()).unwrap();
    let report = controller.index_all().await.unwrap();
    (controller, report, sink)
}

const GOOD: &[u8] = b"- job:\n    name: good\n";

#[tokio::test]
async fn unparseable_file_is_tracked_without_records() {
    let temp = workspace(&[
        ("zuul.d/good.yaml", GOOD),
        ("zuul.d/broken.yaml", b"- job:\n    name: [unclosed\n"),
    ]);
    let (controller, report, sink) = index(temp.path()).await;

    assert_eq!(report.parsed_files, 2);
    assert_eq!(report.failed_files, 0);
    let broken = temp.path().join("zuul.d/broken.yaml");
    assert_eq!(controller.state().status(&broken), FileStatus::Indexed);
    assert!(controller.state().jobs.read().get_all_for_file(&broken).is_empty());
    assert!(controller.state().jobs.read().get_by_name("good").is_some());
    assert!(sink.snapshot().iter().any(|d| matches!(
        d,
        Diagnostic::UnparseableDocument { file, .. } if *file == broken
    )));
}

#[tokio::test]
async fn job_without_name_is_reported_and_skipped() {
    let temp = workspace(&[(
        "zuul.yaml",
        b"- job:\n    parent: base\n    timeout: 60\n- job:\n    name: named\n",
    )]);
    let (controller, _, sink) = index(temp.path()).await;

    assert_eq!(controller.state().jobs.read().total_count(), 1);
    let reported = sink
        .snapshot()
        .iter()
        .filter(|d| matches!(d, Diagnostic::MissingJobName { .. }))
        .count();
    assert_eq!(reported, 1);
}

#[tokio::test]
async fn non_utf8_file_is_indexed_empty() {
    let temp = workspace(&[
        ("zuul.d/good.yaml", GOOD),
        ("zuul.d/binary.yaml", &[0x2d, 0x20, 0xff, 0xfe, 0x0a]),
    ]);
    let binary = temp.path().join("zuul.d/binary.yaml");
    let sink = Arc::new(CollectingSink::new());
    let controller =
        IndexController::with_sink(temp.path(), IndexConfig::default(), sink.clone()).unwrap();

    for _ in 0..2 {
        let report = controller.index_all().await.unwrap();
        assert_eq!(report.total_files, 2);
        assert_eq!(report.failed_files, 0);
        assert_eq!(controller.state().status(&binary), FileStatus::Indexed);
    }
    assert_eq!(controller.state().jobs.read().total_count(), 1);

    let diagnostics = sink.snapshot();
    assert!(
        !diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UnreadableFile { .. }))
    );
    // The cached empty result is reused on the second pass.
    let unparseable = diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::UnparseableDocument { file, .. } if *file == binary))
        .count();
    assert_eq!(unparseable, 1);
}

#[tokio::test]
async fn unknown_parent_keeps_partial_chain() {
    let temp = workspace(&[(
        "zuul.yaml",
        b"- job:\n    name: orphan\n    parent: missing\n    voting: false\n",
    )]);
    let (controller, _, sink) = index(temp.path()).await;

    let resolved = controller.resolve("orphan").unwrap().unwrap();
    assert_eq!(resolved.chain, vec!["orphan"]);
    assert_eq!(resolved.value("voting"), Some("false"));
    assert!(sink.snapshot().iter().any(|d| matches!(
        d,
        Diagnostic::UnknownParent { parent, .. } if parent == "missing"
    )));
}

#[tokio::test]
async fn parent_cycle_is_truncated() {
    let temp = workspace(&[(
        "zuul.yaml",
        b"- job:\n    name: a\n    parent: b\n- job:\n    name: b\n    parent: a\n",
    )]);
    let (controller, _, sink) = index(temp.path()).await;

    let resolved = controller.resolve("a").unwrap().unwrap();
    assert!(resolved.truncated);
    assert_eq!(resolved.chain.len(), 2);
    assert!(
        sink.snapshot()
            .iter()
            .any(|d| matches!(d, Diagnostic::ParentCycle { .. }))
    );
}

#[test]
fn malformed_config_is_an_error() {
    let temp = workspace(&[(".zuul-index/config.json", b"{ \"use-cache\": ")]);
    let err = IndexConfig::discover(temp.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config"));
}

#[test]
fn cli_reports_malformed_config_as_json() {
    let temp = workspace(&[("zuul.yaml", GOOD), (".zuul-index/config.json", b"[1, 2")]);
    let output = Command::new(env!("CARGO_BIN_EXE_zuul-index"))
        .args(["--json", "-w", temp.path().to_str().unwrap(), "index"])
        .output()
        .expect("Failed to execute zuul-index CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let json: Value = serde_json::from_str(&stderr).expect("JSON error on stderr");
    assert!(json["error"].as_str().unwrap().contains("config"));
}

#[test]
fn cli_missing_attribute_is_an_error() {
    let temp = workspace(&[("zuul.yaml", GOOD)]);
    let output = Command::new(env!("CARGO_BIN_EXE_zuul-index"))
        .args([
            "--json",
            "--no-cache",
            "-w",
            temp.path().to_str().unwrap(),
            "resolve",
            "good",
            "--key",
            "nodeset",
        ])
        .output()
        .expect("Failed to execute zuul-index CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no attribute `nodeset`"));
}
