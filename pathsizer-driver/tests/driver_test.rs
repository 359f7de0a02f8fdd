// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::{Command, Output};

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../tests/data")
        .join(name)
}

fn run_driver(args: &[&str]) -> Output {
    let driver = env!("CARGO_BIN_EXE_pathsizer-driver");
    Command::new(driver)
        .args(args)
        .output()
        .expect("driver should launch")
}

fn build_model(dir: &std::path::Path) -> PathBuf {
    let model = dir.join("model.json");
    let output = run_driver(&[
        "build-model",
        "--path-json",
        data_path("critical_path.json").to_str().unwrap(),
        "--liberty",
        data_path("buffers.lib").to_str().unwrap(),
        "--spef",
        data_path("critical_path.spef").to_str().unwrap(),
        "--output",
        model.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "build-model failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    model
}

#[test]
fn parse_liberty_reports_counts() {
    let output = run_driver(&["parse-liberty", data_path("buffers.lib").to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cells: 6"), "{}", stdout);
    assert!(stdout.contains("families: 3"), "{}", stdout);
}

#[test]
fn build_then_dry_run_solve() {
    let dir = tempfile::tempdir().unwrap();
    let model = build_model(dir.path());
    let solution = dir.path().join("buffers.sol");
    let output = run_driver(&[
        "solve",
        "--model",
        model.to_str().unwrap(),
        "--solution",
        solution.to_str().unwrap(),
        "--dry-run",
    ]);
    assert!(
        output.status.success(),
        "solve failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = std::fs::read_to_string(&solution).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("_201_ sky130_fd_sc_hd__buf_"), "{}", text);
    assert!(lines[1].starts_with("_202_ sky130_fd_sc_hd__buf_"), "{}", text);

    let output = run_driver(&[
        "estimate",
        "--model",
        model.to_str().unwrap(),
        "--solution",
        solution.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("setup slack"));
}

#[test]
fn empty_lib_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_driver(&[
        "build-model",
        "--path-json",
        data_path("critical_path.json").to_str().unwrap(),
        "--lib-dir",
        dir.path().to_str().unwrap(),
        "--output",
        dir.path().join("model.json").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no liberty files found"), "{}", stderr);
}

#[test]
fn missing_spef_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_driver(&[
        "build-model",
        "--path-json",
        data_path("critical_path.json").to_str().unwrap(),
        "--liberty",
        data_path("buffers.lib").to_str().unwrap(),
        "--spef",
        dir.path().join("absent.spef").to_str().unwrap(),
        "--output",
        dir.path().join("model.json").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(!dir.path().join("model.json").exists());
}

#[test]
fn unreachable_period_reports_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = build_model(dir.path());
    let text = std::fs::read_to_string(&model_path).unwrap();
    let mut model: serde_json::Value = serde_json::from_str(&text).unwrap();
    model["timing"]["period"] = serde_json::json!(0.1);
    std::fs::write(&model_path, serde_json::to_string(&model).unwrap()).unwrap();

    let output = run_driver(&["solve", "--model", model_path.to_str().unwrap(), "--dry-run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no assignment meets timing"), "{}", stderr);
}
