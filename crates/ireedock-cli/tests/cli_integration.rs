//! CLI subprocess integration tests.
//!
//! These tests invoke the `ireedock` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output. Compilation runs against the mock
//! backend, so no container engine is needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const IR: &str = "module {\n  func.func @main(%arg0: tensor<2xf32>) -> tensor<2xf32> {\n    return %arg0 : tensor<2xf32>\n  }\n}\n";

/// A binary invocation isolated from the user's settings and staging root.
fn ireedock_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ireedock"));
    cmd.env("HOME", home)
        .env("IREEDOCK_BACKEND", "mock")
        .env("IREEDOCK_STAGING_ROOT", home.join("staging"))
        .env_remove("IREEDOCK_CONFIG")
        .env_remove("IREEDOCK_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_model(dir: &Path) -> PathBuf {
    let path = dir.join("model.mlir");
    fs::write(&path, IR).unwrap();
    path
}

#[test]
fn cli_version_exits_zero() {
    let home = tempfile::tempdir().unwrap();
    let output = ireedock_bin(home.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("ireedock"));
}

#[test]
fn cli_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    let output = ireedock_bin(home.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["compile", "generate-config", "validate-config", "status"] {
        assert!(out.contains(cmd), "help must list '{cmd}': {out}");
    }
}

#[test]
fn cli_generate_config_prints_valid_json() {
    let home = tempfile::tempdir().unwrap();
    let output = ireedock_bin(home.path())
        .args(["generate-config", "--target", "vulkan"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(doc["target"], "vulkan");
    assert!(doc["target_specific"]["vulkan"].is_object());
}

#[test]
fn cli_generated_config_validates() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("metal.json");
    let gen = ireedock_bin(home.path())
        .args(["generate-config", "-t", "metal", "-o"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(gen.status.success(), "stderr: {}", stderr(&gen));
    assert!(path.is_file());

    let output = ireedock_bin(home.path())
        .args(["validate-config", "-c"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    assert!(stdout(&output).contains("valid"));
}

#[test]
fn cli_validate_config_reports_every_violation() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("bad.json");
    fs::write(
        &path,
        r#"{
            "input_file": "/input/m.mlir",
            "output_file": "/output/m.vmfb",
            "target": "vulkan",
            "output_format": "so",
            "target_specific": {"vulkan": {"spirv_version": "1.4", "vulkan_version": "1.0"}}
        }"#,
    )
    .unwrap();

    let output = ireedock_bin(home.path())
        .args(["--json", "validate-config", "-c"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(doc["valid"], false);
    let violations = doc["violations"].as_array().unwrap();
    assert!(violations.len() >= 2, "{violations:?}");
    assert!(violations
        .iter()
        .any(|v| v["kind"] == "cross_field_violation"));
}

#[test]
fn cli_validate_config_normalizes_to_file() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("req.json");
    fs::write(
        &path,
        r#"{
            "input_file": "deep/dir/model.mlir",
            "output_file": "model.so",
            "target": "cpu",
            "optimization_level": "O2",
            "output_format": "so",
            "target_features": ["avx2", "avx2", "sse2"]
        }"#,
    )
    .unwrap();
    let out_path = home.path().join("normalized.json");

    let output = ireedock_bin(home.path())
        .args(["validate-config", "--normalize", "-c"])
        .arg(&path)
        .arg("-o")
        .arg(&out_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "stdout: {}", stdout(&output));

    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(doc["input_file"], "/input/model.mlir");
    assert_eq!(doc["output_file"], "/output/model.so");
    assert_eq!(doc["target_features"], serde_json::json!(["avx2", "sse2"]));
}

#[test]
fn cli_validate_config_unparsable_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let output = ireedock_bin(home.path())
        .args(["validate-config", "-c"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("config error"));
}

#[test]
fn cli_compile_with_mock_delivers_artifact() {
    let home = tempfile::tempdir().unwrap();
    let model = write_model(home.path());
    let dest = home.path().join("out/model.vmfb");

    let output = ireedock_bin(home.path())
        .args(["--json", "compile", "-t", "cpu", "--target-features", "avx2", "-i"])
        .arg(&model)
        .arg("-o")
        .arg(&dest)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "compile must exit 0. stderr: {}",
        stderr(&output)
    );
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["target"], "cpu");
    assert!(dest.is_file());
    let staged = report["staged_input"].as_str().unwrap();
    assert!(staged.starts_with(&home.path().join("staging/requests").display().to_string()));
    assert!(staged.ends_with("input/model.mlir"));
    assert_eq!(
        fs::read_dir(home.path().join("staging/requests")).unwrap().count(),
        0
    );
}

#[test]
fn cli_compile_dry_run_stages_nothing() {
    let home = tempfile::tempdir().unwrap();
    let model = write_model(home.path());

    let output = ireedock_bin(home.path())
        .args(["compile", "--dry-run", "-i"])
        .arg(&model)
        .args(["-o", "model.vmfb"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("iree-compiler:cuda-latest"));
    assert!(out.contains("--network none"));
    assert!(!home.path().join("staging").exists());
}

#[test]
fn cli_compile_rejects_feature_for_wrong_target() {
    let home = tempfile::tempdir().unwrap();
    let model = write_model(home.path());

    let output = ireedock_bin(home.path())
        .args(["compile", "-t", "cuda", "--target-features", "avx2", "-i"])
        .arg(&model)
        .args(["-o", "model.vmfb"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("sm_"));
}

#[test]
fn cli_compile_rejects_non_ir_input_as_staging_error() {
    let home = tempfile::tempdir().unwrap();
    let bogus = home.path().join("model.mlir");
    fs::write(&bogus, "just some notes, nothing compilable here\n").unwrap();

    let output = ireedock_bin(home.path())
        .args(["compile", "-i"])
        .arg(&bogus)
        .args(["-o", "model.vmfb"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("staging error"));
}

#[test]
fn cli_status_json_with_mock() {
    let home = tempfile::tempdir().unwrap();
    let output = ireedock_bin(home.path())
        .args(["--json", "status", "-t", "cpu"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["backend"], "mock");
    assert_eq!(report["images"][0]["target"], "cpu");
    assert_eq!(report["images"][0]["available"], true);
    assert_eq!(report["staging"]["exists"], false);
}

#[test]
fn cli_malformed_settings_fail() {
    let home = tempfile::tempdir().unwrap();
    let settings = home.path().join("settings.toml");
    fs::write(&settings, "backend = [\n").unwrap();

    let output = ireedock_bin(home.path())
        .args(["status", "--settings"])
        .arg(&settings)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("settings error"));
}
