use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const STUBS: &str = "github:\n  get#/user:\n    200-ok: {login: octocat}\n";

fn apiflows(workspace: &Path) -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("apiflows"));
    command
        .env_remove("CI")
        .env_remove("RUST_LOG")
        .env_remove("APIFLOWS_LOG_LEVEL")
        .arg("stubs")
        .arg(workspace.join("github.stubs.yaml"))
        .arg("--workspace")
        .arg(workspace);
    command
}

fn log_file(workspace: &Path) -> String {
    fs::read_to_string(workspace.join(".apiflows/logs/apiflows.log")).unwrap()
}

#[test]
fn local_run_logs_to_stderr_and_file() {
    let workspace = tempdir().unwrap();
    fs::write(workspace.path().join("github.stubs.yaml"), STUBS).unwrap();

    apiflows(workspace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("get#/user"))
        .stderr(predicate::str::contains("stub file loaded"));

    assert!(log_file(workspace.path()).contains("stub file loaded"));
}

#[test]
fn ci_run_keeps_console_quiet() {
    let workspace = tempdir().unwrap();
    fs::write(workspace.path().join("github.stubs.yaml"), STUBS).unwrap();

    apiflows(workspace.path())
        .env("CI", "true")
        .assert()
        .success()
        .stderr(predicate::str::contains("stub file loaded").not());

    assert!(log_file(workspace.path()).contains("stub file loaded"));
}

#[test]
fn workspace_config_routes_console_and_level() {
    let workspace = tempdir().unwrap();
    fs::write(workspace.path().join("github.stubs.yaml"), STUBS).unwrap();
    let config_dir = workspace.path().join(".apiflows/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("logging.toml"),
        "[logging]\nconsole_output = \"stdout\"\ndefault_level = \"warn\"\n",
    )
    .unwrap();

    apiflows(workspace.path())
        .env("CI", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("stub file loaded").not());

    apiflows(workspace.path())
        .env("CI", "true")
        .env("APIFLOWS_LOG_LEVEL", "info")
        .assert()
        .success()
        .stdout(predicate::str::contains("stub file loaded"));
}

#[test]
fn disabled_file_sink_writes_no_log() {
    let workspace = tempdir().unwrap();
    fs::write(workspace.path().join("github.stubs.yaml"), STUBS).unwrap();
    let config_dir = workspace.path().join(".apiflows/config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("logging.toml"), "[logging]\nenable_file = false\n").unwrap();

    apiflows(workspace.path()).assert().success();

    assert!(!workspace.path().join(".apiflows/logs/apiflows.log").exists());
}
