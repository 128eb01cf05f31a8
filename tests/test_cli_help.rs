use assert_cmd::Command;
use predicates::prelude::*;

fn apiflows() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("apiflows"))
}

#[test]
fn test_top_level_help_lists_snapshot_commands() {
    apiflows()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SNAPSHOT COMMANDS"))
        .stdout(predicate::str::contains("stubs"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("fold"))
        .stdout(predicate::str::contains("unfold"))
        .stdout(predicate::str::contains("expand"));
}

#[test]
fn test_version_flag_prints_crate_version() {
    apiflows()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(apiflows::VERSION));
}

#[test]
fn test_fold_help_describes_output_options() {
    apiflows()
        .args(["fold", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--repeated"))
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--feature"))
        .stdout(predicate::str::contains("--flat"))
        .stdout(predicate::str::contains("Example:"));
}

#[test]
fn test_expand_help_lists_filters() {
    apiflows()
        .args(["expand", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--filter-used-asserts"))
        .stdout(predicate::str::contains("--filter-used-subflows"))
        .stdout(predicate::str::contains("--context-set-up"));
}

#[test]
fn test_resolve_requires_method_and_url() {
    apiflows()
        .args(["resolve", "github.stubs.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<METHOD>"));
}
