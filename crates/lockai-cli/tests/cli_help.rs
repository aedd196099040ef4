//! Smoke tests for CLI argument parsing.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    cargo_bin_cmd!("lockai")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("paper"));
}

#[test]
fn test_paper_help_lists_subcommands() {
    cargo_bin_cmd!("lockai")
        .args(["paper", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("revise"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_unknown_command_fails() {
    cargo_bin_cmd!("lockai")
        .arg("frobnicate")
        .assert()
        .failure();
}
