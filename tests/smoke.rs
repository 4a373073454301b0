//! Smoke tests -- verify the binary runs and the CLI surface is intact.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Dashboard backend and client for Playwright test jobs on Jenkins",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("testpanel"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_run_subcommand_exists() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--test"));
}

#[test]
fn test_run_all_subcommand_exists() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .args(["run-all", "--help"])
        .assert()
        .success();
}

#[test]
fn test_watch_subcommand_exists() {
    Command::cargo_bin("testpanel")
        .unwrap()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--journal"));
}
