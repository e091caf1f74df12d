use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    cargo_bin_cmd!("hextok")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_unknown_command_fails() {
    cargo_bin_cmd!("hextok")
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
