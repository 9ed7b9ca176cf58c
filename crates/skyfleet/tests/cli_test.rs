#![allow(deprecated)] // cargo_bin is still the simplest way to reach the binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn skyfleet() -> Command {
    let mut cmd = Command::cargo_bin("skyfleet").unwrap();
    cmd.env_remove("SKYFLEET_PROJECT");
    cmd
}

#[test]
fn test_cli_help() {
    skyfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deployment_create"))
        .stdout(predicate::str::contains("list_deployment_resources"))
        .stdout(predicate::str::contains("create_instances_from_snapshot_images"))
        .stdout(predicate::str::contains("check_cassandra_status"));
}

#[test]
fn test_cli_version() {
    skyfleet()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skyfleet"));
}

#[test]
fn test_instance_command_requires_targets() {
    skyfleet()
        .arg("create_instances")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<TARGETS>"));
}

#[test]
fn test_composite_takes_no_targets() {
    skyfleet()
        .args(["deployment_create", "bastion"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_global_flags_in_help() {
    skyfleet()
        .args(["ping_instances", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--ping-repetitions"))
        .stdout(predicate::str::contains("--project"))
        .stdout(predicate::str::contains("[env: SKYFLEET_PROJECT="));
}

#[test]
fn test_missing_project_file() {
    let dir = tempfile::tempdir().unwrap();
    skyfleet()
        .current_dir(dir.path())
        .arg("list_deployments")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot load project skyfleet.json"));
}

#[test]
fn test_project_from_env_with_missing_variable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(
        &path,
        r#"{ "deployment_name": "{SKYFLEET_DEPLOYMENT}", "instances": {} }"#,
    )
    .unwrap();

    temp_env::with_var_unset("SKYFLEET_DEPLOYMENT", || {
        skyfleet()
            .env("SKYFLEET_PROJECT", &path)
            .env_remove("SKYFLEET_DEPLOYMENT")
            .arg("list_deployment_resources")
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("SKYFLEET_DEPLOYMENT"));
    });
}
