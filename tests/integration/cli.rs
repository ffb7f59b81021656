//! End-to-end tests for the snapguard binary

use super::common::deployment::ScratchDeployment;
use assert_cmd::Command;
use predicates::prelude::*;
use snapguard::snapshot::{list_snapshots, MANIFEST_FILE};
use std::fs;
use tempfile::TempDir;

/// A binary invocation pointed at the scratch deployment with an isolated data dir
fn snapguard(deployment: &ScratchDeployment, home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("snapguard").unwrap();
    cmd.env("SNAPGUARD_HOME", home.path())
        .arg("--root")
        .arg(&deployment.root);
    cmd
}

fn setup() -> (ScratchDeployment, TempDir) {
    let deployment = ScratchDeployment::new();
    deployment.write_config_without_engine();
    (deployment, TempDir::new().unwrap())
}

fn only_snapshot(deployment: &ScratchDeployment) -> String {
    let snapshots = list_snapshots(&deployment.backups()).unwrap();
    assert_eq!(snapshots.len(), 1, "{snapshots:?}");
    snapshots[0].name.clone()
}

#[test]
fn test_backup_creates_snapshot_and_archive() {
    let (deployment, home) = setup();

    snapguard(&deployment, &home)
        .args(["backup", "--name", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup succeeded"));

    let name = only_snapshot(&deployment);
    assert!(name.starts_with("nightly_"));
    assert!(deployment.backups().join(&name).join(MANIFEST_FILE).is_file());
    assert!(deployment.backups().join(format!("{name}.zip")).is_file());
    // the log file lands in the data dir, not the deployment
    assert!(home.path().join("logs").is_dir());
}

#[test]
fn test_verify_by_name_exits_with_failure_count() {
    let (deployment, home) = setup();
    snapguard(&deployment, &home).arg("backup").assert().success();
    let name = only_snapshot(&deployment);

    snapguard(&deployment, &home)
        .args(["verify", "--backup", &name])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("complete-and-valid"));

    fs::remove_file(deployment.backups().join(&name).join(MANIFEST_FILE)).unwrap();
    snapguard(&deployment, &home)
        .args(["verify", "--backup", &name])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("critical-issues"));
}

#[test]
fn test_verify_without_backup_lists_snapshots() {
    let (deployment, home) = setup();
    snapguard(&deployment, &home)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("no snapshots found"));

    snapguard(&deployment, &home).arg("backup").assert().success();
    let name = only_snapshot(&deployment);
    snapguard(&deployment, &home)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains(name).and(predicate::str::contains("dir+archive")));
}

#[test]
fn test_verify_missing_path_is_an_error() {
    let (deployment, home) = setup();
    snapguard(&deployment, &home)
        .args(["verify", "--backup", "does_not_exist"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Verification could not run"));
}

#[test]
fn test_forced_restore_with_skip_services() {
    let (deployment, home) = setup();
    let original = deployment.read(".env");
    snapguard(&deployment, &home).arg("backup").assert().success();
    let name = only_snapshot(&deployment);
    deployment.write(".env", "SETTING_0=changed\n");

    snapguard(&deployment, &home)
        .args(["restore", "--backup", &name, "--force", "--skip-services"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore succeeded"));

    assert_eq!(deployment.read(".env"), original);
}

#[test]
fn test_declined_confirmation_changes_nothing() {
    let (deployment, home) = setup();
    snapguard(&deployment, &home).arg("backup").assert().success();
    let name = only_snapshot(&deployment);
    deployment.write(".env", "SETTING_0=changed\n");

    snapguard(&deployment, &home)
        .args(["restore", "--backup", &name, "--skip-services"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore cancelled"));

    assert_eq!(deployment.read(".env"), "SETTING_0=changed\n");
    // no safety snapshot either
    assert_eq!(list_snapshots(&deployment.backups()).unwrap().len(), 1);
}

#[test]
fn test_restore_without_engine_needs_skip_services() {
    let (deployment, home) = setup();
    snapguard(&deployment, &home).arg("backup").assert().success();
    let name = only_snapshot(&deployment);

    snapguard(&deployment, &home)
        .args(["restore", "--backup", &name, "--force"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--skip-services"));
}

#[test]
fn test_init_writes_example_config_once() {
    let deployment = ScratchDeployment::new();
    let home = TempDir::new().unwrap();

    snapguard(&deployment, &home)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(deployment.exists("snapguard.toml"));

    snapguard(&deployment, &home)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already has a snapguard.toml"));
}
