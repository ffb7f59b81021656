//! Integration tests for verifying snapshots produced by the builder

use super::common::deployment::{at, ScratchDeployment};
use snapguard::snapshot::{CategoryStatus, Manifest, MANIFEST_FILE};
use snapguard::verify::{CheckGroup, CheckStatus};
use snapguard::{BackupOptions, SnapshotBuilder, Verdict, Verifier};
use std::fs;
use std::path::PathBuf;

async fn backup(deployment: &ScratchDeployment, options: BackupOptions) -> (PathBuf, PathBuf) {
    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(10, 8))
        .build(&options)
        .await
        .unwrap();
    (outcome.dir, outcome.archive)
}

/// Test that a fresh snapshot of a healthy deployment is complete and valid
#[tokio::test]
async fn test_fresh_snapshot_is_complete_and_valid() {
    let deployment = ScratchDeployment::new();
    let (dir, archive) = backup(&deployment, BackupOptions::default()).await;

    for path in [&dir, &archive] {
        let report = Verifier::default().verify(path, true).unwrap();
        assert_eq!(report.verdict(), Verdict::CompleteAndValid, "{report:#?}");
        assert_eq!(report.failures(), 0);
        assert_eq!(report.warnings(), 0);
    }
}

/// Test that every group reports, in order
#[tokio::test]
async fn test_report_covers_every_group() {
    let deployment = ScratchDeployment::new();
    let (dir, _) = backup(&deployment, BackupOptions::default()).await;

    let report = Verifier::default().verify(&dir, false).unwrap();
    let mut seen: Vec<CheckGroup> = report.checks.iter().map(|c| c.group).collect();
    seen.dedup();
    assert_eq!(seen, CheckGroup::ALL.to_vec());
}

/// Test that a five-line environment file is usable with warnings
#[tokio::test]
async fn test_short_env_file_is_usable_with_warnings() {
    let deployment = ScratchDeployment::with_env_lines(5);
    let (dir, _) = backup(&deployment, BackupOptions::default()).await;

    let report = Verifier::default().verify(&dir, false).unwrap();
    assert_eq!(report.verdict(), Verdict::UsableWithWarnings);
    assert_eq!(report.failures(), 0);
    let env = report.check("Environment config").unwrap();
    assert_eq!(env.status, CheckStatus::Warn);
    assert!(env.detail.as_deref().unwrap().contains("only 5 lines"));
}

/// Test that removing the manifest is a critical issue
#[tokio::test]
async fn test_missing_manifest_is_critical() {
    let deployment = ScratchDeployment::new();
    let (dir, _) = backup(&deployment, BackupOptions::default()).await;
    fs::remove_file(dir.join(MANIFEST_FILE)).unwrap();

    let report = Verifier::default().verify(&dir, false).unwrap();
    assert_eq!(report.verdict(), Verdict::CriticalIssues);
    assert_eq!(report.checks[0].status, CheckStatus::Fail);
}

/// Test that logs are only required when the manifest says they were included
#[tokio::test]
async fn test_logs_expected_only_when_included() {
    let deployment = ScratchDeployment::new();
    let (dir, _) = backup(
        &deployment,
        BackupOptions {
            include_logs: true,
            ..BackupOptions::default()
        },
    )
    .await;
    let manifest = Manifest::read(&dir).unwrap();
    assert_eq!(
        manifest.categories[&snapguard::Category::Logs].status,
        CategoryStatus::Copied
    );
    assert_eq!(
        Verifier::default().verify(&dir, false).unwrap().verdict(),
        Verdict::CompleteAndValid
    );

    fs::remove_dir_all(dir.join("logs")).unwrap();
    let report = Verifier::default().verify(&dir, false).unwrap();
    let check = report.check("Category directories").unwrap();
    assert_eq!(check.status, CheckStatus::Fail);
    assert!(check.detail.as_deref().unwrap().contains("logs"));
}

/// Test that tampering with a configuration file is caught by detailed mode
#[tokio::test]
async fn test_detailed_mode_catches_tampering() {
    let deployment = ScratchDeployment::new();
    let (dir, _) = backup(&deployment, BackupOptions::default()).await;
    fs::write(dir.join("config/.env"), "TAMPERED=1\n".repeat(12)).unwrap();

    let shallow = Verifier::default().verify(&dir, false).unwrap();
    assert_eq!(shallow.verdict(), Verdict::CompleteAndValid);

    let detailed = Verifier::default().verify(&dir, true).unwrap();
    let checksums = detailed.check("Checksums").unwrap();
    assert_eq!(checksums.status, CheckStatus::Warn);
    assert_eq!(detailed.verdict(), Verdict::UsableWithWarnings);
}

/// Test that verification never modifies the snapshot
#[tokio::test]
async fn test_verification_is_read_only() {
    let deployment = ScratchDeployment::new();
    let (dir, archive) = backup(&deployment, BackupOptions::default()).await;
    let files_before = super::common::deployment::file_set(&dir);
    let archive_before = fs::read(&archive).unwrap();

    Verifier::default().verify(&dir, true).unwrap();
    Verifier::default().verify(&archive, true).unwrap();

    assert_eq!(super::common::deployment::file_set(&dir), files_before);
    assert_eq!(fs::read(&archive).unwrap(), archive_before);
}
