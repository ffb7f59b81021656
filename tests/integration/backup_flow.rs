//! Integration tests for snapshot creation

use super::common::deployment::{at, file_set, mock, runtime, ScratchDeployment};
use super::common::git_fixtures::{git_available, GitTree};
use snapguard::git::NO_REVISION;
use snapguard::snapshot::{
    list_snapshots, CategoryStatus, Manifest, OpenedSnapshot, SnapshotKind, PATCH_FILE,
};
use snapguard::{BackupOptions, Category, SnapshotBuilder, SnapshotError};
use std::fs;

/// Test that the archive carries exactly what the directory carries
#[tokio::test]
async fn test_archive_matches_directory() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(1, 10))
        .build(&BackupOptions::default())
        .await
        .unwrap();

    let opened = OpenedSnapshot::open(&outcome.archive).unwrap();
    assert!(opened.is_extracted());
    assert_eq!(file_set(opened.root()), file_set(&outcome.dir));
}

/// Test that optional categories follow the inclusion flags
#[tokio::test]
async fn test_inclusion_flags() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();

    let without = SnapshotBuilder::new(&handle)
        .at(at(1, 10))
        .build(&BackupOptions::default())
        .await
        .unwrap();
    assert!(!without.dir.join("logs").exists());
    assert_eq!(
        without.manifest.categories[&Category::Logs].status,
        CategoryStatus::Excluded
    );

    let with = SnapshotBuilder::new(&handle)
        .at(at(1, 11))
        .build(&BackupOptions {
            include_logs: true,
            ..BackupOptions::default()
        })
        .await
        .unwrap();
    assert!(with.dir.join("logs/logs/app.log").is_file());
    assert!(with.manifest.include_logs);
    assert_eq!(
        with.manifest.categories[&Category::Logs].status,
        CategoryStatus::Copied
    );
}

/// Test that the manifest is complete and the size is filled in
#[tokio::test]
async fn test_manifest_fields() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();
    let mock = mock();
    let rt = runtime(&mock);
    let outcome = SnapshotBuilder::new(&handle)
        .with_runtime(&rt)
        .at(at(2, 9))
        .build(&BackupOptions {
            label: Some("before upgrade".into()),
            ..BackupOptions::default()
        })
        .await
        .unwrap();

    let manifest = Manifest::read(&outcome.dir).unwrap();
    assert_eq!(manifest.created_at, at(2, 9));
    assert_eq!(manifest.kind, SnapshotKind::Operator);
    assert!(!manifest.operator.is_empty());
    assert!(!manifest.host.is_empty());
    assert!(manifest.size_bytes.unwrap() > 0);
    assert_eq!(manifest.categories[&Category::Webui].files, 3);
    assert!(manifest.checksums.contains_key("config/.env"));
    assert!(manifest.checksums.contains_key("config/requirements.txt"));
    assert!(outcome.name.ends_with("_20240602_090000"));
    assert!(outcome.dir.join("docker/inspect/app.json").is_file());
}

/// Test that an untracked deployment records the sentinel and an empty patch
#[tokio::test]
async fn test_untracked_deployment_records_sentinel() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(3, 9))
        .build(&BackupOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.manifest.git_revision, NO_REVISION);
    assert_eq!(fs::read(outcome.dir.join(PATCH_FILE)).unwrap().len(), 0);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("revision tracking unavailable")));
}

/// Test that a dirty git tree yields a revision, a patch and diff stats
#[tokio::test]
async fn test_git_tree_records_revision_and_patch() {
    if !git_available() {
        return;
    }
    let deployment = ScratchDeployment::new();
    let tree = GitTree::init(&deployment.root);
    deployment.write("agent.py", "import python.tools\nprint('patched')\n");
    assert!(tree.is_dirty());

    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(4, 9))
        .build(&BackupOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.manifest.git_revision, tree.head_sha());
    let patch = fs::read_to_string(outcome.dir.join(PATCH_FILE)).unwrap();
    assert!(patch.contains("+print('patched')"));
    assert_eq!(outcome.manifest.git_diff.files_changed, 1);
    assert_eq!(outcome.manifest.git_diff.insertions, 1);
}

/// Test that a name collision never overwrites an existing snapshot
#[tokio::test]
async fn test_collision_keeps_first_snapshot() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();
    let builder = SnapshotBuilder::new(&handle).at(at(5, 9));
    let first = builder.build(&BackupOptions::default()).await.unwrap();
    let before = file_set(&first.dir);

    let err = builder.build(&BackupOptions::default()).await.unwrap_err();
    assert!(matches!(err, SnapshotError::AlreadyExists(_)));
    assert_eq!(file_set(&first.dir), before);
    assert_eq!(list_snapshots(&deployment.backups()).unwrap().len(), 1);
}

/// Test that an unreadable category entry degrades to a warning
#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_entry_is_a_warning() {
    use std::os::unix::fs::PermissionsExt;

    let deployment = ScratchDeployment::new();
    let secret = deployment.root.join("memory/default/facts.json");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&secret).is_ok() {
        // running as root; permissions are not enforced
        return;
    }

    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(6, 9))
        .build(&BackupOptions::default())
        .await
        .unwrap();

    let memory = &outcome.manifest.categories[&Category::Memory];
    assert_eq!(memory.status, CategoryStatus::Failed);
    assert!(outcome.warnings.iter().any(|w| w.starts_with("memory")));
    assert_eq!(
        outcome.manifest.categories[&Category::Config].status,
        CategoryStatus::Partial
    );
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
}
