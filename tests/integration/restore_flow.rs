//! Integration tests for the restore pipeline

use super::common::deployment::{at, file_set, mock, runtime, ScratchDeployment, AUXILIARY, PRIMARY};
use super::common::git_fixtures::{git_available, GitTree};
use snapguard::snapshot::{list_snapshots, SnapshotKind, PATCH_FILE};
use snapguard::{
    BackupOptions, Category, RestoreOptions, RestoreState, Restorer, SnapshotBuilder, Verdict,
    Verifier,
};
use std::fs;
use std::path::{Path, PathBuf};

async fn backup(deployment: &ScratchDeployment) -> PathBuf {
    let handle = deployment.handle();
    SnapshotBuilder::new(&handle)
        .at(at(1, 10))
        .build(&BackupOptions::default())
        .await
        .unwrap()
        .dir
}

/// Diverge the live tree from the snapshot
fn mutate(deployment: &ScratchDeployment) {
    deployment.write(".env", "SETTING_0=changed\n");
    deployment.write("python/tools/new.py", "def extra():\n    pass\n");
    deployment.write("memory/default/facts.json", "[\"sky is green\"]\n");
    fs::remove_file(deployment.root.join("webui/css/site.css")).unwrap();
}

fn skip_services(backup: &Path) -> RestoreOptions {
    RestoreOptions {
        skip_services: true,
        ..RestoreOptions::new(backup)
    }
}

/// Test that restored categories match the snapshot file for file
#[tokio::test]
async fn test_round_trip_matches_snapshot() {
    let deployment = ScratchDeployment::new();
    let original_env = deployment.read(".env");
    let snapshot = backup(&deployment).await;
    mutate(&deployment);

    let handle = deployment.handle();
    let mock = mock();
    let rt = runtime(&mock);
    let report = Restorer::new(&handle)
        .with_runtime(&rt)
        .at(at(1, 12))
        .run(&RestoreOptions::new(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done(), "{report:#?}");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(deployment.read(".env"), original_env);
    assert_eq!(
        file_set(&deployment.root.join("python")),
        file_set(&snapshot.join("code/python"))
    );
    assert_eq!(
        file_set(&deployment.root.join("webui")),
        file_set(&snapshot.join("webui/webui"))
    );
    assert_eq!(deployment.read("memory/default/facts.json"), "[\"sky is blue\"]\n");

    // logs were neither captured nor requested
    assert_eq!(deployment.read("logs/app.log"), "started\n");
    assert!(!deployment.exists("logs.pre-restore-20240601_120000"));
}

/// Test that a full run visits the states in order
#[tokio::test]
async fn test_transitions_in_order() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;

    let handle = deployment.handle();
    let mock = mock();
    let rt = runtime(&mock);
    let report = Restorer::new(&handle)
        .with_runtime(&rt)
        .at(at(1, 12))
        .run(&RestoreOptions::new(&snapshot))
        .await
        .unwrap();

    assert_eq!(
        report.transitions,
        vec![
            RestoreState::Start,
            RestoreState::SafetySnapshot,
            RestoreState::ServicesStopped,
            RestoreState::CategoryRestored(Category::Config),
            RestoreState::CategoryRestored(Category::Code),
            RestoreState::CategoryRestored(Category::Webui),
            RestoreState::CategoryRestored(Category::Memory),
            RestoreState::CategoryRestored(Category::Scripts),
            RestoreState::ServicesStarted,
            RestoreState::Verified,
            RestoreState::Done,
        ]
    );
    assert!(mock.is_running_now(PRIMARY));
    assert!(mock.is_running_now(AUXILIARY));
}

/// Test that the safety snapshot captures the pre-restore live state
#[tokio::test]
async fn test_safety_snapshot_holds_pre_restore_state() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;
    mutate(&deployment);

    let handle = deployment.handle();
    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();
    assert!(report.is_done());

    let safety = report.safety_snapshot.clone().unwrap();
    assert!(safety.starts_with(deployment.backups()));
    assert_eq!(
        fs::read_to_string(safety.join("config/.env")).unwrap(),
        "SETTING_0=changed\n"
    );

    let kinds: Vec<SnapshotKind> = list_snapshots(&deployment.backups())
        .unwrap()
        .into_iter()
        .map(|s| s.kind)
        .collect();
    assert_eq!(kinds, vec![SnapshotKind::Safety, SnapshotKind::Operator]);

    // the safety snapshot is itself a usable rollback point
    let verdict = Verifier::default().verify(&safety, false).unwrap().verdict();
    assert_ne!(verdict, Verdict::CriticalIssues);
}

/// Test that rolling back to the safety snapshot undoes the restore
#[tokio::test]
async fn test_rollback_through_safety_snapshot() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;
    mutate(&deployment);

    let handle = deployment.handle();
    let first = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();
    let safety = first.safety_snapshot.unwrap();

    let second = Restorer::new(&handle)
        .at(at(1, 13))
        .run(&skip_services(&safety))
        .await
        .unwrap();
    assert!(second.is_done());
    assert_eq!(deployment.read(".env"), "SETTING_0=changed\n");
    assert!(deployment.exists("python/tools/new.py"));

    // leftovers from the first restore are reported once and not reused
    let stale: Vec<&String> = second
        .warnings
        .iter()
        .filter(|w| w.contains("earlier restore"))
        .collect();
    assert_eq!(stale.len(), 1);
    assert!(deployment.exists(".env.pre-restore-20240601_120000"));
    assert!(deployment.exists(".env.pre-restore-20240601_130000"));
}

/// Test that an archive-only snapshot restores like a directory
#[tokio::test]
async fn test_restore_from_archive() {
    let deployment = ScratchDeployment::new();
    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(1, 10))
        .build(&BackupOptions::default())
        .await
        .unwrap();
    fs::remove_dir_all(&outcome.dir).unwrap();
    mutate(&deployment);

    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&outcome.archive))
        .await
        .unwrap();
    assert!(report.is_done(), "{report:#?}");
    assert_eq!(report.snapshot, outcome.name);
    assert!(deployment.exists("webui/css/site.css"));
}

/// Test that skipping services never calls the process manager's lifecycle
#[tokio::test]
async fn test_skip_services_with_runtime_available() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;

    let handle = deployment.handle();
    let mock = mock();
    let rt = runtime(&mock);
    let report = Restorer::new(&handle)
        .with_runtime(&rt)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();

    assert_eq!(report.final_state(), RestoreState::Done);
    assert!(mock.lifecycle_calls().is_empty());
    assert!(!report.reached(RestoreState::ServicesStopped));
    assert!(!report.reached(RestoreState::ServicesStarted));
    assert!(report.liveness.is_none());
}

/// Test that a snapshot missing a category restores the rest and warns once
#[tokio::test]
async fn test_partial_snapshot_leaves_category_untouched() {
    let deployment = ScratchDeployment::new();
    let original_env = deployment.read(".env");
    let snapshot = backup(&deployment).await;
    fs::remove_dir_all(snapshot.join("memory")).unwrap();
    mutate(&deployment);

    let handle = deployment.handle();
    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done());
    assert_eq!(report.untouched, vec![Category::Memory]);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].starts_with("memory"));
    assert_eq!(deployment.read("memory/default/facts.json"), "[\"sky is green\"]\n");
    assert_eq!(deployment.read(".env"), original_env);
}

/// Test that a patch that cannot be applied is a warning, not a failure
#[tokio::test]
async fn test_corrupt_patch_is_one_warning() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;
    fs::write(snapshot.join(PATCH_FILE), "this is not a patch\n").unwrap();

    let handle = deployment.handle();
    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done());
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].starts_with("patch:"));
    assert!(!report.reached(RestoreState::PatchesApplied));
}

/// Test that a process that fails to start is reported and the run completes
#[tokio::test]
async fn test_failed_start_is_a_warning() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;

    let handle = deployment.handle();
    let mock = mock().failing_start(AUXILIARY);
    let rt = runtime(&mock);
    let report = Restorer::new(&handle)
        .with_runtime(&rt)
        .at(at(1, 12))
        .run(&RestoreOptions::new(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done());
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains(AUXILIARY));
    assert!(mock.is_running_now(PRIMARY));
}

/// Test that a failed stop leaves live state alone and restarts services
#[tokio::test]
async fn test_failed_stop_changes_nothing_live() {
    let deployment = ScratchDeployment::new();
    let snapshot = backup(&deployment).await;
    mutate(&deployment);
    let before = file_set(&deployment.root.join("python"));

    let handle = deployment.handle();
    let mock = mock().failing_stop(PRIMARY);
    let rt = runtime(&mock);
    let report = Restorer::new(&handle)
        .with_runtime(&rt)
        .at(at(1, 12))
        .run(&RestoreOptions::new(&snapshot))
        .await
        .unwrap();

    assert_eq!(report.final_state(), RestoreState::Failed);
    assert!(report.failure.as_deref().unwrap().contains("stop"));
    assert!(!report.transitions.iter().any(|s| s.touches_live_state()));
    assert!(report.safety_snapshot.as_ref().unwrap().is_dir());
    assert_eq!(deployment.read(".env"), "SETTING_0=changed\n");
    assert_eq!(file_set(&deployment.root.join("python")), before);
    assert!(mock.is_running_now(PRIMARY));
    assert!(mock.is_running_now(AUXILIARY));
}

/// Test that uncommitted changes captured at backup time survive a round trip
#[tokio::test]
async fn test_dirty_tree_round_trip() {
    if !git_available() {
        return;
    }
    let deployment = ScratchDeployment::new();
    let _tree = GitTree::init(&deployment.root);
    deployment.write("agent.py", "import python.tools\nprint('work in progress')\n");
    let snapshot = backup(&deployment).await;
    assert!(fs::metadata(snapshot.join(PATCH_FILE)).unwrap().len() > 0);

    deployment.write("agent.py", "import python.tools\nprint('later edit')\n");

    let handle = deployment.handle();
    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done(), "{report:#?}");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(report.reached(RestoreState::PatchesApplied));
    assert_eq!(
        deployment.read("agent.py"),
        "import python.tools\nprint('work in progress')\n"
    );
}

/// Test that an entry absent at backup time is moved aside rather than kept
#[tokio::test]
async fn test_entry_absent_at_backup_is_moved_aside() {
    let deployment = ScratchDeployment::new();
    assert!(!deployment.exists("models.py"));
    let snapshot = backup(&deployment).await;
    deployment.write("models.py", "class Model:\n    pass\n");

    let handle = deployment.handle();
    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&snapshot))
        .await
        .unwrap();

    assert!(report.is_done(), "{report:#?}");
    assert!(!deployment.exists("models.py"));
    let aside = deployment.root.join("models.py.pre-restore-20240601_120000");
    assert_eq!(fs::read_to_string(&aside).unwrap(), "class Model:\n    pass\n");
    assert!(report.moved_aside.contains(&aside), "{:?}", report.moved_aside);
}

/// Test that symlinks inside a category survive a restore from the archive alone
#[cfg(unix)]
#[tokio::test]
async fn test_symlink_survives_archive_restore() {
    let deployment = ScratchDeployment::new();
    deployment.write("python/tools/search.py", "def search():\n    pass\n");
    std::os::unix::fs::symlink("search.py", deployment.root.join("python/tools/alias.py")).unwrap();

    let handle = deployment.handle();
    let outcome = SnapshotBuilder::new(&handle)
        .at(at(1, 10))
        .build(&BackupOptions::default())
        .await
        .unwrap();
    fs::remove_dir_all(&outcome.dir).unwrap();
    fs::remove_dir_all(deployment.root.join("python")).unwrap();

    let report = Restorer::new(&handle)
        .at(at(1, 12))
        .run(&skip_services(&outcome.archive))
        .await
        .unwrap();

    assert!(report.is_done(), "{report:#?}");
    let alias = deployment.root.join("python/tools/alias.py");
    assert_eq!(fs::read_link(&alias).unwrap(), Path::new("search.py"));
    assert_eq!(fs::read_to_string(&alias).unwrap(), "def search():\n    pass\n");
}
