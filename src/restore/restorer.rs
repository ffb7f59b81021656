use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::deployment::DeploymentHandle;
use crate::git::{apply_patch, patch_already_applied};
use crate::runtime::RuntimeController;
use crate::snapshot::{
    ArchiveError, BackupOptions, Category, Manifest, OpenedSnapshot, SnapshotBuilder,
    SnapshotError, PATCH_FILE,
};
use crate::util::fs::{copy_path, unique_sibling};
use crate::util::names::format_timestamp;
use crate::util::Progress;

use super::state::{RestoreReport, RestoreState};

/// Inserted between a live path and the timestamp when it is moved aside
pub const MOVED_ASIDE_MARKER: &str = ".pre-restore-";

/// Aborts that happen before any live file is touched
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Cannot open snapshot: {0}")]
    Open(#[from] ArchiveError),
    #[error("Safety snapshot could not be created, nothing was changed: {0}")]
    SafetySnapshot(#[source] SnapshotError),
    #[error("Restore cancelled before any files were changed")]
    Cancelled { safety_snapshot: Option<PathBuf> },
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Snapshot directory or archive
    pub backup: PathBuf,
    /// Leave the runtime processes alone
    pub skip_services: bool,
    pub restore_logs: bool,
    pub restore_models: bool,
}

impl RestoreOptions {
    pub fn new(backup: impl Into<PathBuf>) -> Self {
        Self {
            backup: backup.into(),
            ..Self::default()
        }
    }

    fn wants(&self, category: Category) -> bool {
        match category {
            Category::Logs => self.restore_logs,
            Category::Models => self.restore_models,
            Category::Docker => false,
            _ => true,
        }
    }
}

/// A mid-pipeline failure: the run ends in `failed`
struct Failure {
    message: String,
}

impl Failure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Drives one restore through the state machine
pub struct Restorer<'a> {
    deployment: &'a DeploymentHandle,
    runtime: Option<&'a RuntimeController>,
    progress: Progress,
    cancel: CancellationToken,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> Restorer<'a> {
    pub fn new(deployment: &'a DeploymentHandle) -> Self {
        Self {
            deployment,
            runtime: None,
            progress: Progress::quiet(),
            cancel: CancellationToken::new(),
            timestamp: None,
        }
    }

    pub fn with_runtime(mut self, runtime: &'a RuntimeController) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Checked between states until the first live path is moved aside
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pin the clock (safety snapshot name and moved-aside suffix)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Run the pipeline.
    ///
    /// Returns `Err` only when nothing live was changed. A run that fails
    /// after the safety snapshot returns a report whose final state is
    /// [`RestoreState::Failed`].
    pub async fn run(&self, options: &RestoreOptions) -> Result<RestoreReport, RestoreError> {
        let opened = OpenedSnapshot::open(&options.backup)?;
        let now = self.timestamp.unwrap_or_else(Utc::now);
        let mut report = RestoreReport::new(opened.name());
        tracing::info!(
            snapshot = %options.backup.display(),
            skip_services = options.skip_services,
            restore_logs = options.restore_logs,
            restore_models = options.restore_models,
            "Restore started"
        );

        if self.cancel.is_cancelled() {
            return Err(RestoreError::Cancelled {
                safety_snapshot: None,
            });
        }

        self.progress.stage("Creating safety snapshot");
        let safety = self.safety_snapshot(options, now).await?;
        report.safety_snapshot = Some(safety.clone());
        report.enter(RestoreState::SafetySnapshot);
        self.progress.ok(format!("rollback point {}", safety.display()));

        if self.cancel.is_cancelled() {
            return Err(RestoreError::Cancelled {
                safety_snapshot: Some(safety),
            });
        }

        let services_stopped = match self.stop_services(options, &mut report).await {
            Ok(stopped) => stopped,
            Err(failure) => return Ok(self.fail(report, failure)),
        };

        if self.cancel.is_cancelled() {
            if services_stopped {
                self.progress.stage("Cancelled, restarting services");
                self.start_services(&mut report).await;
            }
            return Err(RestoreError::Cancelled {
                safety_snapshot: Some(safety),
            });
        }

        if let Err(failure) = self.restore_categories(&opened, options, now, &mut report) {
            return Ok(self.fail(report, failure));
        }

        self.apply_patch(&opened, &mut report);

        if services_stopped {
            self.start_services(&mut report).await;
        }

        report.enter(RestoreState::Done);
        self.progress
            .summary("Restore", report.outcome(), &report.warnings);
        Ok(report)
    }

    async fn safety_snapshot(
        &self,
        options: &RestoreOptions,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, RestoreError> {
        let mut builder = SnapshotBuilder::new(self.deployment)
            .with_progress(Progress::quiet())
            .at(now);
        if let Some(runtime) = self.runtime {
            builder = builder.with_runtime(runtime);
        }
        let outcome = builder
            .build(&BackupOptions::safety(
                options.restore_logs,
                options.restore_models,
            ))
            .await
            .map_err(|e| {
                self.progress.fail(format!("safety snapshot failed: {e}"));
                RestoreError::SafetySnapshot(e)
            })?;
        for warning in &outcome.warnings {
            tracing::warn!(snapshot = %outcome.name, "Safety snapshot: {warning}");
        }
        Ok(outcome.dir)
    }

    /// Returns whether services were actually stopped
    async fn stop_services(
        &self,
        options: &RestoreOptions,
        report: &mut RestoreReport,
    ) -> Result<bool, Failure> {
        if options.skip_services {
            self.progress
                .info("skipping service shutdown; processes keep running during the restore");
            return Ok(false);
        }
        let Some(runtime) = self.runtime else {
            return Err(Failure::new(
                "no process manager available to stop services; re-run with --skip-services to restore anyway",
            ));
        };

        self.progress.stage("Stopping services");
        match runtime.stop_all().await {
            Ok(()) => {
                self.progress
                    .ok(format!("stopped {}", runtime.processes()));
                report.enter(RestoreState::ServicesStopped);
                Ok(true)
            }
            Err(e) => {
                // Nothing has been overwritten yet; bring back whatever did stop.
                for (name, err) in runtime.start_all().await {
                    tracing::warn!(name = %name, error = %err, "Restart after failed stop");
                }
                Err(Failure::new(format!("failed to stop services: {e}")))
            }
        }
    }

    fn restore_categories(
        &self,
        opened: &OpenedSnapshot,
        options: &RestoreOptions,
        now: DateTime<Utc>,
        report: &mut RestoreReport,
    ) -> Result<(), Failure> {
        self.progress.stage("Restoring categories");

        let stale = stale_moved_aside(self.deployment);
        if !stale.is_empty() {
            let listed: Vec<String> = stale.iter().map(|p| p.display().to_string()).collect();
            self.warn(
                report,
                format!(
                    "moved-aside copies from an earlier restore are still present and were left alone: {}",
                    listed.join(", ")
                ),
            );
        }

        let suffix = format!("{MOVED_ASIDE_MARKER}{}", format_timestamp(now));
        // Without a readable manifest an absent entry is treated as unknown and left alone
        let manifest = Manifest::read(opened.root()).ok();
        for category in Category::RESTORABLE {
            if !options.wants(category) {
                tracing::debug!(category = %category, "Category not requested");
                continue;
            }

            let source_dir = opened.root().join(category.dir_name());
            if !source_dir.is_dir() {
                self.warn(
                    report,
                    format!("{category}: not in snapshot, live copy left untouched"),
                );
                report.untouched.push(category);
                report.enter(RestoreState::CategoryRestored(category));
                continue;
            }

            let absent_at_backup: BTreeSet<&str> = manifest
                .as_ref()
                .and_then(|m| m.categories.get(&category))
                .map(|record| record.missing.iter().map(String::as_str).collect())
                .unwrap_or_default();

            let mut restored = 0usize;
            let mut removed = 0usize;
            for entry in self.deployment.category_paths(category) {
                let source = source_dir.join(entry);
                let live = self.deployment.live_path(entry);
                if fs::symlink_metadata(&source).is_err() {
                    if !absent_at_backup.contains(entry.display().to_string().as_str()) {
                        continue;
                    }
                    // Did not exist when the snapshot was taken
                    if let Some(aside) = move_aside(&live, &suffix).map_err(|e| {
                        Failure::new(format!(
                            "{category}: could not move {} aside: {e}",
                            live.display()
                        ))
                    })? {
                        tracing::info!(entry = %entry.display(), "Moved aside entry absent from snapshot");
                        report.moved_aside.push(aside);
                        removed += 1;
                    }
                    continue;
                }
                if let Some(aside) = move_aside(&live, &suffix).map_err(|e| {
                    Failure::new(format!(
                        "{category}: could not move {} aside: {e}",
                        live.display()
                    ))
                })? {
                    report.moved_aside.push(aside);
                }
                copy_path(&source, &live).map_err(|e| {
                    Failure::new(format!(
                        "{category}: could not copy {} into place: {e}",
                        entry.display()
                    ))
                })?;
                restored += 1;
            }

            if restored == 0 && removed == 0 {
                self.progress
                    .info(format!("{category}: snapshot copy is empty, nothing to restore"));
            } else if removed == 0 {
                self.progress
                    .ok(format!("{category}: {restored} entries restored"));
            } else {
                self.progress.ok(format!(
                    "{category}: {restored} entries restored, {removed} absent from snapshot moved aside"
                ));
            }
            report.enter(RestoreState::CategoryRestored(category));
        }
        Ok(())
    }

    fn apply_patch(&self, opened: &OpenedSnapshot, report: &mut RestoreReport) {
        let patch = opened.root().join(PATCH_FILE);
        let has_patch = fs::metadata(&patch).map(|m| m.len() > 0).unwrap_or(false);
        if !has_patch {
            return;
        }

        self.progress.stage("Applying uncommitted changes");
        let root = self.deployment.root();
        if patch_already_applied(root, &patch) {
            self.progress
                .info("uncommitted changes are already present in the restored files");
            report.enter(RestoreState::PatchesApplied);
            return;
        }
        match apply_patch(root, &patch) {
            Ok(()) => {
                self.progress.ok("patch applied");
                report.enter(RestoreState::PatchesApplied);
            }
            Err(e) => self.warn(
                report,
                format!("patch: uncommitted changes could not be re-applied: {e}"),
            ),
        }
    }

    async fn start_services(&self, report: &mut RestoreReport) {
        let Some(runtime) = self.runtime else {
            return;
        };

        self.progress.stage("Starting services");
        let failures = runtime.start_all().await;
        for (name, e) in &failures {
            self.warn(report, format!("services: {name} failed to start: {e}"));
        }
        if failures.is_empty() {
            self.progress.ok(format!("started {}", runtime.processes()));
        }
        report.enter(RestoreState::ServicesStarted);

        self.progress
            .stage(&format!("Waiting for {}", runtime.liveness_url()));
        let liveness = runtime.wait_for_liveness().await;
        if liveness.reachable {
            self.progress
                .ok(format!("reachable after {} attempts", liveness.attempts));
        } else {
            self.warn(
                report,
                format!(
                    "liveness: {} did not answer after {} attempts; check the application logs",
                    runtime.liveness_url(),
                    liveness.attempts
                ),
            );
        }
        report.liveness = Some(liveness);
        report.enter(RestoreState::Verified);
    }

    fn warn(&self, report: &mut RestoreReport, message: String) {
        self.progress.warn(&message);
        report.warnings.push(message);
    }

    fn fail(&self, mut report: RestoreReport, failure: Failure) -> RestoreReport {
        self.progress.fail(&failure.message);
        report.enter(RestoreState::Failed);
        report.failure = Some(failure.message);
        if let Some(safety) = &report.safety_snapshot {
            self.progress.info(format!(
                "roll back with: snapguard restore --backup {}",
                safety.display()
            ));
        }
        self.progress
            .summary("Restore", report.outcome(), &report.warnings);
        report
    }
}

/// Rename `live` to a fresh sibling. Returns None when there was nothing to move.
fn move_aside(live: &Path, suffix: &str) -> io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(live) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }
    let aside = unique_sibling(live, suffix);
    fs::rename(live, &aside)?;
    tracing::info!(from = %live.display(), to = %aside.display(), "Moved aside");
    Ok(Some(aside))
}

/// Moved-aside leftovers next to any restorable category entry
fn stale_moved_aside(deployment: &DeploymentHandle) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for category in Category::RESTORABLE {
        for entry in deployment.category_paths(category) {
            let live = deployment.live_path(entry);
            let (Some(parent), Some(name)) = (live.parent(), live.file_name()) else {
                continue;
            };
            let prefix = format!("{}{MOVED_ASIDE_MARKER}", name.to_string_lossy());
            let Ok(siblings) = fs::read_dir(parent) else {
                continue;
            };
            for sibling in siblings.filter_map(Result::ok) {
                if sibling.file_name().to_string_lossy().starts_with(&prefix) {
                    found.insert(sibling.path());
                }
            }
        }
    }
    found.into_iter().collect()
}
