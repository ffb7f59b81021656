//! Materializes a deployment into a timestamped snapshot plus archive

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::deployment::DeploymentHandle;
use crate::git::capture_revision_state;
use crate::runtime::{ProcessDescriptors, RuntimeController};
use crate::util::fs::{copy_path, dir_size, human_size, is_disk_full, CopyStats};
use crate::util::names::{self, DEFAULT_LABEL, SAFETY_LABEL};
use crate::util::Progress;

use super::archive::{archive_path_for, create_archive, ArchiveError};
use super::manifest::{
    checksum_category, write_restore_instructions, CategoryRecord, CategoryStatus, Manifest,
    ManifestError, SnapshotKind, MANIFEST_SCHEMA_VERSION, PATCH_FILE,
};
use super::Category;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Deployment root is not readable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Snapshot already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Label '{0}' is reserved for pre-restore safety snapshots")]
    ReservedLabel(String),
    #[error("Out of disk space while writing {path}")]
    DiskFull { path: PathBuf },
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Failed to compress snapshot: {0}")]
    Archive(#[from] ArchiveError),
}

/// What to capture
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub label: Option<String>,
    pub include_logs: bool,
    pub include_models: bool,
    pub kind: SnapshotKind,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            label: None,
            include_logs: false,
            include_models: false,
            kind: SnapshotKind::Operator,
        }
    }
}

impl BackupOptions {
    /// Options for the automatic pre-restore snapshot
    pub fn safety(include_logs: bool, include_models: bool) -> Self {
        Self {
            label: Some(SAFETY_LABEL.to_string()),
            include_logs,
            include_models,
            kind: SnapshotKind::Safety,
        }
    }
}

/// A finished snapshot
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub name: String,
    pub dir: PathBuf,
    pub archive: PathBuf,
    pub manifest: Manifest,
    /// Degraded-but-continued conditions
    pub warnings: Vec<String>,
}

/// Removes a half-built snapshot unless disarmed
struct PartialSnapshot {
    dir: PathBuf,
    archive: PathBuf,
    armed: bool,
}

impl PartialSnapshot {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialSnapshot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(path = %self.dir.display(), "Removing incomplete snapshot");
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::error!(path = %self.dir.display(), error = %e, "Failed to remove incomplete snapshot");
        }
        if self.archive.exists() {
            let _ = fs::remove_file(&self.archive);
        }
    }
}

/// Builds snapshots of one deployment
pub struct SnapshotBuilder<'a> {
    deployment: &'a DeploymentHandle,
    runtime: Option<&'a RuntimeController>,
    progress: Progress,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(deployment: &'a DeploymentHandle) -> Self {
        Self {
            deployment,
            runtime: None,
            progress: Progress::quiet(),
            timestamp: None,
        }
    }

    /// Query this controller for runtime-process descriptors
    pub fn with_runtime(mut self, runtime: &'a RuntimeController) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Pin the creation time instead of using the clock
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub async fn build(&self, options: &BackupOptions) -> Result<SnapshotOutcome, SnapshotError> {
        let root = self.deployment.root();
        fs::read_dir(root).map_err(|source| SnapshotError::SourceUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let created_at = self.timestamp.unwrap_or_else(Utc::now);
        let timestamp = names::format_timestamp(created_at);
        let label = options
            .label
            .as_deref()
            .map(names::sanitize_label)
            .unwrap_or_else(|| timestamp.clone());
        let name_label = options
            .label
            .as_deref()
            .map(names::sanitize_label)
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());
        if options.kind == SnapshotKind::Operator
            && SnapshotKind::from_label(&name_label) == SnapshotKind::Safety
        {
            return Err(SnapshotError::ReservedLabel(name_label));
        }
        let name = names::snapshot_name(&name_label, created_at);

        let backups_root = self.deployment.backups_root();
        let dir = backups_root.join(&name);
        let archive = archive_path_for(&dir);

        self.progress.stage(&format!("Preparing snapshot {name}"));
        fs::create_dir_all(backups_root).map_err(|source| SnapshotError::Io {
            action: "create",
            path: backups_root.to_path_buf(),
            source,
        })?;
        if archive.exists() {
            return Err(SnapshotError::AlreadyExists(archive));
        }
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::AlreadyExists(dir));
            }
            Err(source) => {
                return Err(SnapshotError::Io {
                    action: "create",
                    path: dir,
                    source,
                })
            }
        }
        let guard = PartialSnapshot {
            dir: dir.clone(),
            archive: archive.clone(),
            armed: true,
        };
        self.progress.ok(format!("created {}", dir.display()));

        let mut warnings = Vec::new();

        self.progress.stage("Recording source-control state");
        let (revision, git_warnings) = capture_revision_state(root);
        for warning in git_warnings {
            self.progress.warn(&warning);
            warnings.push(warning);
        }
        write_file(&dir.join(PATCH_FILE), revision.patch.as_bytes())?;
        if revision.patch.is_empty() {
            self.progress.ok(format!("revision {}", revision.revision));
        } else {
            self.progress.ok(format!(
                "revision {} with uncommitted changes ({})",
                revision.revision,
                revision.stats.summary()
            ));
        }

        self.progress.stage("Copying categories");
        let mut categories = BTreeMap::new();
        for category in Category::ALL {
            if !category.is_expected(options.include_logs, options.include_models) {
                categories.insert(category, CategoryRecord::excluded());
                continue;
            }
            let record = self.copy_category(category, &dir, &mut warnings).await?;
            categories.insert(category, record);
        }

        let checksums = checksum_category(&dir, Category::Config).unwrap_or_else(|e| {
            let warning = format!("could not checksum configuration files: {e}");
            self.progress.warn(&warning);
            warnings.push(warning);
            BTreeMap::new()
        });

        self.progress.stage("Writing manifest");
        let mut manifest = Manifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            created_at,
            operator: names::operator_identity(),
            host: names::host_identity(),
            label,
            kind: options.kind,
            include_logs: options.include_logs,
            include_models: options.include_models,
            git_revision: revision.revision,
            git_diff: revision.stats,
            size_bytes: None,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            categories,
            checksums,
        };
        manifest.write(&dir)?;
        write_restore_instructions(&dir).map_err(|e| map_write_error(e, &dir))?;

        let size = dir_size(&dir).map_err(|source| SnapshotError::Io {
            action: "measure",
            path: dir.clone(),
            source,
        })?;
        manifest.size_bytes = Some(size);
        manifest.write(&dir)?;
        self.progress.ok(format!("manifest written, {}", human_size(size)));

        self.progress.stage("Compressing archive");
        if let Err(e) = create_archive(&dir, &archive) {
            if e.io_error().is_some_and(is_disk_full) {
                return Err(SnapshotError::DiskFull { path: archive });
            }
            return Err(e.into());
        }
        self.progress.ok(archive.display());

        guard.disarm();
        tracing::info!(
            name = %name,
            size,
            warnings = warnings.len(),
            "Snapshot complete"
        );

        Ok(SnapshotOutcome {
            name,
            dir,
            archive,
            manifest,
            warnings,
        })
    }

    /// Copy one category. Per-entry data failures degrade to warnings; running
    /// out of space aborts the whole snapshot.
    async fn copy_category(
        &self,
        category: Category,
        snapshot_dir: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<CategoryRecord, SnapshotError> {
        let category_dir = snapshot_dir.join(category.dir_name());
        fs::create_dir_all(&category_dir).map_err(|e| map_write_error(e, &category_dir))?;

        let mut record = CategoryRecord {
            status: CategoryStatus::Copied,
            files: 0,
            bytes: 0,
            missing: Vec::new(),
            errors: Vec::new(),
        };

        if category == Category::Docker {
            self.capture_descriptors(&category_dir, warnings).await?;
        }

        let mut total = CopyStats::default();
        let mut present = 0usize;
        for entry in self.deployment.category_paths(category) {
            let src = self.deployment.live_path(entry);
            if fs::symlink_metadata(&src).is_err() {
                record.missing.push(entry.display().to_string());
                continue;
            }
            present += 1;
            match copy_path(&src, &category_dir.join(entry)) {
                Ok(stats) => {
                    total.files += stats.files;
                    total.bytes += stats.bytes;
                }
                Err(e) if is_disk_full(&e) => {
                    return Err(SnapshotError::DiskFull { path: category_dir });
                }
                Err(e) => {
                    let warning = format!("{category}: failed to copy {}: {e}", entry.display());
                    self.progress.warn(&warning);
                    warnings.push(warning);
                    record.errors.push(format!("{}: {e}", entry.display()));
                }
            }
        }

        record.files = total.files;
        record.bytes = total.bytes;
        record.status = if present == 0 && category != Category::Docker {
            CategoryStatus::Absent
        } else if !record.errors.is_empty() && record.errors.len() == present {
            CategoryStatus::Failed
        } else if !record.errors.is_empty() || !record.missing.is_empty() {
            CategoryStatus::Partial
        } else {
            CategoryStatus::Copied
        };

        match record.status {
            CategoryStatus::Absent => self
                .progress
                .info(format!("{category}: not present, skipped")),
            CategoryStatus::Failed => self.progress.warn(format!("{category}: copy failed")),
            _ => self.progress.ok(format!(
                "{category}: {} files, {}",
                record.files,
                human_size(record.bytes)
            )),
        }
        Ok(record)
    }

    /// Write process listing, image identifiers and inspect dumps
    async fn capture_descriptors(
        &self,
        docker_dir: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<(), SnapshotError> {
        // Nothing here may block on process state; every query is time-boxed.
        let descriptors = match self.runtime {
            Some(runtime) => runtime.describe().await,
            None => ProcessDescriptors {
                engine: "none".into(),
                errors: vec!["no process manager available".into()],
                ..ProcessDescriptors::default()
            },
        };
        self.write_descriptors(docker_dir, &descriptors, warnings)
    }

    fn write_descriptors(
        &self,
        docker_dir: &Path,
        descriptors: &ProcessDescriptors,
        warnings: &mut Vec<String>,
    ) -> Result<(), SnapshotError> {
        let mut encoding_errors = Vec::new();

        match encode_descriptor(&descriptors.listing) {
            Ok(listing) => write_file(&docker_dir.join("processes.json"), &listing)?,
            Err(e) => encoding_errors.push(format!("process listing: {e}")),
        }

        let images: String = descriptors
            .images
            .iter()
            .map(|(name, image)| format!("{name}\t{image}\n"))
            .collect();
        write_file(&docker_dir.join("images.txt"), images.as_bytes())?;

        let inspect_dir = docker_dir.join("inspect");
        fs::create_dir_all(&inspect_dir).map_err(|e| map_write_error(e, &inspect_dir))?;
        for (name, dump) in &descriptors.inspections {
            match encode_descriptor(dump) {
                Ok(json) => write_file(&inspect_dir.join(format!("{name}.json")), &json)?,
                Err(e) => encoding_errors.push(format!("inspect {name}: {e}")),
            }
        }

        for error in descriptors.errors.iter().chain(&encoding_errors) {
            let warning = format!("runtime descriptors: {error}");
            self.progress.warn(&warning);
            warnings.push(warning);
        }
        Ok(())
    }
}

/// A descriptor that can't be encoded is skipped, never written empty
fn encode_descriptor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(value)
}

fn map_write_error(e: io::Error, path: &Path) -> SnapshotError {
    if is_disk_full(&e) {
        SnapshotError::DiskFull {
            path: path.to_path_buf(),
        }
    } else {
        SnapshotError::Io {
            action: "write",
            path: path.to_path_buf(),
            source: e,
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), SnapshotError> {
    fs::write(path, contents).map_err(|e| map_write_error(e, path))
}
