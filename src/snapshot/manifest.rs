//! Snapshot manifest and the static restore procedure stored next to it

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::git::GitDiffStats;
use crate::util::names::SAFETY_LABEL;

use super::Category;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const RESTORE_INSTRUCTIONS_FILE: &str = "RESTORE_INSTRUCTIONS.md";
pub const PATCH_FILE: &str = "git_uncommitted_changes.patch";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    Missing(PathBuf),
    #[error("Malformed manifest {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Who initiated the snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Requested by an operator
    Operator,
    /// Taken automatically at the start of a restore
    Safety,
}

impl SnapshotKind {
    /// Infer from a snapshot label
    pub fn from_label(label: &str) -> Self {
        if label == SAFETY_LABEL {
            SnapshotKind::Safety
        } else {
            SnapshotKind::Operator
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Operator => "operator",
            SnapshotKind::Safety => "safety",
        }
    }
}

/// What happened to one category during the backup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// Every configured source was copied
    Copied,
    /// Some sources were missing or failed
    Partial,
    /// No configured source existed
    Absent,
    /// Every present source failed to copy
    Failed,
    /// Not requested (logs/models without their flag)
    Excluded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRecord {
    pub status: CategoryStatus,
    pub files: u64,
    pub bytes: u64,
    /// Configured sources that did not exist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    /// Sources that failed to copy, with the error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CategoryRecord {
    pub fn excluded() -> Self {
        Self {
            status: CategoryStatus::Excluded,
            files: 0,
            bytes: 0,
            missing: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Structured metadata stored with every snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub operator: String,
    pub host: String,
    pub label: String,
    pub kind: SnapshotKind,
    pub include_logs: bool,
    pub include_models: bool,
    /// HEAD hash or `no-revision`
    pub git_revision: String,
    #[serde(default)]
    pub git_diff: GitDiffStats,
    /// Filled in once the snapshot directory is complete
    pub size_bytes: Option<u64>,
    pub tool_version: String,
    #[serde(default)]
    pub categories: BTreeMap<Category, CategoryRecord>,
    /// Snapshot-relative path -> SHA-256 (configuration files)
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Manifest {
    /// Categories a snapshot with these flags must contain
    pub fn expected_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| c.is_expected(self.include_logs, self.include_models))
            .collect()
    }

    pub fn write(&self, snapshot_dir: &Path) -> Result<(), ManifestError> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(|source| ManifestError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ManifestError::Io { path, source })
    }

    pub fn read(snapshot_dir: &Path) -> Result<Self, ManifestError> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing(path))
            }
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| ManifestError::Malformed { path, source })
    }
}

/// SHA-256 of every file under `snapshot_dir/<category>`, keyed by
/// snapshot-relative path with `/` separators.
pub fn checksum_category(
    snapshot_dir: &Path,
    category: Category,
) -> io::Result<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();
    let root = snapshot_dir.join(category.dir_name());
    if !root.is_dir() {
        return Ok(checksums);
    }
    for entry in WalkDir::new(&root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(snapshot_dir)
            .map_err(|e| io::Error::other(e.to_string()))?;
        checksums.insert(relative_key(rel), sha256_file(entry.path())?);
    }
    Ok(checksums)
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn write_restore_instructions(snapshot_dir: &Path) -> io::Result<()> {
    fs::write(snapshot_dir.join(RESTORE_INSTRUCTIONS_FILE), RESTORE_INSTRUCTIONS)
}

const RESTORE_INSTRUCTIONS: &str = "\
# Restore Instructions

This directory is a point-in-time snapshot of a deployment. `manifest.json`
records when and where it was taken, the source-control revision, and what
each category contains.

## 1. Verify the snapshot

    snapguard verify --backup <this directory or its .zip archive> --detailed

A `critical-issues` verdict means required artifacts are missing; do not
restore from it unless you know which parts you need.

## 2. Restore

    snapguard restore --backup <this directory or its .zip archive>

The restore will:

1. Take a safety snapshot of the current state (`pre_restore_safety_<timestamp>`).
2. Stop the managed processes (skip with `--skip-services`).
3. Move each live category aside (`<path>.pre-restore-<timestamp>`) and copy
   the snapshot's version into place: config, code, webui, memory, scripts,
   then logs and models when `--restore-logs` / `--restore-models` are given.
4. Re-apply `git_uncommitted_changes.patch` if it is not empty.
5. Start the managed processes and wait for the application to answer.

## 3. Roll back

If the result is not what you wanted, restore again from the safety
snapshot printed at the start of the run. Neither this snapshot nor the
safety snapshot is ever deleted automatically.

## Manual restore

Each `<category>/<path>` in this snapshot corresponds to `<deployment root>/<path>`.
Copy the entries back by hand, then apply the patch with

    git apply git_uncommitted_changes.patch
";
