//! Enumerating snapshots under a backups root

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::util::names::parse_snapshot_name;

use super::archive::ARCHIVE_SUFFIX;
use super::manifest::{Manifest, SnapshotKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub name: String,
    pub kind: SnapshotKind,
    pub created_at: DateTime<Utc>,
    pub dir: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    /// From the manifest, when the directory is present and readable
    pub size_bytes: Option<u64>,
}

/// List snapshots (directories and/or archives) under `backups_root`,
/// newest first. A missing root is an empty list.
pub fn list_snapshots(backups_root: &Path) -> io::Result<Vec<SnapshotSummary>> {
    let entries = match fs::read_dir(backups_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut by_name: BTreeMap<String, SnapshotSummary> = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type()?.is_dir();

        let name = if is_dir {
            file_name
        } else if let Some(stem) = file_name.strip_suffix(ARCHIVE_SUFFIX) {
            stem.to_string()
        } else {
            continue;
        };

        let Some((label, created_at)) = parse_snapshot_name(&name) else {
            continue;
        };

        let summary = by_name.entry(name.clone()).or_insert_with(|| SnapshotSummary {
            name,
            kind: SnapshotKind::from_label(&label),
            created_at,
            dir: None,
            archive: None,
            size_bytes: None,
        });
        if is_dir {
            // The manifest is authoritative; the label only covers archive-only snapshots
            if let Ok(manifest) = Manifest::read(&path) {
                summary.kind = manifest.kind;
                summary.size_bytes = manifest.size_bytes;
            }
            summary.dir = Some(path);
        } else {
            summary.archive = Some(path);
        }
    }

    let mut list: Vec<_> = by_name.into_values().collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
    Ok(list)
}
