//! Snapshots: the ordered category set, manifests, building, archives and
//! listing.
//!
//! A snapshot is `backups/<label>_<timestamp>/` plus a sibling
//! `backups/<label>_<timestamp>.zip`. It is never modified after the builder
//! returns.

mod archive;
mod builder;
mod category;
mod list;
mod manifest;

pub use archive::{
    archive_path_for, create_archive, extract_archive, is_archive_path, ArchiveError,
    OpenedSnapshot, ARCHIVE_SUFFIX,
};
pub use builder::{BackupOptions, SnapshotBuilder, SnapshotError, SnapshotOutcome};
pub use category::Category;
pub use list::{list_snapshots, SnapshotSummary};
pub use manifest::{
    checksum_category, sha256_file, CategoryRecord, CategoryStatus, Manifest, ManifestError,
    SnapshotKind, MANIFEST_FILE, MANIFEST_SCHEMA_VERSION, PATCH_FILE, RESTORE_INSTRUCTIONS_FILE,
};
