//! Compressed snapshot archives and transparent opening of either form

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::FileOptions;

use super::manifest::MANIFEST_FILE;

/// Appended to the snapshot directory name to form the archive name
pub const ARCHIVE_SUFFIX: &str = ".zip";

#[cfg(unix)]
const S_IFMT: u32 = 0o170000;
#[cfg(unix)]
const S_IFLNK: u32 = 0o120000;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Snapshot not found: {0}")]
    NotFound(PathBuf),
    #[error("Not a snapshot directory or .zip archive: {0}")]
    NotASnapshot(PathBuf),
    #[error("Archive entry escapes the extraction directory: {0}")]
    UnsafeEntry(String),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    /// The underlying IO error, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            ArchiveError::Io(e) => Some(e),
            ArchiveError::Zip(zip::result::ZipError::Io(e)) => Some(e),
            _ => None,
        }
    }
}

/// `backups/name` -> `backups/name.zip`
pub fn archive_path_for(snapshot_dir: &Path) -> PathBuf {
    let mut os = snapshot_dir.as_os_str().to_os_string();
    os.push(ARCHIVE_SUFFIX);
    PathBuf::from(os)
}

/// Whether a path names an archive (by suffix)
pub fn is_archive_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(ARCHIVE_SUFFIX))
}

fn zip_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Compress `snapshot_dir` into `out_path`.
///
/// Entries are stored under the directory's own name so extraction recreates
/// `<name>/...`. Symlinks are stored as links, never followed.
pub fn create_archive(snapshot_dir: &Path, out_path: &Path) -> Result<(), ArchiveError> {
    let base = snapshot_dir
        .parent()
        .ok_or_else(|| ArchiveError::NotASnapshot(snapshot_dir.to_path_buf()))?;

    let zip_file = File::create(out_path)?;
    let mut zip = zip::ZipWriter::new(zip_file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(snapshot_dir).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| ArchiveError::NotASnapshot(entry.path().to_path_buf()))?;
        let name = zip_name(rel);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            let meta = entry.metadata()?;
            let mut file_options = options.large_file(meta.len() >= u32::MAX as u64);
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file_options = file_options.unix_permissions(meta.permissions().mode());
            }
            zip.start_file(name, file_options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut zip)?;
        } else if entry.path_is_symlink() {
            let target = fs::read_link(entry.path())?;
            zip.add_symlink(name, target.to_string_lossy(), options)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping special file in archive");
        }
    }

    let mut zip_file = zip.finish()?;
    zip_file.flush()?;
    Ok(())
}

/// Extract `archive` into `dest` and return the snapshot root inside it.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    let mut links: Vec<PathBuf> = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        // Nothing may be written through a link extracted earlier
        if links.iter().any(|link| rel.starts_with(link)) {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        }
        let out = dest.join(&rel);

        #[cfg(unix)]
        if entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            io::Read::read_to_string(&mut entry, &mut target)?;
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(&target, &out)?;
            links.push(rel);
            continue;
        }

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut dst = File::create(&out)?;
        io::copy(&mut entry, &mut dst)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(snapshot_root_in(dest))
}

/// Archives wrap everything in `<name>/`; fall back to `dest` itself.
fn snapshot_root_in(dest: &Path) -> PathBuf {
    if dest.join(MANIFEST_FILE).exists() {
        return dest.to_path_buf();
    }
    let dirs: Vec<PathBuf> = fs::read_dir(dest)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    match dirs.as_slice() {
        [only] => only.clone(),
        _ => dest.to_path_buf(),
    }
}

/// A snapshot ready to be read, wherever it came from.
///
/// When opened from an archive the extracted copy lives in a scratch
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct OpenedSnapshot {
    root: PathBuf,
    source: PathBuf,
    scratch: Option<TempDir>,
}

impl OpenedSnapshot {
    /// Open a snapshot directory or `.zip` archive
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            return Ok(Self {
                root: path.to_path_buf(),
                source: path.to_path_buf(),
                scratch: None,
            });
        }

        if !is_archive_path(path) {
            return Err(ArchiveError::NotASnapshot(path.to_path_buf()));
        }

        let scratch = tempfile::Builder::new().prefix("snapguard-").tempdir()?;
        let root = extract_archive(path, scratch.path())?;
        tracing::debug!(
            archive = %path.display(),
            scratch = %scratch.path().display(),
            "Extracted archive"
        );
        Ok(Self {
            root,
            source: path.to_path_buf(),
            scratch: Some(scratch),
        })
    }

    /// Directory holding manifest and categories
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the operator gave us
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_extracted(&self) -> bool {
        self.scratch.is_some()
    }

    /// Snapshot name (directory name, or archive name without suffix)
    pub fn name(&self) -> String {
        let file_name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        file_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .map(str::to_string)
            .unwrap_or(file_name)
    }
}
