//! Filesystem helpers shared by the builder, verifier and restorer

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Totals for a copied tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

impl CopyStats {
    fn add(&mut self, other: CopyStats) {
        self.files += other.files;
        self.bytes += other.bytes;
    }
}

/// Copy a file or directory tree from `src` to `dst`.
///
/// Directories are copied recursively. Symlinks are recreated as symlinks
/// on unix and followed elsewhere.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<CopyStats> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dst)?;
        return Ok(CopyStats::default());
    }

    if !meta.is_dir() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(src, dst)?;
        return Ok(CopyStats { files: 1, bytes });
    }

    let mut stats = CopyStats::default();
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&out)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let bytes = fs::copy(entry.path(), &out)?;
            stats.add(CopyStats { files: 1, bytes });
        }
    }
    Ok(stats)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::metadata(src)?.is_dir() {
        copy_path(&fs::canonicalize(src)?, dst).map(|_| ())
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ())
    }
}

/// Total on-disk size of all regular files under `root`
pub fn dir_size(root: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Count regular files under `root` whose extension is in `extensions`.
///
/// Extensions are compared case-insensitively and without the leading dot.
/// A missing root counts as zero.
pub fn count_files_with_extensions(root: &Path, extensions: &[String]) -> u64 {
    if !root.is_dir() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .count() as u64
}

/// Pick a path next to `path` with the given suffix that doesn't exist yet.
///
/// `foo` + `.pre-restore-X` gives `foo.pre-restore-X`, then
/// `foo.pre-restore-X-1`, `foo.pre-restore-X-2`, ...
pub fn unique_sibling(path: &Path, suffix: &str) -> PathBuf {
    let base = path.as_os_str().to_string_lossy().into_owned();
    let first = PathBuf::from(format!("{base}{suffix}"));
    if fs::symlink_metadata(&first).is_err() {
        return first;
    }
    let mut n = 1u32;
    loop {
        let candidate = PathBuf::from(format!("{base}{suffix}-{n}"));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

/// Whether an IO error means the destination filesystem is out of space
pub fn is_disk_full(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(code) if code == libc::ENOSPC || code == libc::EDQUOT)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

/// Render a byte count for operator output
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
