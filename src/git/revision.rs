//! Revision-control queries used by backup and restore
//!
//! Every query is optional: a deployment without git (or a host without the
//! git binary) degrades to the `no-revision` sentinel and an empty patch.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use super::status::GitDiffStats;

/// Recorded in manifests when no revision could be determined
pub const NO_REVISION: &str = "no-revision";

#[derive(Error, Debug)]
pub enum GitError {
    #[error("git executable not found in PATH")]
    Unavailable,
    #[error("Not a git repository: {0}")]
    NotAGitRepo(PathBuf),
    #[error("Git command failed: {0}")]
    CommandFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source-control state captured at backup time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionState {
    /// HEAD hash or [`NO_REVISION`]
    pub revision: String,
    /// `git diff HEAD` output; empty when clean or untracked
    pub patch: String,
    pub stats: GitDiffStats,
}

impl RevisionState {
    pub fn untracked() -> Self {
        Self {
            revision: NO_REVISION.to_string(),
            patch: String::new(),
            stats: GitDiffStats::default(),
        }
    }

    pub fn has_revision(&self) -> bool {
        self.revision != NO_REVISION
    }
}

/// A git working tree rooted at a deployment
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    git: PathBuf,
}

impl GitRepo {
    /// Open the working tree at `root`.
    pub fn open(root: &Path) -> Result<Self, GitError> {
        let git = which::which("git").map_err(|_| GitError::Unavailable)?;
        let output = Command::new(&git)
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(root)
            .output()?;
        if !output.status.success() {
            return Err(GitError::NotAGitRepo(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            git,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(&self.root)
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Current HEAD commit hash
    pub fn head_revision(&self) -> Result<String, GitError> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Diff of staged and unstaged changes against HEAD
    pub fn working_tree_diff(&self) -> Result<String, GitError> {
        self.run(&["diff", "--binary", "HEAD"])
    }

    /// Capture revision, patch and stats.
    ///
    /// Failures are returned as warnings next to a best-effort state.
    pub fn capture(&self) -> (RevisionState, Vec<String>) {
        let mut warnings = Vec::new();
        let revision = match self.head_revision() {
            Ok(rev) if !rev.is_empty() => rev,
            Ok(_) => NO_REVISION.to_string(),
            Err(e) => {
                warnings.push(format!("could not read HEAD revision: {e}"));
                NO_REVISION.to_string()
            }
        };

        let patch = if revision == NO_REVISION {
            String::new()
        } else {
            match self.working_tree_diff() {
                Ok(patch) => patch,
                Err(e) => {
                    warnings.push(format!("could not capture uncommitted changes: {e}"));
                    String::new()
                }
            }
        };

        let stats = if patch.is_empty() {
            GitDiffStats::default()
        } else {
            GitDiffStats::from_working_dir(&self.root)
        };

        (
            RevisionState {
                revision,
                patch,
                stats,
            },
            warnings,
        )
    }
}

/// Capture revision state for `root`, degrading to the sentinel when git is
/// unavailable or the tree isn't tracked.
pub fn capture_revision_state(root: &Path) -> (RevisionState, Vec<String>) {
    match GitRepo::open(root) {
        Ok(repo) => repo.capture(),
        Err(e) => (
            RevisionState::untracked(),
            vec![format!("revision tracking unavailable: {e}")],
        ),
    }
}

/// Apply a patch file to the tree at `root` with `git apply`.
///
/// Works outside a repository too (git falls back to plain patch mode).
pub fn apply_patch(root: &Path, patch: &Path) -> Result<(), GitError> {
    let git = which::which("git").map_err(|_| GitError::Unavailable)?;
    let output = Command::new(git)
        .args(["apply", "--whitespace=nowarn"])
        .arg(patch)
        .current_dir(root)
        .output()?;
    if !output.status.success() {
        return Err(GitError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// Whether every hunk in `patch` is already present in the tree at `root`
/// (the reverse patch applies cleanly).
pub fn patch_already_applied(root: &Path, patch: &Path) -> bool {
    let Ok(git) = which::which("git") else {
        return false;
    };
    Command::new(git)
        .args(["apply", "--reverse", "--check", "--whitespace=nowarn"])
        .arg(patch)
        .current_dir(root)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
