//! Git fixtures for deployments under revision control
//!
//! Turns a scratch deployment tree into a git working tree so backup and
//! restore can be exercised with real revisions and uncommitted changes.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Whether the git binary is on PATH. Tests that need git skip without it.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// A git working tree rooted at an existing directory
pub struct GitTree {
    pub path: PathBuf,
}

impl GitTree {
    /// Initialize a repository at `path` and commit everything in it
    ///
    /// The repository will have:
    /// - User configured (test@example.com)
    /// - GPG signing disabled (for CI compatibility)
    /// - `backups/` ignored so snapshots never show up as changes
    pub fn init(path: &Path) -> Self {
        let tree = Self {
            path: path.to_path_buf(),
        };
        tree.git(&["init"]);
        tree.git(&["config", "user.email", "test@example.com"]);
        tree.git(&["config", "user.name", "Test User"]);
        // Disable GPG signing to ensure tests work on machines with global signing enabled
        tree.git(&["config", "commit.gpgsign", "false"]);
        std::fs::write(path.join(".gitignore"), "backups/\n").unwrap();
        tree.git(&["add", "."]);
        tree.git(&["commit", "-m", "Initial commit"]);
        tree
    }

    /// Get the HEAD commit SHA
    pub fn head_sha(&self) -> String {
        self.git_output(&["rev-parse", "HEAD"]).trim().to_string()
    }

    /// Check if the working tree has changes to tracked files
    pub fn is_dirty(&self) -> bool {
        !self.git_output(&["diff", "HEAD", "--name-only"]).trim().is_empty()
    }

    /// Execute a git command in the working tree
    fn git(&self, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .unwrap_or_else(|e| panic!("Git command failed to execute: {}", e));

        if !output.status.success() {
            panic!(
                "Git command failed: git {}\nstderr: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }

    /// Execute a git command and return output (for queries)
    fn git_output(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .expect("Git command failed");
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}
