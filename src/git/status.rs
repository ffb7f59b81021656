//! Diff statistics for the uncommitted changes captured in a snapshot

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

/// Git diff statistics (files changed, insertions, deletions)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl GitDiffStats {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.files_changed > 0 || self.insertions > 0 || self.deletions > 0
    }

    /// Stats for staged and unstaged changes against HEAD.
    /// Anything that goes wrong yields empty stats.
    pub fn from_working_dir(working_dir: &Path) -> Self {
        let output = Command::new("git")
            .args(["diff", "--shortstat", "HEAD"])
            .current_dir(working_dir)
            .output();

        match output {
            Ok(o) if o.status.success() => Self::parse_shortstat(&String::from_utf8_lossy(&o.stdout)),
            _ => GitDiffStats::default(),
        }
    }

    /// Parse `git diff --shortstat` output
    /// Format: "1 file changed, 44 insertions(+), 10 deletions(-)"
    pub(crate) fn parse_shortstat(output: &str) -> Self {
        let mut stats = GitDiffStats::default();

        for part in output.trim().split(',') {
            let part = part.trim();
            let count = part
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            if part.contains("insertion") {
                stats.insertions = count;
            } else if part.contains("deletion") {
                stats.deletions = count;
            } else if part.contains("file") {
                stats.files_changed = count;
            }
        }

        stats
    }

    /// One-line summary, e.g. "3 files, +44 -10"
    pub fn summary(&self) -> String {
        format!(
            "{} file{}, +{} -{}",
            self.files_changed,
            if self.files_changed == 1 { "" } else { "s" },
            self.insertions,
            self.deletions
        )
    }
}
