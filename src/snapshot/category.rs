//! The fixed, ordered set of snapshot categories

use std::fmt;

use serde::{Deserialize, Serialize};

/// A disjoint subtree of deployment state.
///
/// Declaration order is the copy order used by backups and the overwrite
/// order used by restores; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Environment and settings files
    Config,
    /// Application source code and prompts
    Code,
    /// Browser UI assets
    Webui,
    /// Persisted memory/state
    Memory,
    /// Runtime-process descriptors (metadata, never restored)
    Docker,
    /// Auxiliary scripts
    Scripts,
    /// Log files (opt-in)
    Logs,
    /// Model weights and caches (opt-in)
    Models,
}

impl Category {
    /// Every category in backup order
    pub const ALL: [Category; 8] = [
        Category::Config,
        Category::Code,
        Category::Webui,
        Category::Memory,
        Category::Docker,
        Category::Scripts,
        Category::Logs,
        Category::Models,
    ];

    /// Categories a restore may overwrite, in overwrite order
    pub const RESTORABLE: [Category; 7] = [
        Category::Config,
        Category::Code,
        Category::Webui,
        Category::Memory,
        Category::Scripts,
        Category::Logs,
        Category::Models,
    ];

    /// Directory name inside a snapshot
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Config => "config",
            Category::Code => "code",
            Category::Webui => "webui",
            Category::Memory => "memory",
            Category::Docker => "docker",
            Category::Scripts => "scripts",
            Category::Logs => "logs",
            Category::Models => "models",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Config => "Configuration",
            Category::Code => "Application code",
            Category::Webui => "UI assets",
            Category::Memory => "Memory/state",
            Category::Docker => "Runtime descriptors",
            Category::Scripts => "Scripts",
            Category::Logs => "Logs",
            Category::Models => "Models",
        }
    }

    /// Parse from a config key or directory name
    pub fn parse(s: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.dir_name().eq_ignore_ascii_case(s.trim()))
    }

    /// Whether this category is only included on request
    pub fn is_optional(&self) -> bool {
        matches!(self, Category::Logs | Category::Models)
    }

    /// Whether a snapshot taken with these flags must contain this category
    pub fn is_expected(&self, include_logs: bool, include_models: bool) -> bool {
        match self {
            Category::Logs => include_logs,
            Category::Models => include_models,
            _ => true,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
