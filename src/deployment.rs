//! Explicit handle on one managed deployment

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{Config, LivenessConfig, VerifyConfig};
use crate::runtime::ProcessSet;
use crate::snapshot::Category;

/// Everything an operation needs to know about a deployment: where its tree
/// lives, where its snapshots go, which processes it runs, and how its
/// categories map onto the tree.
#[derive(Debug, Clone)]
pub struct DeploymentHandle {
    root: PathBuf,
    backups_root: PathBuf,
    processes: ProcessSet,
    layout: BTreeMap<Category, Vec<PathBuf>>,
    liveness: LivenessConfig,
    verify: VerifyConfig,
}

impl DeploymentHandle {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.deployment_root.clone(),
            backups_root: config.backups_root(),
            processes: ProcessSet::new(
                config.processes.primary.clone(),
                config.processes.auxiliary.clone(),
            ),
            layout: config.categories.clone(),
            liveness: config.liveness.clone(),
            verify: config.verify.clone(),
        }
    }

    /// Handle with default layout rooted at `root` (snapshots in `root/backups`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_config(&Config::default().with_deployment_root(root))
    }

    pub fn with_backups_root(mut self, backups_root: impl Into<PathBuf>) -> Self {
        self.backups_root = backups_root.into();
        self
    }

    pub fn with_processes(mut self, processes: ProcessSet) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_category_paths(mut self, category: Category, paths: Vec<PathBuf>) -> Self {
        self.layout.insert(category, paths);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backups_root(&self) -> &Path {
        &self.backups_root
    }

    pub fn processes(&self) -> &ProcessSet {
        &self.processes
    }

    pub fn liveness(&self) -> &LivenessConfig {
        &self.liveness
    }

    pub fn verify_config(&self) -> &VerifyConfig {
        &self.verify
    }

    /// Source paths (relative to the root) for a category
    pub fn category_paths(&self, category: Category) -> &[PathBuf] {
        self.layout.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Absolute live location of a category entry
    pub fn live_path(&self, entry: &Path) -> PathBuf {
        self.root.join(entry)
    }
}
