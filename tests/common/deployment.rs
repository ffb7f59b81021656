//! Scratch deployment fixtures
//!
//! A `ScratchDeployment` is a temporary tree with the default category
//! layout, a handle pointing at it, and helpers for building a mock-backed
//! runtime controller.

#![allow(dead_code)] // Each integration module uses a different subset

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use snapguard::config::LivenessConfig;
use snapguard::runtime::mock::MockProcessManager;
use snapguard::{DeploymentHandle, ProcessSet, RuntimeController};
use tempfile::TempDir;

pub const PRIMARY: &str = "app";
pub const AUXILIARY: &str = "redis";

/// Fixed instants so snapshot names are predictable and never collide
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub struct ScratchDeployment {
    /// TempDir handle (keeps directory alive until dropped)
    _dir: TempDir,
    /// Deployment root
    pub root: PathBuf,
}

impl ScratchDeployment {
    /// A deployment whose snapshots verify as complete-and-valid
    pub fn new() -> Self {
        Self::with_env_lines(12)
    }

    /// Same layout with an environment file of `lines` lines
    pub fn with_env_lines(lines: usize) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("deployment");
        fs::create_dir_all(&root).unwrap();
        let deployment = Self { _dir: dir, root };

        let env: String = (0..lines).map(|i| format!("SETTING_{i}=value{i}\n")).collect();
        deployment.write(".env", &env);
        deployment.write("requirements.txt", "requests==2.32\n");
        deployment.write("agent.py", "import python.tools\n");
        deployment.write("python/tools/search.py", "def search(q):\n    return q\n");
        deployment.write("python/helpers/files.py", "def read(p):\n    pass\n");
        deployment.write("prompts/system.md", "You are a helpful agent.\n");
        deployment.write("webui/index.html", "<html><body>v1</body></html>\n");
        deployment.write("webui/js/app.js", "console.log('v1');\n");
        deployment.write("webui/css/site.css", "body { margin: 0; }\n");
        deployment.write("memory/default/facts.json", "[\"sky is blue\"]\n");
        deployment.write("scripts/start.sh", "#!/bin/sh\necho start\n");
        deployment.write("logs/app.log", "started\n");
        deployment
    }

    pub fn handle(&self) -> DeploymentHandle {
        DeploymentHandle::new(&self.root)
            .with_processes(ProcessSet::new(PRIMARY, vec![AUXILIARY.into()]))
            .with_liveness(fast_liveness())
    }

    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Write a file relative to the root, creating parents
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    /// Write a `snapguard.toml` that points at an engine binary that doesn't exist
    pub fn write_config_without_engine(&self) {
        self.write(
            "snapguard.toml",
            "[processes]\nprimary = \"app\"\nauxiliary = [\"redis\"]\nengine_binary = \"snapguard-test-missing-engine\"\n\n[liveness]\nattempts = 1\ndelay_ms = 1\ntimeout_ms = 10\n",
        );
    }
}

pub fn fast_liveness() -> LivenessConfig {
    LivenessConfig {
        url: "http://localhost:1".into(),
        attempts: 3,
        delay: Duration::from_millis(1),
        timeout: Duration::from_millis(1),
    }
}

pub fn mock() -> MockProcessManager {
    MockProcessManager::new([PRIMARY, AUXILIARY])
}

pub fn runtime(mock: &MockProcessManager) -> RuntimeController {
    RuntimeController::new(
        Arc::new(mock.clone()),
        ProcessSet::new(PRIMARY, vec![AUXILIARY.into()]),
        fast_liveness(),
    )
}

/// Every regular file under `root`, relative, sorted
pub fn file_set(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}
