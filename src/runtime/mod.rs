//! Runtime process control
//!
//! The managed processes live in a container engine. Everything here talks to
//! it through the [`ProcessManager`] trait so restores can run against a mock.

mod controller;
mod docker;
pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use controller::{LivenessResult, ProcessDescriptors, RuntimeController};
pub use docker::DockerProcessManager;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Container engine '{0}' not found in PATH")]
    EngineUnavailable(String),
    #[error("{operation} {name} failed: {message}")]
    CommandFailed {
        operation: &'static str,
        name: String,
        message: String,
    },
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
    #[error("Failed to parse engine output: {0}")]
    Parse(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Unknown process: {0}")]
    UnknownProcess(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Observed state of one named process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub running: bool,
    /// Image or version identifier
    pub image: Option<String>,
    /// Engine-reported status text ("Up 3 hours", "Exited (0)")
    pub state: String,
}

/// The named processes a deployment manages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSet {
    pub primary: String,
    pub auxiliary: Vec<String>,
}

impl ProcessSet {
    pub fn new(primary: impl Into<String>, auxiliary: Vec<String>) -> Self {
        Self {
            primary: primary.into(),
            auxiliary,
        }
    }

    /// Primary first, then auxiliaries in declaration order
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.auxiliary.iter().map(String::as_str))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.primary == name || self.auxiliary.iter().any(|a| a == name)
    }
}

impl fmt::Display for ProcessSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

/// Query-and-control interface to the process supervisor
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Engine identifier for logs and manifests
    fn engine_name(&self) -> &str;

    /// All processes the engine knows about
    async fn list(&self) -> Result<Vec<ProcessStatus>, RuntimeError>;

    /// Structural configuration dump of one process
    async fn inspect(&self, name: &str) -> Result<serde_json::Value, RuntimeError>;

    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    async fn start(&self, name: &str) -> Result<(), RuntimeError>;

    /// HTTP reachability check; any response counts as reachable
    async fn probe(&self, url: &str) -> bool;

    async fn is_running(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self
            .list()
            .await?
            .iter()
            .any(|p| p.name == name && p.running))
    }
}
