use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::LivenessConfig;

use super::{ProcessManager, ProcessSet, ProcessStatus, RuntimeError};

/// Upper bound on each metadata query made while describing processes
const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata about the managed processes, captured into snapshots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessDescriptors {
    pub engine: String,
    /// Everything the engine listed
    pub listing: Vec<ProcessStatus>,
    /// Managed process -> image identifier
    pub images: BTreeMap<String, String>,
    /// Managed process -> inspect dump
    pub inspections: BTreeMap<String, serde_json::Value>,
    /// Queries that failed or timed out
    pub errors: Vec<String>,
}

/// Outcome of the bounded liveness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessResult {
    pub reachable: bool,
    pub attempts: u32,
}

/// Starts, stops and probes the runtime process set
#[derive(Clone)]
pub struct RuntimeController {
    manager: Arc<dyn ProcessManager>,
    processes: ProcessSet,
    liveness: LivenessConfig,
}

impl RuntimeController {
    pub fn new(
        manager: Arc<dyn ProcessManager>,
        processes: ProcessSet,
        liveness: LivenessConfig,
    ) -> Self {
        Self {
            manager,
            processes,
            liveness,
        }
    }

    pub fn processes(&self) -> &ProcessSet {
        &self.processes
    }

    pub fn liveness_url(&self) -> &str {
        &self.liveness.url
    }

    /// Status of each managed process; None when the engine doesn't know it
    pub async fn status(&self) -> Result<Vec<(String, Option<ProcessStatus>)>, RuntimeError> {
        let listing = self.manager.list().await?;
        Ok(self
            .processes
            .names()
            .into_iter()
            .map(|name| {
                let status = listing.iter().find(|p| p.name == name).cloned();
                (name.to_string(), status)
            })
            .collect())
    }

    /// Stop every managed process in parallel.
    ///
    /// Waits for all stops to finish before returning; the first error is
    /// reported after the others have completed.
    pub async fn stop_all(&self) -> Result<(), RuntimeError> {
        let names = self.processes.names();
        let results = join_all(names.iter().map(|name| self.manager.stop(name))).await;
        let mut first_error = None;
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(()) => tracing::info!(name, "Process stopped"),
                Err(e) => {
                    tracing::error!(name, error = %e, "Failed to stop process");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Start auxiliaries in parallel, then the primary process.
    ///
    /// Returns the names that failed to start.
    pub async fn start_all(&self) -> Vec<(String, RuntimeError)> {
        let mut failures = Vec::new();
        let aux = &self.processes.auxiliary;
        let results = join_all(aux.iter().map(|name| self.manager.start(name))).await;
        for (name, result) in aux.iter().zip(results) {
            match result {
                Ok(()) => tracing::info!(name = %name, "Process started"),
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Failed to start process");
                    failures.push((name.clone(), e));
                }
            }
        }

        let primary = &self.processes.primary;
        match self.manager.start(primary).await {
            Ok(()) => tracing::info!(name = %primary, "Process started"),
            Err(e) => {
                tracing::error!(name = %primary, error = %e, "Failed to start process");
                failures.push((primary.clone(), e));
            }
        }
        failures
    }

    /// Poll the liveness endpoint with the configured retry budget
    pub async fn wait_for_liveness(&self) -> LivenessResult {
        let attempts = self.liveness.attempts.max(1);
        for attempt in 1..=attempts {
            if self.manager.probe(&self.liveness.url).await {
                tracing::info!(url = %self.liveness.url, attempt, "Service is reachable");
                return LivenessResult {
                    reachable: true,
                    attempts: attempt,
                };
            }
            if attempt < attempts {
                tokio::time::sleep(self.liveness.delay).await;
            }
        }
        tracing::warn!(url = %self.liveness.url, attempts, "Service did not become reachable");
        LivenessResult {
            reachable: false,
            attempts,
        }
    }

    /// Single liveness probe
    pub async fn probe_once(&self) -> bool {
        self.manager.probe(&self.liveness.url).await
    }

    /// Capture descriptors for every managed process.
    ///
    /// Each query is time-boxed and failures are recorded, never raised.
    pub async fn describe(&self) -> ProcessDescriptors {
        let mut descriptors = ProcessDescriptors {
            engine: self.manager.engine_name().to_string(),
            ..ProcessDescriptors::default()
        };

        match timeout(DESCRIBE_TIMEOUT, self.manager.list()).await {
            Ok(Ok(listing)) => descriptors.listing = listing,
            Ok(Err(e)) => descriptors.errors.push(format!("list: {e}")),
            Err(_) => descriptors.errors.push("list: timed out".to_string()),
        }

        for name in self.processes.names() {
            if let Some(image) = descriptors
                .listing
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.image.clone())
            {
                descriptors.images.insert(name.to_string(), image);
            }

            match timeout(DESCRIBE_TIMEOUT, self.manager.inspect(name)).await {
                Ok(Ok(dump)) => {
                    descriptors.inspections.insert(name.to_string(), dump);
                }
                Ok(Err(e)) => descriptors.errors.push(format!("inspect {name}: {e}")),
                Err(_) => descriptors
                    .errors
                    .push(format!("inspect {name}: timed out")),
            }
        }

        descriptors
    }
}
