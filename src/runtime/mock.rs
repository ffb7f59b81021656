//! Mock process manager for deterministic testing
//!
//! Implements [`ProcessManager`] over an in-memory process table and records
//! every call, so tests can assert on stop/start ordering without a container
//! engine.
//!
//! # Example
//! ```no_run
//! use snapguard::runtime::mock::{MockProcessManager, ProcessCall};
//! use snapguard::runtime::ProcessManager;
//!
//! # async fn demo() {
//! let manager = MockProcessManager::new(["app", "redis"]).reachable_after(2);
//! manager.stop("app").await.unwrap();
//! assert_eq!(manager.calls(), vec![ProcessCall::Stop("app".into())]);
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProcessManager, ProcessStatus, RuntimeError};

/// A recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    List,
    Inspect(String),
    Stop(String),
    Start(String),
    Probe(String),
}

#[derive(Debug, Default)]
struct MockState {
    /// name -> running
    processes: BTreeMap<String, bool>,
    calls: Vec<ProcessCall>,
    probes: u32,
}

/// Mock process manager for testing
#[derive(Debug, Clone)]
pub struct MockProcessManager {
    state: Arc<Mutex<MockState>>,
    fail_stop: HashSet<String>,
    fail_start: HashSet<String>,
    fail_list: bool,
    /// Probe succeeds once this many probes have been made; None = never
    reachable_after: Option<u32>,
}

impl MockProcessManager {
    /// All named processes start out running and the probe answers at once
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let processes = names.into_iter().map(|n| (n.into(), true)).collect();
        Self {
            state: Arc::new(Mutex::new(MockState {
                processes,
                ..MockState::default()
            })),
            fail_stop: HashSet::new(),
            fail_start: HashSet::new(),
            fail_list: false,
            reachable_after: Some(1),
        }
    }

    /// Make `stop(name)` fail
    pub fn failing_stop(mut self, name: &str) -> Self {
        self.fail_stop.insert(name.to_string());
        self
    }

    /// Make `start(name)` fail
    pub fn failing_start(mut self, name: &str) -> Self {
        self.fail_start.insert(name.to_string());
        self
    }

    /// Make `list()` fail (engine down)
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Probe succeeds starting with the `n`th call
    pub fn reachable_after(mut self, n: u32) -> Self {
        self.reachable_after = Some(n.max(1));
        self
    }

    /// Probe never succeeds
    pub fn unreachable(mut self) -> Self {
        self.reachable_after = None;
        self
    }

    /// Get recorded calls for assertions
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded stop/start calls only
    pub fn lifecycle_calls(&self) -> Vec<ProcessCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ProcessCall::Stop(_) | ProcessCall::Start(_)))
            .collect()
    }

    pub fn is_running_now(&self, name: &str) -> bool {
        self.state.lock().processes.get(name).copied().unwrap_or(false)
    }

    /// Reset recorded calls
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.probes = 0;
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    fn engine_name(&self) -> &str {
        "mock"
    }

    async fn list(&self) -> Result<Vec<ProcessStatus>, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::List);
        if self.fail_list {
            return Err(RuntimeError::EngineUnavailable("mock".into()));
        }
        Ok(state
            .processes
            .iter()
            .map(|(name, running)| ProcessStatus {
                name: name.clone(),
                running: *running,
                image: Some(format!("mock/{name}:latest")),
                state: if *running { "Up" } else { "Exited (0)" }.to_string(),
            })
            .collect())
    }

    async fn inspect(&self, name: &str) -> Result<serde_json::Value, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::Inspect(name.to_string()));
        let running = *state
            .processes
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownProcess(name.to_string()))?;
        Ok(serde_json::json!({
            "Name": name,
            "Config": { "Image": format!("mock/{name}:latest") },
            "State": { "Running": running },
        }))
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::Stop(name.to_string()));
        if self.fail_stop.contains(name) {
            return Err(RuntimeError::CommandFailed {
                operation: "stop",
                name: name.to_string(),
                message: "mock stop failure".into(),
            });
        }
        match state.processes.get_mut(name) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(RuntimeError::UnknownProcess(name.to_string())),
        }
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::Start(name.to_string()));
        if self.fail_start.contains(name) {
            return Err(RuntimeError::CommandFailed {
                operation: "start",
                name: name.to_string(),
                message: "mock start failure".into(),
            });
        }
        match state.processes.get_mut(name) {
            Some(running) => {
                *running = true;
                Ok(())
            }
            None => Err(RuntimeError::UnknownProcess(name.to_string())),
        }
    }

    async fn probe(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::Probe(url.to_string()));
        state.probes += 1;
        self.reachable_after.is_some_and(|n| state.probes >= n)
    }
}
