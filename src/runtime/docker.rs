//! Container-engine backed process manager (docker or a CLI-compatible engine)

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ProcessManager, ProcessStatus, RuntimeError};

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
}

impl PsLine {
    fn into_status(self) -> ProcessStatus {
        let running = self
            .state
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("running"))
            .unwrap_or_else(|| {
                self.status
                    .as_deref()
                    .is_some_and(|s| s.starts_with("Up"))
            });
        ProcessStatus {
            // Multiple names are comma separated; the first is canonical
            name: self
                .names
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            running,
            image: self.image.filter(|i| !i.is_empty()),
            state: self.status.or(self.state).unwrap_or_default(),
        }
    }
}

pub(crate) fn parse_ps_output(stdout: &str) -> Result<Vec<ProcessStatus>, RuntimeError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<PsLine>(line)
                .map(PsLine::into_status)
                .map_err(|e| RuntimeError::Parse(format!("{e}: {line}")))
        })
        .collect()
}

/// Process manager that shells out to a container engine CLI
#[derive(Debug, Clone)]
pub struct DockerProcessManager {
    binary: PathBuf,
    engine: String,
    command_timeout: Duration,
    http: Client,
}

impl DockerProcessManager {
    /// Locate the engine binary (e.g. "docker", "podman") in PATH
    pub fn new(engine: &str, command_timeout: Duration, probe_timeout: Duration) -> Result<Self, RuntimeError> {
        let binary =
            which::which(engine).map_err(|_| RuntimeError::EngineUnavailable(engine.to_string()))?;
        let http = Client::builder().timeout(probe_timeout).build()?;
        Ok(Self {
            binary,
            engine: engine.to_string(),
            command_timeout,
            http,
        })
    }

    async fn run(&self, operation: &'static str, args: &[&str]) -> Result<String, RuntimeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        let output = timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation: format!("{} {}", self.engine, args.join(" ")),
                secs: self.command_timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                operation,
                name: args.last().copied().unwrap_or_default().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProcessManager for DockerProcessManager {
    fn engine_name(&self) -> &str {
        &self.engine
    }

    async fn list(&self) -> Result<Vec<ProcessStatus>, RuntimeError> {
        let stdout = self
            .run("list", &["ps", "--all", "--no-trunc", "--format", "{{json .}}"])
            .await?;
        parse_ps_output(&stdout)
    }

    async fn inspect(&self, name: &str) -> Result<serde_json::Value, RuntimeError> {
        let stdout = self.run("inspect", &["inspect", name]).await?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;
        // `inspect` returns a one-element array
        match value {
            serde_json::Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
            serde_json::Value::Array(_) => Err(RuntimeError::UnknownProcess(name.to_string())),
            other => Ok(other),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        tracing::debug!(engine = %self.engine, name, "Stopping process");
        self.run("stop", &["stop", name]).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        tracing::debug!(engine = %self.engine, name, "Starting process");
        self.run("start", &["start", name]).await.map(|_| ())
    }

    async fn probe(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "Liveness probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}
