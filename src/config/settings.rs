use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::snapshot::Category;
use crate::util::paths::DEPLOYMENT_CONFIG_FILE;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("snapguard.toml.example");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Unknown category '{0}' in [categories]")]
    UnknownCategory(String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the deployment working tree
    pub deployment_root: PathBuf,
    /// Where snapshots live (relative paths resolve against the deployment root)
    pub backups_dir: PathBuf,
    /// Managed runtime processes
    pub processes: ProcessConfig,
    /// Liveness probe settings
    pub liveness: LivenessConfig,
    /// Source paths per category, relative to the deployment root
    pub categories: BTreeMap<Category, Vec<PathBuf>>,
    /// Verification thresholds
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// The application process
    pub primary: String,
    /// Cache, search index, ...
    pub auxiliary: Vec<String>,
    /// Container engine CLI (docker, podman)
    pub engine_binary: String,
    /// Upper bound on a single engine call
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub url: String,
    pub attempts: u32,
    pub delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Environment files shorter than this are flagged
    pub min_env_lines: usize,
    /// Files larger than this are flagged in detailed mode
    pub large_file_bytes: u64,
    pub source_extensions: Vec<String>,
    pub text_extensions: Vec<String>,
    /// Extension-point subtree expected under `code/`
    pub extension_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            backups_dir: PathBuf::from("backups"),
            processes: ProcessConfig::default(),
            liveness: LivenessConfig::default(),
            categories: default_categories(),
            verify: VerifyConfig::default(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            primary: "agent-zero".into(),
            auxiliary: vec!["redis".into(), "searxng".into()],
            engine_binary: "docker".into(),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:50001".into(),
            attempts: 12,
            delay: Duration::from_millis(5000),
            timeout: Duration::from_millis(3000),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            min_env_lines: 10,
            large_file_bytes: 100 * 1024 * 1024,
            source_extensions: vec!["py".into(), "rs".into(), "js".into(), "ts".into()],
            text_extensions: vec!["md".into(), "txt".into()],
            extension_dir: PathBuf::from("python/tools"),
        }
    }
}

/// Default source layout of a deployment
pub fn default_categories() -> BTreeMap<Category, Vec<PathBuf>> {
    let entries: [(Category, &[&str]); 8] = [
        (
            Category::Config,
            &[".env", "requirements.txt", "package.json", "conf"],
        ),
        (
            Category::Code,
            &[
                "python",
                "prompts",
                "agent.py",
                "models.py",
                "initialize.py",
                "run_ui.py",
            ],
        ),
        (Category::Webui, &["webui"]),
        (Category::Memory, &["memory"]),
        (
            Category::Docker,
            &["docker-compose.yml", "docker-compose.yaml", "Dockerfile", "docker"],
        ),
        (Category::Scripts, &["scripts"]),
        (Category::Logs, &["logs"]),
        (Category::Models, &["models"]),
    ];

    entries
        .into_iter()
        .map(|(category, paths)| (category, paths.iter().map(PathBuf::from).collect()))
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDeploymentConfig {
    pub root: Option<PathBuf>,
    pub backups_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlProcessConfig {
    pub primary: Option<String>,
    pub auxiliary: Option<Vec<String>>,
    pub engine_binary: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlLivenessConfig {
    pub url: Option<String>,
    pub attempts: Option<u32>,
    pub delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlVerifyConfig {
    pub min_env_lines: Option<usize>,
    pub large_file_mb: Option<u64>,
    pub source_extensions: Option<Vec<String>>,
    pub text_extensions: Option<Vec<String>>,
    pub extension_dir: Option<PathBuf>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub deployment: Option<TomlDeploymentConfig>,
    pub processes: Option<TomlProcessConfig>,
    pub liveness: Option<TomlLivenessConfig>,
    /// Category name -> source paths
    pub categories: Option<HashMap<String, Vec<PathBuf>>>,
    pub verify: Option<TomlVerifyConfig>,
}

/// Where to look for configuration
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file; must exist when given
    pub config_path: Option<PathBuf>,
    /// Deployment root from the command line; wins over the file
    pub root: Option<PathBuf>,
}

impl Config {
    /// Load configuration, merging the config file (if any) over defaults.
    ///
    /// Lookup: explicit path, then `<root>/snapguard.toml`, then defaults only.
    pub fn load(options: &LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(root) = &options.root {
            config.deployment_root = root.clone();
        }

        let config_file = match &options.config_path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.clone())),
            Some(path) => Some(path.clone()),
            None => {
                let candidate = config.deployment_root.join(DEPLOYMENT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        if let Some(path) = config_file {
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let toml_config =
                toml::from_str::<TomlConfig>(&contents).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            config.merge(toml_config, options.root.is_some())?;
            tracing::debug!(path = %path.display(), "Loaded config file");
        }

        Ok(config)
    }

    /// Parse a config from a TOML string on top of defaults
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let toml_config =
            toml::from_str::<TomlConfig>(contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Config::default();
        config.merge(toml_config, false)?;
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig, root_pinned: bool) -> Result<(), ConfigError> {
        if let Some(deployment) = toml_config.deployment {
            if let (Some(root), false) = (deployment.root, root_pinned) {
                self.deployment_root = root;
            }
            if let Some(backups_dir) = deployment.backups_dir {
                self.backups_dir = backups_dir;
            }
        }

        if let Some(processes) = toml_config.processes {
            if let Some(primary) = processes.primary {
                self.processes.primary = primary;
            }
            if let Some(auxiliary) = processes.auxiliary {
                self.processes.auxiliary = auxiliary;
            }
            if let Some(engine_binary) = processes.engine_binary {
                self.processes.engine_binary = engine_binary;
            }
            if let Some(secs) = processes.command_timeout_secs {
                self.processes.command_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(liveness) = toml_config.liveness {
            if let Some(url) = liveness.url {
                self.liveness.url = url;
            }
            if let Some(attempts) = liveness.attempts {
                self.liveness.attempts = attempts.max(1);
            }
            if let Some(ms) = liveness.delay_ms {
                self.liveness.delay = Duration::from_millis(ms);
            }
            if let Some(ms) = liveness.timeout_ms {
                self.liveness.timeout = Duration::from_millis(ms);
            }
        }

        if let Some(categories) = toml_config.categories {
            for (name, paths) in categories {
                let category =
                    Category::parse(&name).ok_or_else(|| ConfigError::UnknownCategory(name))?;
                self.categories.insert(category, paths);
            }
        }

        if let Some(verify) = toml_config.verify {
            if let Some(lines) = verify.min_env_lines {
                self.verify.min_env_lines = lines;
            }
            if let Some(mb) = verify.large_file_mb {
                self.verify.large_file_bytes = mb.saturating_mul(1024 * 1024);
            }
            if let Some(exts) = verify.source_extensions {
                self.verify.source_extensions = exts;
            }
            if let Some(exts) = verify.text_extensions {
                self.verify.text_extensions = exts;
            }
            if let Some(dir) = verify.extension_dir {
                self.verify.extension_dir = dir;
            }
        }

        Ok(())
    }

    pub fn with_deployment_root(mut self, root: PathBuf) -> Self {
        self.deployment_root = root;
        self
    }

    /// Absolute backups root for this deployment
    pub fn backups_root(&self) -> PathBuf {
        if self.backups_dir.is_absolute() {
            self.backups_dir.clone()
        } else {
            self.deployment_root.join(&self.backups_dir)
        }
    }

    /// Write the bundled example next to the deployment if none exists yet
    pub fn write_example(root: &Path) -> std::io::Result<Option<PathBuf>> {
        let path = root.join(DEPLOYMENT_CONFIG_FILE);
        if path.exists() {
            return Ok(None);
        }
        fs::write(&path, EXAMPLE_CONFIG)?;
        Ok(Some(path))
    }
}
