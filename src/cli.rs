//! Command-line surface: backup, verify, restore, services, init

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, LoadOptions};
use crate::deployment::DeploymentHandle;
use crate::restore::{RestoreError, RestoreOptions, Restorer};
use crate::runtime::{DockerProcessManager, RuntimeController};
use crate::snapshot::{list_snapshots, BackupOptions, SnapshotBuilder};
use crate::util::fs::human_size;
use crate::util::{Progress, RunOutcome};
use crate::verify::Verifier;

/// Exit code for a restore interrupted before any files changed
pub const EXIT_CANCELLED: i32 = 130;

/// Snapshot, verify and restore a deployment
#[derive(Parser, Debug)]
#[command(name = "snapguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Deployment root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file (defaults to <root>/snapguard.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for logs (defaults to $SNAPGUARD_HOME or ~/.snapguard)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a snapshot and archive of the deployment
    Backup {
        /// Label for the snapshot (defaults to the timestamp)
        #[arg(long)]
        name: Option<String>,
        /// Include the logs category
        #[arg(long)]
        include_logs: bool,
        /// Include the models category
        #[arg(long)]
        include_models: bool,
    },

    /// Check a snapshot; without --backup, list available snapshots
    Verify {
        /// Snapshot directory, archive, or snapshot name under the backups root
        #[arg(long)]
        backup: Option<PathBuf>,
        /// Also flag empty and oversized files and recheck checksums
        #[arg(long)]
        detailed: bool,
    },

    /// Restore the deployment from a snapshot
    Restore {
        /// Snapshot directory, archive, or snapshot name under the backups root
        #[arg(long)]
        backup: PathBuf,
        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,
        /// Leave runtime processes running while files are replaced
        #[arg(long)]
        skip_services: bool,
        /// Also restore logs
        #[arg(long)]
        restore_logs: bool,
        /// Also restore models
        #[arg(long)]
        restore_models: bool,
    },

    /// Inspect or control the managed runtime processes
    #[command(subcommand)]
    Services(ServicesCommand),

    /// Write an example snapguard.toml into the deployment root
    Init,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ServicesCommand {
    /// Show whether each managed process is running
    Status,
    /// Start all processes and wait for the application to answer
    Start,
    /// Stop all processes
    Stop,
    /// Stop, then start and wait
    Restart,
}

/// Everything a handler needs
struct Invocation {
    config: Config,
    deployment: DeploymentHandle,
    runtime: Option<RuntimeController>,
    progress: Progress,
}

impl Invocation {
    fn load(cli: &Cli) -> Result<Self> {
        let config = Config::load(&LoadOptions {
            config_path: cli.config.clone(),
            root: cli.root.clone(),
        })
        .context("Failed to load configuration")?;
        let deployment = DeploymentHandle::from_config(&config);
        let runtime = connect_runtime(&config, &deployment);
        Ok(Self {
            config,
            deployment,
            runtime,
            progress: Progress::stdout(),
        })
    }

    /// Accept a path, or a bare snapshot name under the backups root
    fn resolve_snapshot(&self, given: &Path) -> PathBuf {
        if given.exists() {
            return given.to_path_buf();
        }
        let candidate = self.deployment.backups_root().join(given);
        if candidate.exists() {
            candidate
        } else {
            given.to_path_buf()
        }
    }
}

/// The container engine is optional: without it backups record no
/// descriptors and restores need --skip-services.
fn connect_runtime(config: &Config, deployment: &DeploymentHandle) -> Option<RuntimeController> {
    match DockerProcessManager::new(
        &config.processes.engine_binary,
        config.processes.command_timeout,
        config.liveness.timeout,
    ) {
        Ok(manager) => Some(RuntimeController::new(
            Arc::new(manager),
            deployment.processes().clone(),
            deployment.liveness().clone(),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Process manager unavailable");
            None
        }
    }
}

/// Run the parsed command and return the process exit code
pub async fn run(cli: Cli) -> Result<i32> {
    let ctx = Invocation::load(&cli)?;
    tracing::info!(
        root = %ctx.deployment.root().display(),
        backups = %ctx.deployment.backups_root().display(),
        runtime = ctx.runtime.is_some(),
        "Deployment loaded"
    );

    match cli.command {
        Commands::Backup {
            name,
            include_logs,
            include_models,
        } => {
            backup(
                &ctx,
                BackupOptions {
                    label: name,
                    include_logs,
                    include_models,
                    ..BackupOptions::default()
                },
            )
            .await
        }
        Commands::Verify { backup, detailed } => match backup {
            Some(path) => verify(&ctx, &ctx.resolve_snapshot(&path), detailed),
            None => list(&ctx),
        },
        Commands::Restore {
            backup,
            force,
            skip_services,
            restore_logs,
            restore_models,
        } => {
            let options = RestoreOptions {
                backup: ctx.resolve_snapshot(&backup),
                skip_services,
                restore_logs,
                restore_models,
            };
            restore(&ctx, options, force).await
        }
        Commands::Services(command) => services(&ctx, command).await,
        Commands::Init => init(ctx.deployment.root()),
    }
}

async fn backup(ctx: &Invocation, options: BackupOptions) -> Result<i32> {
    let mut builder = SnapshotBuilder::new(&ctx.deployment).with_progress(ctx.progress.clone());
    if let Some(runtime) = &ctx.runtime {
        builder = builder.with_runtime(runtime);
    }

    match builder.build(&options).await {
        Ok(outcome) => {
            ctx.progress.summary(
                "Backup",
                RunOutcome::from_counts(0, outcome.warnings.len()),
                &outcome.warnings,
            );
            ctx.progress.info(format!("snapshot {}", outcome.dir.display()));
            ctx.progress.info(format!("archive  {}", outcome.archive.display()));
            Ok(0)
        }
        Err(e) => {
            ctx.progress.fail(&e);
            ctx.progress.summary("Backup", RunOutcome::Failed, &[]);
            Err(e).context("Backup failed")
        }
    }
}

fn verify(ctx: &Invocation, path: &Path, detailed: bool) -> Result<i32> {
    let report = Verifier::new(ctx.config.verify.clone())
        .verify(path, detailed)
        .context("Verification could not run")?;
    report.render(&ctx.progress);
    Ok(report.failures().min(255) as i32)
}

fn list(ctx: &Invocation) -> Result<i32> {
    let root = ctx.deployment.backups_root();
    let snapshots = list_snapshots(root)
        .with_context(|| format!("Failed to list snapshots in {}", root.display()))?;

    ctx.progress
        .stage(&format!("Snapshots in {}", root.display()));
    if snapshots.is_empty() {
        ctx.progress.info("no snapshots found");
    }
    for snapshot in &snapshots {
        let size = snapshot
            .size_bytes
            .map(human_size)
            .unwrap_or_else(|| "-".to_string());
        let forms = match (&snapshot.dir, &snapshot.archive) {
            (Some(_), Some(_)) => "dir+archive",
            (Some(_), None) => "dir",
            (None, Some(_)) => "archive",
            (None, None) => "-",
        };
        ctx.progress.info(format!(
            "{:<40} {:<8} {}  {:>10}  {}",
            snapshot.name,
            snapshot.kind.as_str(),
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            size,
            forms
        ));
    }
    ctx.progress
        .info("verify one with: snapguard verify --backup <name>");
    Ok(0)
}

async fn restore(ctx: &Invocation, options: RestoreOptions, force: bool) -> Result<i32> {
    if !force && !confirm_restore(ctx, &options)? {
        ctx.progress.info("Restore cancelled, nothing was changed");
        return Ok(0);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received; stopping at the next safe point");
            interrupt.cancel();
        }
    });

    let mut restorer = Restorer::new(&ctx.deployment)
        .with_progress(ctx.progress.clone())
        .with_cancellation(cancel);
    if let Some(runtime) = &ctx.runtime {
        restorer = restorer.with_runtime(runtime);
    }
    let result = restorer.run(&options).await;
    watcher.abort();

    match result {
        Ok(report) if report.is_done() => Ok(0),
        Ok(_) => Ok(1),
        Err(RestoreError::Cancelled { safety_snapshot }) => {
            ctx.progress.warn("Restore cancelled before any files were changed");
            if let Some(path) = safety_snapshot {
                ctx.progress
                    .info(format!("safety snapshot kept at {}", path.display()));
            }
            Ok(EXIT_CANCELLED)
        }
        Err(e) => {
            ctx.progress.fail(&e);
            ctx.progress.summary("Restore", RunOutcome::Failed, &[]);
            Err(e).context("Restore aborted")
        }
    }
}

fn confirm_restore(ctx: &Invocation, options: &RestoreOptions) -> Result<bool> {
    let mut stdout = io::stdout();
    writeln!(stdout, "About to restore {}", ctx.deployment.root().display())?;
    writeln!(stdout, "  from     {}", options.backup.display())?;
    if options.skip_services {
        writeln!(
            stdout,
            "  services will keep running while their files are replaced"
        )?;
    } else {
        writeln!(stdout, "  services {}", ctx.deployment.processes())?;
    }
    writeln!(
        stdout,
        "A safety snapshot is taken first. Live files are moved aside, not deleted."
    )?;
    write!(stdout, "Continue? [y/N] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn services(ctx: &Invocation, command: ServicesCommand) -> Result<i32> {
    let Some(runtime) = &ctx.runtime else {
        bail!(
            "Container engine '{}' is not available",
            ctx.config.processes.engine_binary
        );
    };
    let progress = &ctx.progress;
    let mut problems = Vec::new();

    if matches!(command, ServicesCommand::Stop | ServicesCommand::Restart) {
        progress.stage("Stopping services");
        match runtime.stop_all().await {
            Ok(()) => progress.ok(format!("stopped {}", runtime.processes())),
            Err(e) => {
                progress.fail(&e);
                problems.push(e.to_string());
            }
        }
    }

    if matches!(command, ServicesCommand::Start | ServicesCommand::Restart) {
        progress.stage("Starting services");
        for (name, e) in runtime.start_all().await {
            progress.fail(format!("{name}: {e}"));
            problems.push(format!("{name}: {e}"));
        }
        progress.stage(&format!("Waiting for {}", runtime.liveness_url()));
        let liveness = runtime.wait_for_liveness().await;
        if liveness.reachable {
            progress.ok(format!("reachable after {} attempts", liveness.attempts));
        } else {
            progress.warn(format!("not reachable after {} attempts", liveness.attempts));
        }
    }

    if let ServicesCommand::Status = command {
        progress.stage("Managed processes");
        for (name, status) in runtime.status().await.context("Failed to list processes")? {
            match status {
                Some(s) if s.running => progress.ok(format!("{name}: {}", s.state)),
                Some(s) => progress.warn(format!("{name}: {}", s.state)),
                None => progress.warn(format!("{name}: not found")),
            }
        }
        if runtime.probe_once().await {
            progress.ok(format!("{} is reachable", runtime.liveness_url()));
        } else {
            progress.warn(format!("{} is not reachable", runtime.liveness_url()));
        }
    }

    Ok(if problems.is_empty() { 0 } else { 1 })
}

fn init(root: &Path) -> Result<i32> {
    match Config::write_example(root)
        .with_context(|| format!("Failed to write config into {}", root.display()))?
    {
        Some(path) => println!("Wrote {}", path.display()),
        None => println!("{} already has a snapguard.toml", root.display()),
    }
    Ok(0)
}
