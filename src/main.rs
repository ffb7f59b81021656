use anyhow::Result;
use clap::Parser;
use snapguard::cli::{self, Cli};
use snapguard::util;
use std::fs::{self, OpenOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to file (~/.snapguard/logs/snapguard.log)
    util::init_data_dir(cli.data_dir.clone());
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "snapguard started");

    let code = match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}
