//! CLI entry and dispatch.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use codeloop_core::config::Config;
use codeloop_core::core::agent::LoopOptions;

use crate::modes;

#[derive(Parser)]
#[command(name = "codeloop")]
#[command(version)]
#[command(about = "Autonomous coding loop driven by WRITE/RUN/DONE control markers")]
struct Cli {
    /// Task description, or "-" to read it from stdin
    #[arg(value_name = "TASK")]
    task: String,

    /// Override the model from config
    #[arg(short, long)]
    model: Option<String>,

    /// Root directory for the working file (default: current directory)
    #[arg(long, default_value = ".")]
    root: String,

    /// Override the run timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    run_timeout: Option<u64>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Diagnostics go to stderr; stdout belongs to the model's live output.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("load config")?;

    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(secs) = cli.run_timeout {
        config.run_timeout_secs = secs;
    }

    let task = resolve_task(&cli.task)?;
    let options = LoopOptions {
        root: PathBuf::from(cli.root),
    };

    modes::exec::run_exec(&task, &config, &options).await
}

/// Resolves the task text; `-` means read the whole task from stdin.
fn resolve_task(raw: &str) -> Result<String> {
    if raw == "-" {
        let mut task = String::new();
        std::io::stdin()
            .read_to_string(&mut task)
            .context("read task from stdin")?;
        let task = task.trim().to_string();
        if task.is_empty() {
            anyhow::bail!("Task read from stdin is empty");
        }
        return Ok(task);
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Task description is empty");
    }
    Ok(trimmed.to_string())
}
