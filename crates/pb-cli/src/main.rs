//! pbuild CLI
//!
//! Builds a project on many remote hosts at once:
//! - build: deliver and run a generated build script on every selected host
//! - list: show the resolved configuration and host table
//! - check: verify every host accepts a remote shell

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pb_core::config::{default_config_path, CONFIG_ENV};
use pbuild::commands::{self, BuildArgs, BuildPlan};

#[derive(Parser)]
#[command(name = "pbuild")]
#[command(author, version, about = "Concurrent multi-host build orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build on the selected hosts
    Build(BuildArgs),

    /// List configured hosts and settings
    List {
        /// Only show hosts configured under this selector
        #[arg(long)]
        select: Option<String>,
        /// Print hosts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that every configured host is reachable
    Check {
        /// Only check hosts configured under this selector
        #[arg(long)]
        select: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let code = match cli.command {
        Commands::Build(args) => {
            let plan = BuildPlan::prepare(&config_path, args)?;
            init_logging(log_level, plan.trace_file().as_deref())?;
            tracing::info!(hosts = plan.hosts().len(), config = %config_path.display(), "Starting build");
            plan.run().await?
        }

        Commands::List { select, json } => {
            init_logging(log_level, None)?;
            commands::list_command(&config_path, select, json)?;
            0
        }

        Commands::Check { select } => {
            init_logging(log_level, None)?;
            commands::check_command(&config_path, select).await?
        }
    };

    if code != 0 {
        std::process::exit(code.min(255));
    }
    Ok(())
}

/// Send diagnostics to stderr, or to `trace_file` while the dashboard is up
fn init_logging(level: &str, trace_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
    );

    let file_layer = match trace_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create trace log {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = trace_file.is_none().then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}
