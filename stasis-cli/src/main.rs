// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Stasis CLI
//!
//! Command-line interface for the Stasis checkpoint/restore orchestrator.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use stasis_core::SnapshotOptions;

mod commands;

/// Stasis - checkpoint and restore containers with CRIU
#[derive(Parser)]
#[command(name = "stasis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: /etc/stasis/stasis.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write Prometheus metrics to this file when the command finishes
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Checkpoint one or more running containers
    Checkpoint {
        /// Containers to checkpoint (name or id)
        #[arg(required = true)]
        containers: Vec<String>,

        #[command(flatten)]
        snapshot: SnapshotArgs,

        /// Directory of a previous dump, for an incremental checkpoint
        #[arg(long)]
        prev_image_dir: Option<PathBuf>,

        /// Keep the container running after the checkpoint
        #[arg(long)]
        leave_running: bool,
    },

    /// Restore a checkpointed container and supervise it until it exits
    Restore {
        /// Container to restore (name or id)
        container: String,

        #[command(flatten)]
        snapshot: SnapshotArgs,

        /// Bypass the running/checkpointed checks
        #[arg(long)]
        force: bool,
    },

    /// Show detailed container state as JSON
    Inspect {
        /// Containers to inspect (name or id)
        #[arg(required = true)]
        containers: Vec<String>,
    },

    /// List containers
    List,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },
}

/// Options shared by checkpoint and restore.
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Directory for the checkpoint images (default: <container root>/criu.image)
    #[arg(long)]
    pub image_dir: Option<PathBuf>,

    /// Directory for CRIU work files and logs (default: <container root>/criu.work)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Allow established TCP connections
    #[arg(long)]
    pub tcp_established: bool,

    /// Allow external unix socket connections
    #[arg(long)]
    pub ext_unix_sk: bool,

    /// Allow shell jobs
    #[arg(long)]
    pub shell_job: bool,
}

impl SnapshotArgs {
    pub fn to_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            images_directory: self.image_dir.clone(),
            work_directory: self.work_dir.clone(),
            tcp_established: self.tcp_established,
            external_unix_connections: self.ext_unix_sk,
            shell_job: self.shell_job,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let outcome = run(cli.command, cli.config.as_deref()).await;

    if let Some(path) = &cli.metrics_file {
        if let Err(e) = commands::metrics::write(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    let exit_code = outcome?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Run one command; the result is the process exit code.
async fn run(command: Commands, config: Option<&Path>) -> Result<i32, Box<dyn std::error::Error>> {
    match command {
        Commands::Checkpoint {
            containers,
            snapshot,
            prev_image_dir,
            leave_running,
        } => {
            let opts = SnapshotOptions {
                previous_images_directory: prev_image_dir,
                leave_running,
                ..snapshot.to_options()
            };
            commands::checkpoint::execute(config, &containers, &opts).await?;
        }
        Commands::Restore {
            container,
            snapshot,
            force,
        } => {
            return commands::restore::execute(config, &container, &snapshot.to_options(), force)
                .await;
        }
        Commands::Inspect { containers } => commands::inspect::execute(config, &containers).await?,
        Commands::List => commands::list::execute(config).await?,
        Commands::Validate { file } => commands::validate::execute(&file).await?,
    }
    Ok(0)
}
