// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod checkpoint;
pub mod inspect;
pub mod list;
pub mod metrics;
pub mod restore;
pub mod validate;

use std::path::Path;

use stasis_core::{ConfigLoader, Daemon};
use thiserror::Error;

/// Failures reported by the CLI itself rather than by the orchestrator.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to checkpoint {failed} of {total} container(s)")]
    CheckpointFailed { failed: usize, total: usize },
}

/// Load the configuration and open the daemon state it points at.
pub fn open_daemon(config: Option<&Path>) -> Result<Daemon, Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(config)?;
    Ok(Daemon::open(&config)?)
}
