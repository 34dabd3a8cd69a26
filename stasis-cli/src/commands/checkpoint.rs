// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `stasis checkpoint` command - Checkpoint one or more containers.
//!
//! Every container is attempted; the command fails if any of them failed.

use std::path::Path;

use stasis_core::SnapshotOptions;

use super::{open_daemon, CliError};

pub async fn execute(
    config: Option<&Path>,
    containers: &[String],
    opts: &SnapshotOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let daemon = open_daemon(config)?;

    let mut failed = 0;
    for name in containers {
        match daemon.checkpoint(name, opts).await {
            Ok(()) => println!("{}", name),
            Err(e) => {
                eprintln!("Error: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::CheckpointFailed {
            failed,
            total: containers.len(),
        }
        .into());
    }

    Ok(())
}
