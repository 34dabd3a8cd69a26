// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `stasis restore` command - Restore a container and supervise it.
//!
//! The restored tree is a child of this process, so the command stays in the
//! foreground until the process exits or Ctrl+C is pressed. Ctrl+C kills the
//! restored tree and records the stop before returning.

use std::path::Path;

use stasis_core::SnapshotOptions;

use super::open_daemon;

/// Returns the restored process's exit code.
pub async fn execute(
    config: Option<&Path>,
    container: &str,
    opts: &SnapshotOptions,
    force: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let daemon = open_daemon(config)?;

    daemon.restore(container, opts, force).await?;
    println!("{}", container);

    let exit_code = tokio::select! {
        exit_code = daemon.wait(container) => exit_code?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(container = %container, "Interrupted, stopping restored container");
            daemon.stop(container).await?
        }
    };

    tracing::info!(container = %container, exit_code = exit_code, "Restored container exited");
    Ok(exit_code)
}
