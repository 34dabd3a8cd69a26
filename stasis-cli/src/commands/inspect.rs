// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `stasis inspect` command - Print container state as JSON.

use std::path::Path;

use super::open_daemon;

pub async fn execute(
    config: Option<&Path>,
    containers: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let daemon = open_daemon(config)?;

    let mut details = Vec::with_capacity(containers.len());
    for name in containers {
        details.push(daemon.inspect(name).await?);
    }

    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}
