// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `stasis list` command - List known containers.

use std::path::Path;

use super::open_daemon;

pub async fn execute(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let daemon = open_daemon(config)?;
    let containers = daemon.list().await;

    if containers.is_empty() {
        println!("No containers.");
        return Ok(());
    }

    println!("{:<14} {:<24} {:<14} IMAGE", "ID", "NAME", "STATUS");
    for c in &containers {
        let image = c
            .image
            .as_ref()
            .map(|i| i.digest()[..12].to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<14} {:<24} {:<14} {}", c.id, c.name, c.status, image);
    }
    println!();
    println!("Total: {} container(s)", containers.len());

    Ok(())
}
