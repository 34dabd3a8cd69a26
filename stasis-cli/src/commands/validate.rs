// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `stasis validate` command - Validate configuration file.

use std::path::Path;

use stasis_core::ConfigLoader;

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Daemon Settings:");
            println!("  State Root:         {}", config.daemon.state_root.display());
            println!("  Layers Directory:   {}", config.daemon.layers_dir.display());
            match &config.daemon.criu_path {
                Some(path) => println!("  CRIU Binary:        {}", path.display()),
                None => println!("  CRIU Binary:        (search default locations)"),
            }
            match config.daemon.restore_timeout {
                Some(t) => println!("  Restore Timeout:    {}ms", t.as_millis()),
                None => println!("  Restore Timeout:    none"),
            }
            println!();
            println!("Network Settings:");
            println!(
                "  Interface Names:    {}<{} hex chars>",
                config.network.interface_prefix, config.network.interface_name_length
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
