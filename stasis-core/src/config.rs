// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML daemon configuration with strict validation.
//!
//! Every field has a default, so an empty file (or no file at the default
//! location) yields a working configuration. Invalid values are rejected
//! with a `HardValidationError` before the daemon opens any state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, StasisError, StasisResult};
use crate::network::MAX_INTERFACE_NAME;

/// Configuration file read when none is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/stasis/stasis.yaml";

pub const DEFAULT_INTERFACE_PREFIX: &str = "veth";
pub const DEFAULT_INTERFACE_NAME_LENGTH: usize = 7;

/// Layer directory name under the state root.
const LAYERS_DIR: &str = "layers";

/// Raw daemon section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDaemonConfig {
    #[serde(default = "default_state_root")]
    state_root: String,
    #[serde(default)]
    layers_dir: Option<String>,
    #[serde(default)]
    criu_path: Option<String>,
    #[serde(default)]
    restore_timeout_ms: u64,
}

fn default_state_root() -> String {
    "/var/lib/stasis".to_string()
}

impl Default for RawDaemonConfig {
    fn default() -> Self {
        Self {
            state_root: default_state_root(),
            layers_dir: None,
            criu_path: None,
            restore_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetworkConfig {
    #[serde(default = "default_interface_prefix")]
    interface_prefix: String,
    #[serde(default = "default_interface_name_length")]
    interface_name_length: usize,
}

fn default_interface_prefix() -> String {
    DEFAULT_INTERFACE_PREFIX.to_string()
}

fn default_interface_name_length() -> usize {
    DEFAULT_INTERFACE_NAME_LENGTH
}

impl Default for RawNetworkConfig {
    fn default() -> Self {
        Self {
            interface_prefix: default_interface_prefix(),
            interface_name_length: default_interface_name_length(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    daemon: RawDaemonConfig,
    #[serde(default)]
    network: RawNetworkConfig,
}

/// Validated daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub state_root: PathBuf,
    pub layers_dir: PathBuf,
    /// Explicit CRIU binary; searched for when absent.
    pub criu_path: Option<PathBuf>,
    /// `None` waits for restore completion without a deadline.
    pub restore_timeout: Option<Duration>,
}

/// Validated network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub interface_prefix: String,
    pub interface_name_length: usize,
}

/// Complete validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        // The raw defaults always validate.
        let daemon = RawDaemonConfig::default();
        let state_root = PathBuf::from(daemon.state_root);
        Self {
            daemon: DaemonConfig {
                layers_dir: state_root.join(LAYERS_DIR),
                state_root,
                criu_path: None,
                restore_timeout: None,
            },
            network: NetworkConfig {
                interface_prefix: default_interface_prefix(),
                interface_name_length: default_interface_name_length(),
            },
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> StasisResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(StasisError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| StasisError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load `path` if given; otherwise the default location, falling back to
    /// built-in defaults when that file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> StasisResult<Config> {
        match path {
            Some(path) => Self::load_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load_file(DEFAULT_CONFIG_PATH),
            None => {
                tracing::debug!(path = DEFAULT_CONFIG_PATH, "No config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> StasisResult<Config> {
        // An empty document parses as null rather than an empty mapping.
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| StasisError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> StasisResult<Config> {
        Ok(Config {
            daemon: Self::validate_daemon(raw.daemon)?,
            network: Self::validate_network(raw.network)?,
        })
    }

    fn validate_daemon(raw: RawDaemonConfig) -> StasisResult<DaemonConfig> {
        let state_root = absolute_path("state_root", &raw.state_root)?;

        let layers_dir = match raw.layers_dir {
            Some(dir) => absolute_path("layers_dir", &dir)?,
            None => state_root.join(LAYERS_DIR),
        };

        let criu_path = match raw.criu_path {
            Some(path) => Some(absolute_path("criu_path", &path)?),
            None => None,
        };

        // One hour; anything longer is a misconfiguration, not a deadline.
        const MAX_RESTORE_TIMEOUT_MS: u64 = 3_600_000;
        if raw.restore_timeout_ms > MAX_RESTORE_TIMEOUT_MS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "restore_timeout_ms",
                value: raw.restore_timeout_ms.to_string(),
                reason: format!("Must not exceed {}ms (0 disables the deadline)", MAX_RESTORE_TIMEOUT_MS),
            }
            .into());
        }
        let restore_timeout =
            (raw.restore_timeout_ms > 0).then(|| Duration::from_millis(raw.restore_timeout_ms));

        Ok(DaemonConfig {
            state_root,
            layers_dir,
            criu_path,
            restore_timeout,
        })
    }

    fn validate_network(raw: RawNetworkConfig) -> StasisResult<NetworkConfig> {
        if raw.interface_prefix.is_empty()
            || !raw
                .interface_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "interface_prefix",
                value: raw.interface_prefix,
                reason: "Must be non-empty and contain only [a-zA-Z0-9_-]".to_string(),
            }
            .into());
        }

        let room = MAX_INTERFACE_NAME.saturating_sub(raw.interface_prefix.len());
        if raw.interface_name_length == 0 || raw.interface_name_length > room {
            return Err(HardValidationError::InvalidFieldValue {
                field: "interface_name_length",
                value: raw.interface_name_length.to_string(),
                reason: format!(
                    "Must be between 1 and {} for prefix {:?}",
                    room, raw.interface_prefix
                ),
            }
            .into());
        }

        Ok(NetworkConfig {
            interface_prefix: raw.interface_prefix,
            interface_name_length: raw.interface_name_length,
        })
    }
}

fn absolute_path(field: &'static str, value: &str) -> StasisResult<PathBuf> {
    let path = PathBuf::from(value);
    if value.is_empty() || !path.is_absolute() {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: value.to_string(),
            reason: "Must be an absolute path".to_string(),
        }
        .into());
    }
    Ok(path)
}
