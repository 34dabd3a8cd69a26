// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Static container configuration used to rebuild a runtime environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Container configuration as persisted at create time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    pub hostname: String,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub ipc_mode: IpcMode,
    pub network: NetworkSettings,
    pub links: Vec<Link>,
    pub volumes: Vec<VolumeMount>,
    pub restart_policy: RestartPolicy,
}

impl ContainerConfig {
    /// Environment as key/value pairs; entries without `=` map to empty.
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|kv| match kv.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (kv.clone(), String::new()),
            })
            .collect()
    }
}

/// How the container's IPC namespace is provided.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpcMode {
    /// Private namespace with a container-owned `/dev/shm`.
    #[default]
    Private,
    /// Share the host IPC namespace.
    Host,
    /// Join another container's IPC namespace.
    Container(String),
}

impl IpcMode {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }
}

impl fmt::Display for IpcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => f.write_str("private"),
            Self::Host => f.write_str("host"),
            Self::Container(name) => write!(f, "container:{}", name),
        }
    }
}

impl FromStr for IpcMode {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "private" => Ok(Self::Private),
            "host" => Ok(Self::Host),
            other => match other.strip_prefix("container:") {
                Some(name) if !name.is_empty() => Ok(Self::Container(name.to_string())),
                _ => Err(HardValidationError::InvalidFieldValue {
                    field: "ipc_mode",
                    value: other.to_string(),
                    reason: "Expected private, host or container:<name>".to_string(),
                }),
            },
        }
    }
}

impl TryFrom<String> for IpcMode {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpcMode> for String {
    fn from(mode: IpcMode) -> Self {
        mode.to_string()
    }
}

/// Network attachment recorded for the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSettings {
    /// Network mode; blank is normalised to `bridge`.
    pub mode: String,
    pub network_id: String,
    pub endpoint_id: String,
    /// Interface names inside the sandbox, e.g. `eth0`.
    pub interfaces: Vec<String>,
    pub ip_address: Option<String>,
    pub exposed_ports: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            mode: DEFAULT_NETWORK_MODE.to_string(),
            network_id: String::new(),
            endpoint_id: String::new(),
            interfaces: Vec::new(),
            ip_address: None,
            exposed_ports: Vec::new(),
        }
    }
}

/// Network mode applied when none is configured.
pub const DEFAULT_NETWORK_MODE: &str = "bridge";

impl NetworkSettings {
    /// Keep older configs that left the mode blank working.
    pub fn with_default_mode(mut self) -> Self {
        if self.mode.is_empty() {
            self.mode = DEFAULT_NETWORK_MODE.to_string();
        }
        self
    }

    /// Namespaces without their own endpoint (`none`, `host`, `container:*`).
    pub fn is_sandboxed(&self) -> bool {
        !(self.mode == "none" || self.mode == "host" || self.mode.starts_with("container:"))
    }
}

/// Link to another container under an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Link {
    pub name: String,
    pub alias: String,
}

/// A host path bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeMount {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub read_only: bool,
}

/// Restart policy consulted when a supervised process exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    UnlessStopped,
    OnFailure { max_retries: u32 },
}

impl RestartPolicy {
    /// Whether the supervisor should restart after this exit.
    ///
    /// `max_retries` of zero means unlimited.
    pub fn should_restart(&self, exit_code: i32, restart_count: u32, stopped_by_user: bool) -> bool {
        match *self {
            Self::No => false,
            Self::Always => true,
            Self::UnlessStopped => !stopped_by_user,
            Self::OnFailure { max_retries } => {
                exit_code != 0 && (max_retries == 0 || restart_count < max_retries)
            }
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => f.write_str("no"),
            Self::Always => f.write_str("always"),
            Self::UnlessStopped => f.write_str("unless-stopped"),
            Self::OnFailure { max_retries: 0 } => f.write_str("on-failure"),
            Self::OnFailure { max_retries } => write!(f, "on-failure:{}", max_retries),
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| HardValidationError::InvalidFieldValue {
            field: "restart_policy",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        match s {
            "" | "no" => Ok(Self::No),
            "always" => Ok(Self::Always),
            "unless-stopped" => Ok(Self::UnlessStopped),
            "on-failure" => Ok(Self::OnFailure { max_retries: 0 }),
            other => {
                let count = other
                    .strip_prefix("on-failure:")
                    .ok_or_else(|| invalid("Unknown restart policy"))?;
                let max_retries = count
                    .parse::<u32>()
                    .map_err(|_| invalid("Retry count must be a non-negative integer"))?;
                Ok(Self::OnFailure { max_retries })
            }
        }
    }
}

impl TryFrom<String> for RestartPolicy {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RestartPolicy> for String {
    fn from(policy: RestartPolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_mode_parse() {
        assert_eq!("".parse::<IpcMode>().unwrap(), IpcMode::Private);
        assert_eq!("host".parse::<IpcMode>().unwrap(), IpcMode::Host);
        let mode: IpcMode = "container:db".parse().unwrap();
        assert!(mode.is_container());
        assert_eq!(mode.to_string(), "container:db");
        assert!("container:".parse::<IpcMode>().is_err());
        assert!("shareable".parse::<IpcMode>().is_err());
    }

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!("no".parse::<RestartPolicy>().unwrap(), RestartPolicy::No);
        assert_eq!(
            "on-failure:3".parse::<RestartPolicy>().unwrap(),
            RestartPolicy::OnFailure { max_retries: 3 }
        );
        assert!("on-failure:x".parse::<RestartPolicy>().is_err());
        assert!("sometimes".parse::<RestartPolicy>().is_err());
    }

    #[test]
    fn test_restart_policy_decisions() {
        assert!(!RestartPolicy::No.should_restart(1, 0, false));
        assert!(RestartPolicy::Always.should_restart(0, 10, true));
        assert!(!RestartPolicy::UnlessStopped.should_restart(0, 0, true));
        let on_failure = RestartPolicy::OnFailure { max_retries: 2 };
        assert!(!on_failure.should_restart(0, 0, false));
        assert!(on_failure.should_restart(1, 1, false));
        assert!(!on_failure.should_restart(1, 2, false));
        assert!(RestartPolicy::OnFailure { max_retries: 0 }.should_restart(1, 99, false));
    }

    #[test]
    fn test_env_map() {
        let config = ContainerConfig {
            env: vec!["PATH=/usr/bin".to_string(), "EMPTY".to_string(), "A=b=c".to_string()],
            ..Default::default()
        };
        let env = config.env_map();
        assert_eq!(env["PATH"], "/usr/bin");
        assert_eq!(env["EMPTY"], "");
        assert_eq!(env["A"], "b=c");
    }

    #[test]
    fn test_network_defaults() {
        let settings = NetworkSettings {
            mode: String::new(),
            ..Default::default()
        }
        .with_default_mode();
        assert_eq!(settings.mode, "bridge");
        assert!(settings.is_sandboxed());
        let host = NetworkSettings {
            mode: "host".to_string(),
            ..Default::default()
        };
        assert!(!host.is_sandboxed());
    }
}
