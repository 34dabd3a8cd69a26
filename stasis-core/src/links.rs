// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Linked-container lookup table.
//!
//! Restore of one container must read the environment of the containers it
//! links to. Taking another container's lock while holding our own would
//! order locks across containers, so each container instead publishes a
//! [`LinkInfo`] here whenever its state changes, and link resolution reads
//! the table without locking anyone.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::container::{Container, Link};
use crate::error::SetupError;
use crate::types::{ContainerId, ContainerName};

/// Variables of the linked container that are never exported to the linker.
const SKIPPED_ENV: [&str; 3] = ["HOME", "PATH", "HOSTNAME"];

/// What a linking container may see of a link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub id: ContainerId,
    pub name: ContainerName,
    pub running: bool,
    pub env: BTreeMap<String, String>,
    pub ip_address: Option<String>,
    pub exposed_ports: Vec<String>,
}

impl LinkInfo {
    pub fn from_container(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            name: container.name.clone(),
            running: container.is_running(),
            env: container.config.env_map(),
            ip_address: container.config.network.ip_address.clone(),
            exposed_ports: container.config.network.exposed_ports.clone(),
        }
    }
}

/// Published link targets keyed by container name.
#[derive(Debug, Default)]
pub struct LinkTable {
    entries: DashMap<String, LinkInfo>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current view of `container`.
    pub fn publish(&self, container: &Container) {
        self.entries
            .insert(container.name.to_string(), LinkInfo::from_container(container));
    }

    pub fn remove(&self, name: &ContainerName) {
        self.entries.remove(name.as_str());
    }

    pub fn get(&self, name: &str) -> Option<LinkInfo> {
        let name = name.trim_start_matches('/');
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Environment variables `linker` receives for its links.
    pub fn link_env(
        &self,
        linker: &ContainerName,
        links: &[Link],
    ) -> Result<Vec<String>, SetupError> {
        let mut env = Vec::new();
        for link in links {
            let target = self
                .get(&link.name)
                .ok_or_else(|| SetupError::LinkTargetMissing {
                    name: link.name.clone(),
                })?;
            if !target.running {
                return Err(SetupError::LinkTargetNotRunning {
                    name: link.name.clone(),
                });
            }
            env.extend(env_for_link(linker, link, &target));
        }
        Ok(env)
    }
}

fn env_prefix(alias: &str) -> String {
    alias
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn env_for_link(linker: &ContainerName, link: &Link, target: &LinkInfo) -> Vec<String> {
    let prefix = env_prefix(&link.alias);
    let mut env = vec![format!("{}_NAME=/{}/{}", prefix, linker, link.alias)];

    if let Some(ip) = &target.ip_address {
        for port in &target.exposed_ports {
            let (number, proto) = port.split_once('/').unwrap_or((port.as_str(), "tcp"));
            let key = format!("{}_PORT_{}_{}", prefix, number, proto.to_ascii_uppercase());
            env.push(format!("{}={}://{}:{}", key, proto, ip, number));
            env.push(format!("{}_ADDR={}", key, ip));
            env.push(format!("{}_PORT={}", key, number));
            env.push(format!("{}_PROTO={}", key, proto));
        }
    }

    for (key, value) in &target.env {
        if SKIPPED_ENV.contains(&key.as_str()) {
            continue;
        }
        env.push(format!("{}_ENV_{}={}", prefix, key, value));
    }

    env
}
