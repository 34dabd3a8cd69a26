// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Network attachment boundary.
//!
//! A restored network namespace cannot reuse host-side interface names from
//! the previous process generation, so every sandbox interface gets a fresh
//! peer name from [`generate_interface_name`] during restore.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::container::ContainerHandle;
use crate::error::SetupError;
use crate::types::ContainerId;

/// Longest usable interface name (IFNAMSIZ minus the trailing NUL).
pub const MAX_INTERFACE_NAME: usize = 15;

/// Interface name used when a sandbox records none.
const DEFAULT_SANDBOX_INTERFACE: &str = "eth0";

/// Network and endpoint the container is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network_id: String,
    pub endpoint_id: String,
}

/// An interface inside the container's network namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    name: String,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Current name inside the sandbox.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A network endpoint and the sandbox interfaces it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    pub network_id: String,
    pub container: ContainerId,
    interfaces: Vec<Interface>,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        network_id: impl Into<String>,
        container: ContainerId,
        interfaces: Vec<Interface>,
    ) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            container,
            interfaces,
        }
    }

    pub fn sandbox_interfaces(&self) -> &[Interface] {
        &self.interfaces
    }
}

/// Network subsystem consumed by the resource preparer.
#[async_trait]
pub trait NetworkController: Send + Sync + 'static {
    /// Attach the container to its configured network.
    async fn initialize(&self, container: &ContainerHandle) -> Result<NetworkAttachment, SetupError>;

    async fn resolve_endpoint(
        &self,
        network_id: &str,
        endpoint_id: &str,
    ) -> Result<Endpoint, SetupError>;

    /// Detach the container and release its endpoints.
    async fn release(&self, container: &ContainerHandle) -> Result<(), SetupError>;
}

/// Generate `prefix` followed by `length` random hex characters.
pub fn generate_interface_name(prefix: &str, length: usize) -> Result<String, SetupError> {
    if length == 0 || prefix.len() + length > MAX_INTERFACE_NAME {
        return Err(SetupError::NetworkFailed {
            reason: format!(
                "interface name {}<{} chars> exceeds {} characters",
                prefix, length, MAX_INTERFACE_NAME
            ),
        });
    }

    let random = uuid::Uuid::new_v4().simple().to_string();
    Ok(format!("{}{}", prefix, &random[..length]))
}

/// In-memory endpoint table keyed by (network id, endpoint id).
///
/// Endpoints are derived from the container's recorded network settings.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    endpoints: DashMap<(String, String), Endpoint>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}

#[async_trait]
impl NetworkController for LocalNetwork {
    async fn initialize(&self, container: &ContainerHandle) -> Result<NetworkAttachment, SetupError> {
        let settings = &container.network;
        let network_id = if settings.network_id.is_empty() {
            settings.mode.clone()
        } else {
            settings.network_id.clone()
        };
        let endpoint_id = if settings.endpoint_id.is_empty() {
            container.id.to_string()
        } else {
            settings.endpoint_id.clone()
        };

        let names = if settings.interfaces.is_empty() {
            vec![DEFAULT_SANDBOX_INTERFACE.to_string()]
        } else {
            settings.interfaces.clone()
        };

        let endpoint = Endpoint::new(
            endpoint_id.clone(),
            network_id.clone(),
            container.id.clone(),
            names.into_iter().map(Interface::new).collect(),
        );
        self.endpoints
            .insert((network_id.clone(), endpoint_id.clone()), endpoint);

        tracing::debug!(
            container = %container.id,
            network = %network_id,
            endpoint = %endpoint_id,
            "Network endpoint attached"
        );

        Ok(NetworkAttachment {
            network_id,
            endpoint_id,
        })
    }

    async fn resolve_endpoint(
        &self,
        network_id: &str,
        endpoint_id: &str,
    ) -> Result<Endpoint, SetupError> {
        self.endpoints
            .get(&(network_id.to_string(), endpoint_id.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| SetupError::EndpointNotFound {
                network_id: network_id.to_string(),
                endpoint_id: endpoint_id.to_string(),
            })
    }

    async fn release(&self, container: &ContainerHandle) -> Result<(), SetupError> {
        self.endpoints.retain(|_, e| e.container != container.id);
        Ok(())
    }
}
