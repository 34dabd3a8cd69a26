// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container table and upward entry points.
//!
//! The table maps ids and names to per-container slots using DashMap. A slot
//! is cloned out of the table before its lock is awaited, so no shard lock is
//! ever held across an await.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::checkpoint;
use crate::config::Config;
use crate::container::Container;
use crate::engine::CriuEngine;
use crate::error::{StasisError, StasisResult};
use crate::events::ContainerEvent;
use crate::layer::DirectoryLayerStore;
use crate::mounts::LocalMounts;
use crate::network::LocalNetwork;
use crate::options::SnapshotOptions;
use crate::restore;
use crate::runtime::{ContainerSlot, Runtime, RuntimeSettings};
use crate::store::StateStore;
use crate::types::{ContainerId, ImageId};

/// Detailed view of one container.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub status: &'static str,
    pub running: bool,
    pub checkpointed: bool,
    /// RFC 3339 time of the last successful checkpoint.
    pub checkpointed_at: Option<String>,
    pub pid: Option<u32>,
    pub exit_code: i32,
    pub error: Option<String>,
    pub image: Option<ImageId>,
    pub checkpoint_images: Vec<CheckpointImage>,
}

/// One checkpoint image directory and the filesystem image committed with it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckpointImage {
    pub path: String,
    pub image: ImageId,
}

/// One row of `list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: &'static str,
    pub image: Option<ImageId>,
}

/// Orchestration daemon owning every container.
#[derive(Debug)]
pub struct Daemon {
    runtime: Arc<Runtime>,
    containers: DashMap<ContainerId, ContainerSlot>,
    names: DashMap<String, ContainerId>,
}

impl Daemon {
    /// Open the daemon described by `config` with the local collaborators.
    pub fn open(config: &Config) -> StasisResult<Self> {
        std::fs::create_dir_all(&config.daemon.state_root).map_err(|e| StasisError::Io {
            context: "creating state root",
            source: e,
        })?;

        let runtime = Runtime::new(
            Arc::new(CriuEngine::lazy(config.daemon.criu_path.clone())),
            Arc::new(DirectoryLayerStore::new(&config.daemon.layers_dir)),
            Arc::new(LocalNetwork::new()),
            Arc::new(LocalMounts),
            StateStore::new(&config.daemon.state_root),
        )
        .with_settings(RuntimeSettings::from(config));

        let daemon = Self::with_runtime(runtime);
        let count = daemon.load()?;

        tracing::info!(
            state_root = %config.daemon.state_root.display(),
            containers = count,
            "Daemon opened"
        );

        Ok(daemon)
    }

    pub fn with_runtime(runtime: Runtime) -> Self {
        Self {
            runtime: Arc::new(runtime),
            containers: DashMap::new(),
            names: DashMap::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Register every container found in the state store.
    pub fn load(&self) -> StasisResult<usize> {
        let containers = self.runtime.store.load_all()?;
        let count = containers.len();
        for container in containers {
            self.register(container)?;
        }
        Ok(count)
    }

    /// Add a container to the table.
    pub fn register(&self, mut container: Container) -> StasisResult<ContainerSlot> {
        let name = container.name.to_string();
        if self.names.contains_key(&name) {
            return Err(StasisError::NameInUse(name));
        }
        if container.root.as_os_str().is_empty() {
            container.root = self.runtime.store.container_root(&container.id);
        }

        self.runtime.links.publish(&container);

        let id = container.id.clone();
        let slot: ContainerSlot = Arc::new(Mutex::new(container));
        self.names.insert(name, id.clone());
        self.containers.insert(id.clone(), Arc::clone(&slot));

        tracing::debug!(container = %id, "Container registered");
        Ok(slot)
    }

    /// Look up by name, full id, or unique id prefix.
    pub fn get(&self, reference: &str) -> StasisResult<ContainerSlot> {
        let not_found = || StasisError::ContainerNotFound(reference.to_string());
        let name = reference.trim_start_matches('/');
        if name.is_empty() {
            return Err(not_found());
        }

        let id = match self.names.get(name) {
            Some(id) => id.value().clone(),
            None => {
                let mut matches = self
                    .containers
                    .iter()
                    .filter(|e| e.key().as_str().starts_with(reference))
                    .map(|e| e.key().clone());
                let first = matches.next().ok_or_else(not_found)?;
                if matches.next().is_some() {
                    return Err(StasisError::AmbiguousReference(reference.to_string()));
                }
                first
            }
        };

        self.containers
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(not_found)
    }

    pub async fn checkpoint(&self, reference: &str, opts: &SnapshotOptions) -> StasisResult<()> {
        let slot = self.get(reference)?;
        checkpoint::checkpoint(&self.runtime, &slot, opts).await
    }

    pub async fn restore(
        &self,
        reference: &str,
        opts: &SnapshotOptions,
        force: bool,
    ) -> StasisResult<()> {
        let slot = self.get(reference)?;
        restore::restore(&self.runtime, &slot, opts, force).await
    }

    /// Stop the container's process and return the recorded exit code.
    pub async fn stop(&self, reference: &str) -> StasisResult<i32> {
        let slot = self.get(reference)?;
        restore::stop(&self.runtime, &slot).await
    }

    pub async fn inspect(&self, reference: &str) -> StasisResult<ContainerInspect> {
        let slot = self.get(reference)?;
        let container = slot.lock().await;
        let state = &container.state;

        Ok(ContainerInspect {
            id: container.id.to_string(),
            name: container.name.to_string(),
            status: state.status(),
            running: state.running,
            checkpointed: state.checkpointed,
            checkpointed_at: state.checkpointed_at.map(|t| t.to_rfc3339()),
            pid: state.pid,
            exit_code: state.exit_code,
            error: state.error.clone(),
            image: container.image_id.clone(),
            checkpoint_images: container
                .checkpoint_images
                .iter()
                .map(|(path, image)| CheckpointImage {
                    path: path.display().to_string(),
                    image: image.clone(),
                })
                .collect(),
        })
    }

    /// All containers, sorted by name.
    pub async fn list(&self) -> Vec<ContainerSummary> {
        let slots: Vec<ContainerSlot> = self
            .containers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            let container = slot.lock().await;
            summaries.push(ContainerSummary {
                id: container.id.short().to_string(),
                name: container.name.to_string(),
                status: container.state.status(),
                image: container.image_id.clone(),
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Wait for the supervised process to exit and return its exit code.
    ///
    /// Resolves once the exit has been recorded on the container. Returns the
    /// recorded exit code at once when nothing is supervised.
    pub async fn wait(&self, reference: &str) -> StasisResult<i32> {
        let slot = self.get(reference)?;
        let monitor = {
            let container = slot.lock().await;
            match &container.monitor {
                Some(monitor) => Arc::clone(monitor),
                None => return Ok(container.state.exit_code),
            }
        };
        monitor.settled().await;
        Ok(monitor.exited().await)
    }

    pub fn events(&self) -> broadcast::Receiver<ContainerEvent> {
        self.runtime.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
