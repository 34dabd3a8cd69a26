// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The container model owned by the orchestration layer.
//!
//! A `Container` is only mutated while its `tokio::sync::Mutex` is held; the
//! daemon never hands out the inner value any other way.

mod config;
mod images;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use config::{
    ContainerConfig, IpcMode, Link, NetworkSettings, RestartPolicy, VolumeMount,
    DEFAULT_NETWORK_MODE,
};
pub use images::ImagePathRegistry;
pub use state::{ContainerState, FAILED_EXIT_CODE, STOPPED_EXIT_CODE};

use crate::monitor::RestoreMonitor;
use crate::prepare::RunCommand;
use crate::types::{ContainerId, ContainerName, ImageId};

/// Name of the root filesystem directory under a container root.
pub const ROOTFS_DIR: &str = "rootfs";

/// A container and everything the orchestrators track about it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    pub id: ContainerId,
    pub name: ContainerName,
    /// Currently active filesystem image.
    pub image_id: Option<ImageId>,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub state: ContainerState,
    /// Checkpoint image directory -> image committed after that checkpoint.
    #[serde(default)]
    pub checkpoint_images: ImagePathRegistry,
    /// Private per-container directory; derived from the state root on load.
    #[serde(skip)]
    pub root: PathBuf,
    /// Runnable command descriptor built during restore.
    #[serde(skip)]
    pub command: Option<RunCommand>,
    /// Active restore monitor, present while a restored process is supervised.
    #[serde(skip)]
    pub monitor: Option<Arc<RestoreMonitor>>,
}

impl Container {
    pub fn new(id: ContainerId, name: ContainerName, root: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name,
            image_id: None,
            config: ContainerConfig::default(),
            state: ContainerState::default(),
            checkpoint_images: ImagePathRegistry::new(),
            root: root.into(),
            command: None,
            monitor: None,
        }
    }

    pub fn rootfs(&self) -> PathBuf {
        self.root.join(ROOTFS_DIR)
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_checkpointed(&self) -> bool {
        self.state.checkpointed
    }

    pub fn has_been_checkpointed(&self) -> bool {
        self.state.has_been_checkpointed()
    }

    /// Owned view of the container handed to collaborators and background tasks.
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            id: self.id.clone(),
            name: self.name.clone(),
            root: self.root.clone(),
            rootfs: self.rootfs(),
            pid: self.state.pid,
            network: self.config.network.clone(),
            volumes: self.config.volumes.clone(),
            command: self.command.clone(),
        }
    }

    /// Whether `monitor` is the container's current monitor.
    pub fn is_current_monitor(&self, monitor: &Arc<RestoreMonitor>) -> bool {
        self.monitor
            .as_ref()
            .map(|current| Arc::ptr_eq(current, monitor))
            .unwrap_or(false)
    }
}

/// Snapshot of the fields collaborators need to act on a container.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub id: ContainerId,
    pub name: ContainerName,
    pub root: PathBuf,
    pub rootfs: PathBuf,
    pub pid: Option<u32>,
    pub network: NetworkSettings,
    pub volumes: Vec<VolumeMount>,
    pub command: Option<RunCommand>,
}

impl ContainerHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_container_defaults() {
        let c = Container::new(
            ContainerId::new("abc").unwrap(),
            ContainerName::new("web").unwrap(),
            "/var/lib/stasis/containers/abc",
        );
        assert!(!c.is_running());
        assert!(!c.is_checkpointed());
        assert!(!c.has_been_checkpointed());
        assert_eq!(
            c.rootfs(),
            PathBuf::from("/var/lib/stasis/containers/abc/rootfs")
        );
        assert!(c.monitor.is_none());
    }

    #[test]
    fn test_persisted_form_skips_runtime_fields() {
        let mut c = Container::new(
            ContainerId::new("abc").unwrap(),
            ContainerName::new("web").unwrap(),
            "/somewhere",
        );
        c.state.running = true;
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("somewhere"));
        assert!(json.contains("\"Running\":true"));

        let back: Container = serde_json::from_str(&json).unwrap();
        assert!(back.is_running());
        assert_eq!(back.root, PathBuf::new());
    }
}
