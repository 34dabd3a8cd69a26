// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Root filesystem and volume mount boundary.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::container::ContainerHandle;
use crate::error::SetupError;

/// A bind mount attached to the runnable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub read_only: bool,
}

/// Mount subsystem consumed by the resource preparer.
#[async_trait]
pub trait MountManager: Send + Sync + 'static {
    /// Make the container root filesystem available; returns its path.
    async fn mount_rootfs(&self, container: &ContainerHandle) -> Result<PathBuf, SetupError>;

    /// Release the reference taken by `mount_rootfs`.
    async fn unmount_rootfs(&self, container: &ContainerHandle) -> Result<(), SetupError>;

    /// Volume mounts to attach to the command.
    fn volume_mounts(&self, container: &ContainerHandle) -> Result<Vec<Mount>, SetupError>;
}

/// Mount manager for root filesystems that already live on local disk.
///
/// Mounting verifies the rootfs directory exists; volume sources must exist.
#[derive(Debug, Clone, Default)]
pub struct LocalMounts;

#[async_trait]
impl MountManager for LocalMounts {
    async fn mount_rootfs(&self, container: &ContainerHandle) -> Result<PathBuf, SetupError> {
        if !container.rootfs.is_dir() {
            return Err(SetupError::RootfsMissing {
                path: container.rootfs.clone(),
            });
        }
        Ok(container.rootfs.clone())
    }

    async fn unmount_rootfs(&self, _container: &ContainerHandle) -> Result<(), SetupError> {
        Ok(())
    }

    fn volume_mounts(&self, container: &ContainerHandle) -> Result<Vec<Mount>, SetupError> {
        container
            .volumes
            .iter()
            .map(|volume| {
                if !volume.source.exists() {
                    return Err(SetupError::MountFailed {
                        reason: format!("volume source {} does not exist", volume.source.display()),
                    });
                }
                Ok(Mount {
                    source: volume.source.clone(),
                    destination: volume.destination.clone(),
                    read_only: volume.read_only,
                })
            })
            .collect()
    }
}
