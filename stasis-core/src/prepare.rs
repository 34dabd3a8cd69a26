// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Resource preparer.
//!
//! Builds the runtime environment a restored process needs, one step at a
//! time, in this order:
//!
//! 1. checkpoint image and work directories
//! 2. root filesystem mount
//! 3. network endpoint and fresh host-side interface names
//! 4. linked-container environment
//! 5. working directory
//! 6. process environment and command descriptor
//! 7. IPC directory
//! 8. final mount list
//!
//! Every step that acquires something pushes the matching compensation onto
//! a [`Rollback`]. The preparer never undoes its own work; the restore
//! orchestrator runs the rollback if anything after it fails.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::container::{Container, ContainerHandle, IpcMode};
use crate::error::{SetupError, SetupStep, StasisError, StasisResult};
use crate::mounts::Mount;
use crate::network::generate_interface_name;
use crate::options::{SnapshotOptions, VethPair};
use crate::runtime::Runtime;
use crate::types::ContainerId;

/// Default `PATH` for restored processes.
pub const DEFAULT_PATH_ENV: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Directory under the container root backing a private `/dev/shm`.
pub const SHM_DIR: &str = "shm";

const SHM_DESTINATION: &str = "/dev/shm";

/// Runnable command descriptor for the restored process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCommand {
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: PathBuf,
    pub hostname: String,
    pub ipc: IpcMode,
    pub mounts: Vec<Mount>,
}

/// A compensating action for one acquired resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    UnmountRootfs,
    ReleaseNetwork,
    RemoveDir(PathBuf),
}

/// Ordered compensations, run newest first.
#[derive(Debug, Default)]
pub struct Rollback {
    actions: Vec<Compensation>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Compensation] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every compensation in reverse acquisition order.
    ///
    /// Failures are logged and do not stop the remaining actions.
    pub async fn run(self, runtime: &Runtime, container: &ContainerHandle) {
        for action in self.actions.into_iter().rev() {
            tracing::warn!(container = %container.id, action = ?action, "Rolling back");
            let result = match &action {
                Compensation::UnmountRootfs => runtime.mounts.unmount_rootfs(container).await,
                Compensation::ReleaseNetwork => runtime.network.release(container).await,
                Compensation::RemoveDir(path) => {
                    std::fs::remove_dir_all(path).map_err(|source| SetupError::Io {
                        context: "remove directory",
                        source,
                    })
                }
            };
            if let Err(e) = result {
                tracing::warn!(
                    container = %container.id,
                    action = ?action,
                    error = %e,
                    "Compensating action failed"
                );
            }
        }
    }
}

fn fail(container: &ContainerId, step: SetupStep) -> impl FnOnce(SetupError) -> StasisError + '_ {
    move |source| {
        tracing::error!(container = %container, step = %step, error = %source, "Restore setup failed");
        StasisError::Setup {
            container: container.clone(),
            step,
            source,
        }
    }
}

fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> SetupError {
    move |source| SetupError::Io { context, source }
}

/// Create `path` if missing. Returns whether it was created.
fn ensure_dir(path: &Path) -> Result<bool, SetupError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(SetupError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        return Ok(false);
    }
    std::fs::create_dir_all(path).map_err(io("create directory"))?;
    Ok(true)
}

/// Create the resolved image and work directories. Pre-existing is fine.
pub fn create_snapshot_dirs(opts: &SnapshotOptions) -> Result<(), SetupError> {
    std::fs::create_dir_all(opts.images_dir()).map_err(io("create images directory"))?;
    std::fs::create_dir_all(opts.work_dir()).map_err(io("create work directory"))?;
    Ok(())
}

/// Check the restore source and create the work directory.
///
/// The images directory is never created on restore; it must already hold
/// a checkpoint.
pub fn restore_snapshot_dirs(opts: &SnapshotOptions) -> Result<(), SetupError> {
    let images = opts.images_dir();
    if !images.is_dir() {
        return Err(SetupError::ImagesMissing {
            path: images.to_path_buf(),
        });
    }
    std::fs::create_dir_all(opts.work_dir()).map_err(io("create work directory"))?;
    Ok(())
}

/// Merge environment layers; a later layer overrides an earlier key in place.
fn merge_env<'a>(layers: impl IntoIterator<Item = &'a String>) -> Result<Vec<String>, SetupError> {
    let mut order: Vec<String> = Vec::new();
    let mut values: BTreeMap<String, String> = BTreeMap::new();

    for entry in layers {
        let key = entry.split_once('=').map(|(k, _)| k).unwrap_or(entry);
        if key.is_empty() {
            return Err(SetupError::InvalidEnv {
                entry: entry.clone(),
            });
        }
        if values.insert(key.to_string(), entry.clone()).is_none() {
            order.push(key.to_string());
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| values.remove(&key))
        .collect())
}

/// Prepare everything the restored process needs.
///
/// Returns the options to hand to the snapshot engine, carrying the freshly
/// generated interface pairs. `opts` must already be resolved.
pub async fn prepare(
    runtime: &Runtime,
    container: &mut Container,
    opts: &SnapshotOptions,
    rollback: &mut Rollback,
) -> StasisResult<SnapshotOptions> {
    let id = container.id.clone();

    restore_snapshot_dirs(opts).map_err(fail(&id, SetupStep::Directories))?;

    tracing::debug!(container = %id, "Mounting root filesystem");
    let rootfs = runtime
        .mounts
        .mount_rootfs(&container.handle())
        .await
        .map_err(fail(&id, SetupStep::Mount))?;
    rollback.push(Compensation::UnmountRootfs);

    tracing::debug!(container = %id, "Attaching network");
    let pairs = attach_network(runtime, container, rollback)
        .await
        .map_err(fail(&id, SetupStep::Network))?;

    tracing::debug!(container = %id, links = container.config.links.len(), "Resolving links");
    let link_env = runtime
        .links
        .link_env(&container.name, &container.config.links)
        .map_err(fail(&id, SetupStep::Links))?;

    let working_dir = container
        .config
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("/"));
    let host_working_dir = rootfs.join(working_dir.strip_prefix("/").unwrap_or(&working_dir));
    if ensure_dir(&host_working_dir).map_err(fail(&id, SetupStep::WorkingDirectory))? {
        rollback.push(Compensation::RemoveDir(host_working_dir));
    }

    let hostname = if container.config.hostname.is_empty() {
        container.id.short().to_string()
    } else {
        container.config.hostname.clone()
    };
    let defaults = [
        format!("PATH={}", DEFAULT_PATH_ENV),
        format!("HOSTNAME={}", hostname),
    ];
    let env = merge_env(
        defaults
            .iter()
            .chain(link_env.iter())
            .chain(container.config.env.iter()),
    )
    .map_err(fail(&id, SetupStep::Command))?;

    let ipc = container.config.ipc_mode.clone();
    let mut ipc_mounts = Vec::new();
    if !ipc.is_host() && !ipc.is_container() {
        let shm = container.root.join(SHM_DIR);
        if ensure_dir(&shm).map_err(fail(&id, SetupStep::Ipc))? {
            rollback.push(Compensation::RemoveDir(shm.clone()));
        }
        ipc_mounts.push(Mount {
            source: shm,
            destination: PathBuf::from(SHM_DESTINATION),
            read_only: false,
        });
    }

    let mut mounts = runtime
        .mounts
        .volume_mounts(&container.handle())
        .map_err(fail(&id, SetupStep::Mounts))?;
    mounts.extend(ipc_mounts);

    container.command = Some(RunCommand {
        entrypoint: container.config.entrypoint.clone(),
        env,
        working_dir,
        hostname,
        ipc,
        mounts,
    });

    tracing::debug!(
        container = %id,
        veth_pairs = pairs.len(),
        compensations = rollback.actions().len(),
        "Restore resources prepared"
    );

    Ok(opts.with_veth_pairs(pairs))
}

async fn attach_network(
    runtime: &Runtime,
    container: &mut Container,
    rollback: &mut Rollback,
) -> Result<Vec<VethPair>, SetupError> {
    container.config.network = container.config.network.clone().with_default_mode();
    if !container.config.network.is_sandboxed() {
        return Ok(Vec::new());
    }

    let attachment = runtime.network.initialize(&container.handle()).await?;
    rollback.push(Compensation::ReleaseNetwork);
    container.config.network.network_id = attachment.network_id.clone();
    container.config.network.endpoint_id = attachment.endpoint_id.clone();

    // Names are generated only after the endpoint is attached.
    let endpoint = runtime
        .network
        .resolve_endpoint(&attachment.network_id, &attachment.endpoint_id)
        .await?;

    let settings = &runtime.settings;
    endpoint
        .sandbox_interfaces()
        .iter()
        .map(|iface| -> Result<VethPair, SetupError> {
            Ok(VethPair {
                inside: iface.name().to_string(),
                outside: generate_interface_name(
                    &settings.interface_prefix,
                    settings.interface_name_length,
                )?,
            })
        })
        .collect()
}

/// Release what a running container holds: network, rootfs and shm.
pub async fn release_resources(runtime: &Runtime, container: &ContainerHandle) {
    if let Err(e) = runtime.network.release(container).await {
        tracing::warn!(container = %container.id, error = %e, "Failed to release network");
    }
    if let Err(e) = runtime.mounts.unmount_rootfs(container).await {
        tracing::warn!(container = %container.id, error = %e, "Failed to unmount rootfs");
    }
    let shm = container.root().join(SHM_DIR);
    if shm.exists() {
        if let Err(e) = std::fs::remove_dir_all(&shm) {
            tracing::warn!(container = %container.id, error = %e, "Failed to remove shm directory");
        }
    }
    tracing::debug!(container = %container.id, "Runtime resources released");
}
