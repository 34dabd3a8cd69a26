// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-invocation snapshot options.
//!
//! One `SnapshotOptions` value describes a single checkpoint or restore call.
//! Defaults are filled by [`SnapshotOptions::resolve`], which returns a new
//! value and never mutates the caller's copy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory name for captured process images under a container root.
pub const DEFAULT_IMAGES_DIR: &str = "criu.image";

/// Directory name for snapshot engine work files and logs.
pub const DEFAULT_WORK_DIR: &str = "criu.work";

/// Options recognised by checkpoint and restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SnapshotOptions {
    /// Directory holding the captured process images.
    pub images_directory: Option<PathBuf>,
    /// Images from a previous dump, enabling incremental capture.
    pub previous_images_directory: Option<PathBuf>,
    /// Directory for engine work files and logs.
    pub work_directory: Option<PathBuf>,
    /// Keep the container running after a successful checkpoint.
    pub leave_running: bool,
    /// Permit snapshotting established TCP connections.
    pub tcp_established: bool,
    /// Permit external unix socket connections.
    pub external_unix_connections: bool,
    /// Permit snapshotting interactive shell process groups.
    pub shell_job: bool,
    /// Bypass the running/checkpointed precondition checks on restore.
    pub force_restore: bool,
    /// Host-side names for restored sandbox interfaces, filled during restore.
    #[serde(skip)]
    pub veth_pairs: Vec<VethPair>,
}

/// Maps a network interface inside the restored namespace to a fresh host peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    pub inside: String,
    pub outside: String,
}

impl SnapshotOptions {
    /// Fill blank image/work directories with defaults under `container_root`.
    pub fn resolve(&self, container_root: &Path) -> Self {
        let mut resolved = self.clone();
        if is_blank(&resolved.images_directory) {
            resolved.images_directory = Some(container_root.join(DEFAULT_IMAGES_DIR));
        }
        if is_blank(&resolved.work_directory) {
            resolved.work_directory = Some(container_root.join(DEFAULT_WORK_DIR));
        }
        resolved
    }

    /// Return a copy carrying the given interface pairs.
    pub fn with_veth_pairs(&self, pairs: Vec<VethPair>) -> Self {
        Self {
            veth_pairs: pairs,
            ..self.clone()
        }
    }

    /// Whether the caller supplied an explicit image directory.
    pub fn has_images_directory(&self) -> bool {
        !is_blank(&self.images_directory)
    }

    /// Resolved image directory. Empty path if `resolve` was not called.
    pub fn images_dir(&self) -> &Path {
        self.images_directory.as_deref().unwrap_or(Path::new(""))
    }

    /// Resolved work directory. Empty path if `resolve` was not called.
    pub fn work_dir(&self) -> &Path {
        self.work_directory.as_deref().unwrap_or(Path::new(""))
    }
}

fn is_blank(path: &Option<PathBuf>) -> bool {
    path.as_ref().map(|p| p.as_os_str().is_empty()).unwrap_or(true)
}

/// Options for committing a container filesystem to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitConfig {
    /// Freeze the container process for the duration of the commit.
    pub pause: bool,
}
