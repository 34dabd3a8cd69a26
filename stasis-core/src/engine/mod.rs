// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapshot engine boundary.
//!
//! The engine captures and replays process trees. It is opaque to the
//! orchestrators: capture either succeeds or fails, and replay reports the
//! running process through a [`RestoreNotifier`] before supervising it until
//! exit.

mod criu;

use async_trait::async_trait;

pub use criu::{CriuEngine, DUMP_LOG, RESTORE_LOG, RESTORE_PIDFILE};

use crate::container::ContainerHandle;
use crate::error::SnapshotError;
pub use crate::monitor::RestoreNotifier;
use crate::options::SnapshotOptions;

/// Process-state capture and replay.
#[async_trait]
pub trait SnapshotEngine: Send + Sync + 'static {
    /// Capture the container's process tree into `opts.images_directory`.
    async fn capture(
        &self,
        container: &ContainerHandle,
        opts: &SnapshotOptions,
    ) -> Result<(), SnapshotError>;

    /// Replay the process tree from `opts.images_directory`.
    ///
    /// Implementations call `notifier.restored(pid)` once the tree is
    /// running, then resolve with its exit code when it exits. An error means
    /// no running process was ever produced.
    async fn replay(
        &self,
        container: &ContainerHandle,
        opts: &SnapshotOptions,
        notifier: RestoreNotifier,
    ) -> Result<i32, SnapshotError>;

    /// Kill a process tree produced by an earlier replay. A process that is
    /// already gone is not an error.
    async fn terminate(&self, pid: u32) -> Result<(), SnapshotError>;
}
