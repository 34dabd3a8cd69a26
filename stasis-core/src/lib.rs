// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Stasis Core Library
//!
//! Checkpoint/restore orchestration for containers. Sequences precondition
//! checks, resource setup and teardown, delegation to an external snapshot
//! engine, and supervision of restored processes.

pub mod checkpoint;
pub mod config;
pub mod container;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod events;
pub mod layer;
pub mod links;
pub mod metrics;
pub mod monitor;
pub mod mounts;
pub mod network;
pub mod options;
pub mod prepare;
pub mod restore;
pub mod runtime;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader};
pub use container::{Container, ContainerHandle, ContainerState, ImagePathRegistry};
pub use daemon::{ContainerInspect, ContainerSummary, Daemon};
pub use engine::{CriuEngine, SnapshotEngine};
pub use error::{
    HardValidationError, PreconditionError, SetupError, SnapshotError, StasisError, StasisResult,
};
pub use monitor::{Completion, RestoreMonitor, RestoreNotifier};
pub use options::{CommitConfig, SnapshotOptions};
pub use runtime::{ContainerSlot, Runtime, RuntimeSettings};
pub use types::{ContainerId, ContainerName, ImageId};
