// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for Stasis.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Errors are grouped by the taxonomy the orchestrators act on: precondition
//! failures have no side effects, setup failures trigger the rollback path,
//! snapshot failures are wrapped with the container identity, and bookkeeping
//! failures report a checkpoint that succeeded but could not be recorded.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ContainerId;

/// Top-level error type for the Stasis orchestrator.
#[derive(Debug, Error)]
pub enum StasisError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Lookup
    // =========================================================================
    #[error("No such container: {0}")]
    ContainerNotFound(String),

    #[error("Container reference {0} is ambiguous")]
    AmbiguousReference(String),

    #[error("Container name {0} is already in use")]
    NameInUse(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Cannot prepare container {container} ({step}): {source}")]
    Setup {
        container: ContainerId,
        step: SetupStep,
        #[source]
        source: SetupError,
    },

    #[error("Cannot {action} container {container}: {source}")]
    Snapshot {
        container: ContainerId,
        action: &'static str,
        #[source]
        source: SnapshotError,
    },

    #[error("Cannot restore container {container}: restore process failed (exit code {exit_code})")]
    RestoreProcessFailed { container: ContainerId, exit_code: i32 },

    #[error("Cannot restore container {container}: no completion within {timeout_ms}ms")]
    RestoreTimeout { container: ContainerId, timeout_ms: u64 },

    /// The process state was captured but recording it failed afterwards.
    #[error("Container {container} was checkpointed but {step} failed: {reason}")]
    Bookkeeping {
        container: ContainerId,
        step: &'static str,
        reason: String,
    },

    #[error("State persistence error: {0}")]
    Persist(#[from] PersistError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject configuration or identifiers at the boundary.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Lifecycle preconditions. Returned before any side effect takes place.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Container {0} not running")]
    NotRunning(ContainerId),

    #[error("Container {0} already running")]
    AlreadyRunning(ContainerId),

    #[error("Container {0} is not checkpointed")]
    NotCheckpointed(ContainerId),

    #[error("You must specify an image directory to restore from {0}")]
    MissingImageDirectory(ContainerId),

    #[error("Container {0} is marked for removal and cannot be restored")]
    BeingRemoved(ContainerId),

    #[error("Container {0} is running; force restore over a live process is not supported")]
    ForceRestoreWhileRunning(ContainerId),
}

/// The resource preparation step that failed during restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Mount,
    Network,
    Links,
    WorkingDirectory,
    Command,
    Ipc,
    Mounts,
    Directories,
}

impl SetupStep {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mount => "mount rootfs",
            Self::Network => "network",
            Self::Links => "links",
            Self::WorkingDirectory => "working directory",
            Self::Command => "command",
            Self::Ipc => "ipc",
            Self::Mounts => "mounts",
            Self::Directories => "checkpoint directories",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource setup errors raised by the preparer and its collaborators.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Root filesystem not available at {path}")]
    RootfsMissing { path: PathBuf },

    #[error("Mount failed: {reason}")]
    MountFailed { reason: String },

    #[error("Network endpoint {endpoint_id} not found on network {network_id}")]
    EndpointNotFound {
        network_id: String,
        endpoint_id: String,
    },

    #[error("Network setup failed: {reason}")]
    NetworkFailed { reason: String },

    #[error("Cannot link to {name}: container not found")]
    LinkTargetMissing { name: String },

    #[error("Cannot link to {name}: container not running")]
    LinkTargetNotRunning { name: String },

    #[error("Checkpoint images directory {path} does not exist")]
    ImagesMissing { path: PathBuf },

    #[error("Working directory {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Invalid environment entry {entry:?}: variable name is empty")]
    InvalidEnv { entry: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Snapshot engine failures. Wrapped with the container identity upstream.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("CRIU binary not found at expected path")]
    BinaryNotFound,

    #[error("Container has no running process to capture")]
    NoProcess,

    #[error("Failed to execute snapshot engine: {reason}")]
    SpawnFailed { reason: String },

    #[error("Capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Replay failed: {reason}")]
    ReplayFailed { reason: String },

    #[error("Replay task aborted: {reason}")]
    TaskAborted { reason: String },

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

/// Durable state errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to write state for {container}: {source}")]
    Write {
        container: ContainerId,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read state from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state for {container}: {source}")]
    Encode {
        container: ContainerId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode state at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Filesystem layer commit errors.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Failed to pause container process {pid}: {reason}")]
    PauseFailed { pid: u32, reason: String },

    #[error("Failed to read layer source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write layer {image_id}: {source}")]
    Write {
        image_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using StasisError.
pub type StasisResult<T> = Result<T, StasisError>;
