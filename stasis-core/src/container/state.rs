// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container lifecycle flags and their transitions.
//!
//! Flags are only ever changed through the transition methods below, so the
//! pairing rules (`checkpointed` cleared on restore, exit code defaulted on
//! failure) live in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code recorded when a lifecycle transition fails before the process
/// reports one of its own.
pub const FAILED_EXIT_CODE: i32 = 128;

/// Exit code recorded for a process killed by a stop request (SIGKILL).
pub const STOPPED_EXIT_CODE: i32 = 137;

/// Persisted lifecycle state of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
    pub running: bool,
    pub checkpointed: bool,
    pub dead: bool,
    pub removal_in_progress: bool,
    pub pid: Option<u32>,
    pub exit_code: i32,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub checkpointed_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
}

impl ContainerState {
    /// Short status string for listings.
    pub fn status(&self) -> &'static str {
        if self.removal_in_progress {
            "removing"
        } else if self.dead {
            "dead"
        } else if self.running {
            "running"
        } else if self.checkpointed {
            "checkpointed"
        } else {
            "exited"
        }
    }

    /// Whether a checkpoint ever completed for this container.
    pub fn has_been_checkpointed(&self) -> bool {
        self.checkpointed_at.is_some()
    }

    /// Record a successful capture. The process keeps running only when
    /// `leave_running` was requested.
    pub fn set_checkpointed(&mut self, leave_running: bool) {
        self.checkpointed = true;
        self.checkpointed_at = Some(Utc::now());
        self.running = leave_running;
        if !leave_running {
            self.pid = None;
            self.finished_at = Some(Utc::now());
        }
    }

    /// Record a successful restore; a checkpoint is consumed by it.
    pub fn set_restored(&mut self, pid: Option<u32>) {
        self.running = true;
        self.checkpointed = false;
        self.pid = pid;
        self.exit_code = 0;
        self.error = None;
        self.started_at = Some(Utc::now());
    }

    /// Record a process exit observed by the supervisor.
    pub fn set_stopped(&mut self, exit_code: i32) {
        self.running = false;
        self.pid = None;
        self.exit_code = exit_code;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failed transition. Never leaves the exit code at zero.
    pub fn set_failed(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.running = false;
        self.pid = None;
        if self.exit_code == 0 {
            self.exit_code = FAILED_EXIT_CODE;
        }
        self.finished_at = Some(Utc::now());
    }
}
