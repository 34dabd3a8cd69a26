// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container lifecycle events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{ContainerId, ContainerName};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Checkpoint,
    Restore,
    Die,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkpoint => f.write_str("checkpoint"),
            Self::Restore => f.write_str("restore"),
            Self::Die => f.write_str("die"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerEvent {
    pub container: ContainerId,
    pub name: ContainerName,
    pub action: EventAction,
    pub exit_code: Option<i32>,
    pub time: DateTime<Utc>,
}

/// Fan-out of lifecycle events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ContainerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(
        &self,
        container: &ContainerId,
        name: &ContainerName,
        action: EventAction,
        exit_code: Option<i32>,
    ) {
        tracing::info!(
            container = %container,
            name = %name,
            action = %action,
            exit_code = ?exit_code,
            "Container event"
        );

        // No subscribers is not an error.
        let _ = self.tx.send(ContainerEvent {
            container: container.clone(),
            name: name.clone(),
            action,
            exit_code,
            time: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
