// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Collaborators shared by the orchestrators.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::container::Container;
use crate::engine::SnapshotEngine;
use crate::events::EventBus;
use crate::layer::LayerStore;
use crate::links::LinkTable;
use crate::mounts::MountManager;
use crate::network::NetworkController;
use crate::store::StateStore;

/// A container behind its exclusive lifecycle lock.
pub type ContainerSlot = Arc<Mutex<Container>>;

/// Tunables read from the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Upper bound on the restore completion wait; `None` waits forever.
    pub restore_timeout: Option<Duration>,
    pub interface_prefix: String,
    pub interface_name_length: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            restore_timeout: None,
            interface_prefix: crate::config::DEFAULT_INTERFACE_PREFIX.to_string(),
            interface_name_length: crate::config::DEFAULT_INTERFACE_NAME_LENGTH,
        }
    }
}

impl From<&Config> for RuntimeSettings {
    fn from(config: &Config) -> Self {
        Self {
            restore_timeout: config.daemon.restore_timeout,
            interface_prefix: config.network.interface_prefix.clone(),
            interface_name_length: config.network.interface_name_length,
        }
    }
}

/// Everything checkpoint and restore need besides the container itself.
#[derive(Clone)]
pub struct Runtime {
    pub engine: Arc<dyn SnapshotEngine>,
    pub layers: Arc<dyn LayerStore>,
    pub network: Arc<dyn NetworkController>,
    pub mounts: Arc<dyn MountManager>,
    pub store: StateStore,
    pub events: EventBus,
    pub links: Arc<LinkTable>,
    pub settings: RuntimeSettings,
}

impl Runtime {
    pub fn new(
        engine: Arc<dyn SnapshotEngine>,
        layers: Arc<dyn LayerStore>,
        network: Arc<dyn NetworkController>,
        mounts: Arc<dyn MountManager>,
        store: StateStore,
    ) -> Self {
        Self {
            engine,
            layers,
            network,
            mounts,
            store,
            events: EventBus::new(),
            links: Arc::new(LinkTable::new()),
            settings: RuntimeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
