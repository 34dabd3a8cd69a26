// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Durable container state.
//!
//! Each container is written as JSON to
//! `<state_root>/containers/<id>/config.v2.json`. Writes go to a temporary
//! file first and are renamed into place so a crash never leaves a torn file.

use std::path::{Path, PathBuf};

use crate::container::Container;
use crate::error::PersistError;
use crate::types::ContainerId;

/// Directory under the state root that holds per-container roots.
pub const CONTAINERS_DIR: &str = "containers";

/// State file name inside a container root.
const STATE_FILE: &str = "config.v2.json";

/// Filesystem-backed store for container state.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_root: PathBuf,
}

impl StateStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Private directory of a container.
    pub fn container_root(&self, id: &ContainerId) -> PathBuf {
        self.state_root.join(CONTAINERS_DIR).join(id.as_str())
    }

    /// Write the full container state to disk.
    pub fn persist(&self, container: &Container) -> Result<(), PersistError> {
        let root = self.container_root(&container.id);
        let write_err = |source| PersistError::Write {
            container: container.id.clone(),
            source,
        };

        std::fs::create_dir_all(&root).map_err(write_err)?;

        let body = serde_json::to_vec_pretty(container).map_err(|source| PersistError::Encode {
            container: container.id.clone(),
            source,
        })?;

        let tmp = root.join(format!("{}.tmp", STATE_FILE));
        std::fs::write(&tmp, body).map_err(write_err)?;
        std::fs::rename(&tmp, root.join(STATE_FILE)).map_err(write_err)?;

        tracing::debug!(container = %container.id, "Persisted container state");
        Ok(())
    }

    /// Load a single container by id.
    pub fn load(&self, id: &ContainerId) -> Result<Container, PersistError> {
        self.load_from(&self.container_root(id))
    }

    fn load_from(&self, root: &Path) -> Result<Container, PersistError> {
        let path = root.join(STATE_FILE);
        let body = std::fs::read(&path).map_err(|source| PersistError::Read {
            path: path.clone(),
            source,
        })?;
        let mut container: Container =
            serde_json::from_slice(&body).map_err(|source| PersistError::Decode {
                path: path.clone(),
                source,
            })?;
        container.root = root.to_path_buf();
        Ok(container)
    }

    /// Load every container under the state root.
    ///
    /// Directories without a readable state file are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<Container>, PersistError> {
        let dir = self.state_root.join(CONTAINERS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|source| PersistError::Read {
            path: dir.clone(),
            source,
        })?;

        let mut containers = Vec::new();
        for entry in entries.flatten() {
            let root = entry.path();
            if !root.is_dir() {
                continue;
            }
            match self.load_from(&root) {
                Ok(container) => containers.push(container),
                Err(e) => {
                    tracing::warn!(path = %root.display(), error = %e, "Skipping container state");
                }
            }
        }

        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }
}
