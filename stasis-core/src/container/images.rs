// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Checkpoint image path to committed filesystem image bookkeeping.
//!
//! Ties the process images in a checkpoint directory to the filesystem layer
//! committed right after that checkpoint, so a restore sees both halves of
//! the same moment. Callers hold the owning container's lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::ImageId;

/// Ordered map from checkpoint image directory to committed image id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePathRegistry {
    entries: BTreeMap<PathBuf, ImageId>,
}

impl ImagePathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping, overwriting any previous image for `path`.
    pub fn record(&mut self, path: impl Into<PathBuf>, image_id: ImageId) -> Option<ImageId> {
        self.entries.insert(path.into(), image_id)
    }

    pub fn lookup(&self, path: &Path) -> Option<&ImageId> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ImageId)> {
        self.entries.iter()
    }
}
