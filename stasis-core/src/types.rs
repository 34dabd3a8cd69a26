// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated identifiers.
//!
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Maximum length of a container identifier (a full sha256 in hex).
const MAX_ID_LEN: usize = 64;

/// Maximum length of a container name.
const MAX_NAME_LEN: usize = 128;

/// Prefix used for content-addressed filesystem image identifiers.
const IMAGE_ID_PREFIX: &str = "sha256:";

/// Validated container identifier.
/// Must be non-empty, lowercase alphanumeric, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new ContainerId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "container_id",
                value: id,
                reason: "Container ID cannot be empty".to_string(),
            });
        }

        if id.len() > MAX_ID_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "container_id",
                value: id.clone(),
                reason: format!("Container ID too long: {} chars (max 64)", id.len()),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "container_id",
                value: id,
                reason: "Container ID must contain only lowercase alphanumeric characters"
                    .to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used in log lines and CLI output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Validated container name.
/// Alphanumeric first character, then alphanumerics, `_`, `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Create a new ContainerName with validation. A leading `/` is stripped.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();
        let trimmed = name.trim_start_matches('/');

        let mut chars = trimmed.chars();
        let valid_first = chars.next().map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

        if !valid_first || !valid_rest || trimmed.len() > MAX_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "container_name",
                value: name.clone(),
                reason: "Container name must match [a-zA-Z0-9][a-zA-Z0-9_.-]*".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

/// Identifier of a committed filesystem image (`sha256:<64 hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    /// Create a new ImageId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let id = id.into();
        let digest = id.strip_prefix(IMAGE_ID_PREFIX).unwrap_or("");

        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "image_id",
                value: id.clone(),
                reason: "Image ID must be sha256:<64 hex digits>".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Build an ImageId from a raw sha256 digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(format!("{}{}", IMAGE_ID_PREFIX, hex::encode(digest)))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the algorithm prefix.
    pub fn digest(&self) -> &str {
        &self.0[IMAGE_ID_PREFIX.len()..]
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ImageId {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}
