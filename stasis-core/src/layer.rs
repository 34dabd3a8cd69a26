// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Filesystem commit boundary.
//!
//! `DirectoryLayerStore` commits a container rootfs as a content-addressed
//! manifest: one line per entry (path, mode, size, sha256), and the image id
//! is the sha256 of the manifest itself. Identical trees commit to the same id.

use std::fmt::Write as _;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sha2::{Digest, Sha256};

use crate::container::ContainerHandle;
use crate::error::CommitError;
use crate::options::CommitConfig;
use crate::types::ImageId;

/// Manifest file name inside a layer directory.
pub const MANIFEST_FILE: &str = "manifest";

/// Filesystem layering subsystem.
#[async_trait]
pub trait LayerStore: Send + Sync + 'static {
    /// Commit the container's current filesystem as a new image.
    async fn commit(
        &self,
        container: &ContainerHandle,
        config: CommitConfig,
    ) -> Result<ImageId, CommitError>;
}

/// Layer store writing manifests under `<layers_dir>/<digest>/`.
#[derive(Debug, Clone)]
pub struct DirectoryLayerStore {
    layers_dir: PathBuf,
}

impl DirectoryLayerStore {
    pub fn new(layers_dir: impl Into<PathBuf>) -> Self {
        Self {
            layers_dir: layers_dir.into(),
        }
    }

    pub fn layer_path(&self, image_id: &ImageId) -> PathBuf {
        self.layers_dir.join(image_id.digest())
    }
}

/// Keeps a process stopped for as long as it is alive.
struct PauseGuard {
    pid: Pid,
}

impl PauseGuard {
    fn pause(pid: u32) -> Result<Self, CommitError> {
        let pid_raw = i32::try_from(pid).map_err(|_| CommitError::PauseFailed {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        let pid = Pid::from_raw(pid_raw);
        kill(pid, Signal::SIGSTOP).map_err(|e| CommitError::PauseFailed {
            pid: pid_raw as u32,
            reason: e.to_string(),
        })?;
        Ok(Self { pid })
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        if let Err(e) = kill(self.pid, Signal::SIGCONT) {
            tracing::warn!(pid = %self.pid, error = %e, "Failed to resume paused process");
        }
    }
}

/// Build the manifest for `root`: each directory is listed in sorted order
/// before its subdirectories are descended into.
fn build_manifest(root: &Path) -> Result<String, CommitError> {
    let mut manifest = String::new();
    let mut stack = vec![root.to_path_buf()];
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| CommitError::Read { path, source }
    };

    while let Some(dir) = stack.pop() {
        let mut entries: Vec<_> = std::fs::read_dir(&dir)
            .map_err(read_err(&dir))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            let meta = std::fs::symlink_metadata(&path).map_err(read_err(&path))?;
            let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            let mode = meta.permissions().mode();

            let digest = if meta.is_file() {
                let mut hasher = Sha256::new();
                let mut file = std::fs::File::open(&path).map_err(read_err(&path))?;
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = file.read(&mut buf).map_err(read_err(&path))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                hex::encode(hasher.finalize())
            } else if meta.file_type().is_symlink() {
                let target = std::fs::read_link(&path).map_err(read_err(&path))?;
                hex::encode(Sha256::digest(target.as_os_str().as_encoded_bytes()))
            } else {
                String::from("-")
            };

            let size = if meta.is_file() { meta.len() } else { 0 };
            let _ = writeln!(manifest, "{}\t{:o}\t{}\t{}", rel, mode, size, digest);

            if meta.is_dir() {
                subdirs.push(path);
            }
        }
        // Reversed so subdirectories pop in sorted order.
        stack.extend(subdirs.into_iter().rev());
    }

    Ok(manifest)
}

#[async_trait]
impl LayerStore for DirectoryLayerStore {
    async fn commit(
        &self,
        container: &ContainerHandle,
        config: CommitConfig,
    ) -> Result<ImageId, CommitError> {
        let _pause = match (config.pause, container.pid) {
            (true, Some(pid)) => Some(PauseGuard::pause(pid)?),
            _ => None,
        };

        let rootfs = container.rootfs.clone();
        let manifest = tokio::task::spawn_blocking(move || build_manifest(&rootfs))
            .await
            .map_err(|e| CommitError::Read {
                path: container.rootfs.clone(),
                source: std::io::Error::other(e.to_string()),
            })??;

        let digest: [u8; 32] = Sha256::digest(manifest.as_bytes()).into();
        let image_id = ImageId::from_digest(&digest);

        let layer = self.layer_path(&image_id);
        let write_err = |source| CommitError::Write {
            image_id: image_id.to_string(),
            source,
        };
        std::fs::create_dir_all(&layer).map_err(write_err)?;
        std::fs::write(layer.join(MANIFEST_FILE), manifest).map_err(write_err)?;

        tracing::info!(
            container = %container.id,
            image = %image_id,
            paused = container.pid.is_some() && config.pause,
            "Filesystem committed"
        );

        Ok(image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::types::{ContainerId, ContainerName};
    use tempfile::TempDir;

    fn container(root: &Path) -> Container {
        let c = Container::new(
            ContainerId::new("abc").unwrap(),
            ContainerName::new("web").unwrap(),
            root,
        );
        std::fs::create_dir_all(c.rootfs().join("etc")).unwrap();
        std::fs::write(c.rootfs().join("etc/hostname"), b"web\n").unwrap();
        c
    }

    #[tokio::test]
    async fn test_commit_is_content_addressed() {
        let tmp = TempDir::new().unwrap();
        let c = container(&tmp.path().join("c"));
        let store = DirectoryLayerStore::new(tmp.path().join("layers"));
        let cfg = CommitConfig { pause: true };

        let first = store.commit(&c.handle(), cfg).await.unwrap();
        let again = store.commit(&c.handle(), cfg).await.unwrap();
        assert_eq!(first, again);
        assert!(store.layer_path(&first).join(MANIFEST_FILE).exists());

        std::fs::write(c.rootfs().join("etc/hostname"), b"db\n").unwrap();
        let changed = store.commit(&c.handle(), cfg).await.unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn test_manifest_lists_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let c = container(tmp.path());
        std::fs::create_dir_all(c.rootfs().join("var/log")).unwrap();
        let manifest = build_manifest(&c.rootfs()).unwrap();
        let paths: Vec<_> = manifest
            .lines()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(paths, vec!["etc", "var", "etc/hostname", "var/log"]);
    }

    #[tokio::test]
    async fn test_commit_missing_rootfs() {
        let tmp = TempDir::new().unwrap();
        let c = Container::new(
            ContainerId::new("abc").unwrap(),
            ContainerName::new("web").unwrap(),
            tmp.path().join("nothing"),
        );
        let store = DirectoryLayerStore::new(tmp.path().join("layers"));
        let err = store
            .commit(&c.handle(), CommitConfig { pause: false })
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::Read { .. }));
    }
}
