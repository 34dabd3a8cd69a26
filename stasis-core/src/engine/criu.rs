// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CRIU-backed snapshot engine.
//!
//! Drives the external `criu` binary. Restore runs in the foreground so that
//! `criu` stays the parent of the restored tree and exits with its status;
//! the restored pid is picked up from the pidfile CRIU writes once the tree
//! is running.

use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

use super::{RestoreNotifier, SnapshotEngine};
use crate::container::ContainerHandle;
use crate::error::SnapshotError;
use crate::options::SnapshotOptions;

/// Log file written by `criu dump` inside the work directory.
pub const DUMP_LOG: &str = "dump.log";

/// Log file written by `criu restore` inside the work directory.
pub const RESTORE_LOG: &str = "restore.log";

/// Pidfile written by `criu restore` inside the work directory.
pub const RESTORE_PIDFILE: &str = "restore.pid";

/// How often to look for the restore pidfile.
const PIDFILE_POLL: Duration = Duration::from_millis(10);

/// Snapshot engine that shells out to CRIU.
///
/// The binary is located on first use, so hosts without CRIU can still
/// read container state.
#[derive(Debug, Default)]
pub struct CriuEngine {
    configured: Option<PathBuf>,
    resolved: OnceLock<PathBuf>,
}

impl CriuEngine {
    /// Use the CRIU binary at `criu_path`, or search the usual locations.
    pub fn new(criu_path: Option<PathBuf>) -> Result<Self, SnapshotError> {
        let engine = Self::lazy(criu_path);
        engine.binary()?;
        Ok(engine)
    }

    /// Defer locating the binary until a capture or replay needs it.
    pub fn lazy(criu_path: Option<PathBuf>) -> Self {
        Self {
            configured: criu_path,
            resolved: OnceLock::new(),
        }
    }

    /// The resolved binary, if it has been located.
    pub fn criu_path(&self) -> Option<&Path> {
        self.resolved.get().map(PathBuf::as_path)
    }

    fn binary(&self) -> Result<&Path, SnapshotError> {
        if let Some(path) = self.resolved.get() {
            return Ok(path.as_path());
        }

        let path = match &self.configured {
            Some(path) if path.exists() => path.clone(),
            Some(_) => return Err(SnapshotError::BinaryNotFound),
            None => Self::find_criu()?,
        };

        tracing::info!(criu_path = %path.display(), "CRIU engine initialized");

        Ok(self.resolved.get_or_init(|| path).as_path())
    }

    /// Find the CRIU binary.
    fn find_criu() -> Result<PathBuf, SnapshotError> {
        let candidates = [
            "/usr/sbin/criu",
            "/usr/bin/criu",
            "/sbin/criu",
            "/bin/criu",
            "/usr/local/sbin/criu",
            "/usr/local/bin/criu",
        ];

        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or(SnapshotError::BinaryNotFound)
    }
}

/// Arguments for `criu dump` of the tree rooted at `pid`.
pub(crate) fn dump_args(
    pid: u32,
    container: &ContainerHandle,
    opts: &SnapshotOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "dump".into(),
        "--tree".into(),
        pid.to_string().into(),
        "--images-dir".into(),
        opts.images_dir().into(),
        "--work-dir".into(),
        opts.work_dir().into(),
        "--log-file".into(),
        DUMP_LOG.into(),
        "-v4".into(),
    ];

    if let Some(prev) = &opts.previous_images_directory {
        args.push("--prev-images-dir".into());
        args.push(prev.into());
    }
    if opts.leave_running {
        args.push("--leave-running".into());
    }
    push_connection_flags(&mut args, opts);

    for volume in &container.volumes {
        let dest = volume.destination.display().to_string();
        args.push("--ext-mount-map".into());
        args.push(format!("{}:{}", dest, dest).into());
    }

    args
}

/// Arguments for `criu restore` into the container's root filesystem.
pub(crate) fn restore_args(
    container: &ContainerHandle,
    opts: &SnapshotOptions,
    pidfile: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "restore".into(),
        "--images-dir".into(),
        opts.images_dir().into(),
        "--work-dir".into(),
        opts.work_dir().into(),
        "--log-file".into(),
        RESTORE_LOG.into(),
        "-v4".into(),
        "--root".into(),
        container.rootfs.clone().into(),
        "--pidfile".into(),
        pidfile.into(),
    ];

    push_connection_flags(&mut args, opts);

    for pair in &opts.veth_pairs {
        args.push("--veth-pair".into());
        args.push(format!("{}={}", pair.inside, pair.outside).into());
    }

    if let Some(command) = &container.command {
        for mount in &command.mounts {
            args.push("--ext-mount-map".into());
            args.push(
                format!("{}:{}", mount.destination.display(), mount.source.display()).into(),
            );
        }
    }

    args
}

fn push_connection_flags(args: &mut Vec<OsString>, opts: &SnapshotOptions) {
    if opts.tcp_established {
        args.push("--tcp-established".into());
    }
    if opts.external_unix_connections {
        args.push("--ext-unix-sk".into());
    }
    if opts.shell_job {
        args.push("--shell-job".into());
    }
}

/// Exit code of a process, mapping signal deaths to `128 + signo`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

async fn read_pidfile(path: &Path) -> Option<u32> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

#[async_trait]
impl SnapshotEngine for CriuEngine {
    async fn capture(
        &self,
        container: &ContainerHandle,
        opts: &SnapshotOptions,
    ) -> Result<(), SnapshotError> {
        let pid = container.pid.ok_or(SnapshotError::NoProcess)?;
        let criu = self.binary()?;

        tracing::debug!(
            container = %container.id,
            pid = pid,
            images = %opts.images_dir().display(),
            "Starting CRIU dump"
        );

        let start = Instant::now();

        let output = Command::new(criu)
            .args(dump_args(pid, container, opts))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SnapshotError::SpawnFailed {
                reason: format!("Failed to execute CRIU: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SnapshotError::CaptureFailed {
                reason: format!(
                    "criu dump exited with {} (log: {}): {}",
                    output.status,
                    opts.work_dir().join(DUMP_LOG).display(),
                    stderr.trim()
                ),
            });
        }

        tracing::info!(
            container = %container.id,
            pid = pid,
            elapsed_ms = start.elapsed().as_millis(),
            "CRIU dump completed"
        );

        Ok(())
    }

    async fn replay(
        &self,
        container: &ContainerHandle,
        opts: &SnapshotOptions,
        notifier: RestoreNotifier,
    ) -> Result<i32, SnapshotError> {
        let criu = self.binary()?;
        let pidfile = opts.work_dir().join(RESTORE_PIDFILE);
        let _ = tokio::fs::remove_file(&pidfile).await;

        tracing::debug!(
            container = %container.id,
            images = %opts.images_dir().display(),
            "Starting CRIU restore"
        );

        let start = Instant::now();

        // Dropping the child (task abort) kills criu and the tree under it.
        let mut child = Command::new(criu)
            .args(restore_args(container, opts, &pidfile))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SnapshotError::SpawnFailed {
                reason: format!("Failed to execute CRIU: {}", e),
            })?;

        let mut restored_pid: Option<u32> = None;

        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|e| SnapshotError::ReplayFailed {
                        reason: format!("Failed to wait for CRIU: {}", e),
                    })?;

                    if restored_pid.is_none() && !status.success() {
                        return Err(SnapshotError::ReplayFailed {
                            reason: format!(
                                "criu restore exited with {} (log: {})",
                                status,
                                opts.work_dir().join(RESTORE_LOG).display()
                            ),
                        });
                    }

                    let code = exit_code(status);
                    tracing::info!(
                        container = %container.id,
                        exit_code = code,
                        "Restored process exited"
                    );
                    return Ok(code);
                }
                _ = tokio::time::sleep(PIDFILE_POLL), if restored_pid.is_none() => {
                    if let Some(pid) = read_pidfile(&pidfile).await {
                        tracing::info!(
                            container = %container.id,
                            pid = pid,
                            elapsed_ms = start.elapsed().as_millis(),
                            "CRIU restore completed"
                        );
                        restored_pid = Some(pid);
                        notifier.restored(pid);
                    }
                }
            }
        }
    }

    async fn terminate(&self, pid: u32) -> Result<(), SnapshotError> {
        let signal_failed = |reason: String| SnapshotError::SignalFailed { pid, reason };
        let target = i32::try_from(pid)
            .map(Pid::from_raw)
            .map_err(|_| signal_failed("pid out of range".to_string()))?;

        match kill(target, Signal::SIGKILL) {
            Ok(()) => {
                tracing::info!(pid = pid, "Killed restored process");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                tracing::debug!(pid = pid, "Restored process already gone");
                Ok(())
            }
            Err(e) => Err(signal_failed(e.to_string())),
        }
    }
}
