// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Restore orchestrator.
//!
//! The container lock is held from the precondition checks until the
//! completion race resolves, so restore attempts on one container are
//! serialized. The engine replay runs as its own task and races the
//! monitor's completion signal:
//!
//! * completion with exit code 0 (or a running pid): success; the replay
//!   task is handed to a supervisor that records the eventual exit,
//! * completion with a non-zero exit code: `RestoreProcessFailed`,
//! * replay task error: that error, wrapped with the container id.
//!
//! A losing replay task is aborted. A supervisor only touches the container
//! while its monitor is still the container's current one, so a late exit
//! from an older restore never overwrites newer state. [`stop`] asks the
//! supervisor to kill the restored tree and waits until the exit is recorded.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinError, JoinHandle};

use crate::container::{Container, FAILED_EXIT_CODE, STOPPED_EXIT_CODE};
use crate::error::{PreconditionError, SnapshotError, StasisError, StasisResult};
use crate::events::EventAction;
use crate::metrics;
use crate::monitor::{spawn_replay, Completion, RestoreMonitor};
use crate::options::SnapshotOptions;
use crate::prepare::{prepare, release_resources, Rollback};
use crate::runtime::{ContainerSlot, Runtime};

type ReplayHandle = JoinHandle<Result<i32, SnapshotError>>;

/// First of the two restore signals to resolve.
enum Race {
    Completed(Completion),
    Replay(Result<Result<i32, SnapshotError>, JoinError>),
}

/// Restore the container in `slot`.
///
/// `force` (or `opts.force_restore`) bypasses the running/checkpointed
/// checks; an image source is still required.
pub async fn restore(
    runtime: &Arc<Runtime>,
    slot: &ContainerSlot,
    opts: &SnapshotOptions,
    force: bool,
) -> StasisResult<()> {
    let start = Instant::now();
    let mut container = slot.lock().await;
    let force = force || opts.force_restore;

    let checked = check_preconditions(&container, opts, force)
        .and_then(|()| check_replaceable(&container));
    if let Err(e) = checked {
        metrics::RESTORES
            .with_label_values(&[metrics::RESULT_ERROR])
            .inc();
        return Err(e.into());
    }

    let opts = opts.resolve(&container.root);
    if let Some(image_id) = container.checkpoint_images.lookup(opts.images_dir()).cloned() {
        tracing::debug!(container = %container.id, image = %image_id, "Using image committed with checkpoint");
        container.image_id = Some(image_id);
    }

    tracing::debug!(
        container = %container.id,
        images = %opts.images_dir().display(),
        force = force,
        "Restoring container"
    );

    let mut rollback = Rollback::new();
    let result = match prepare(runtime, &mut container, &opts, &mut rollback).await {
        Ok(opts) => run_monitored(runtime, slot, &mut container, opts).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            metrics::RESTORES.with_label_values(&[metrics::RESULT_OK]).inc();
            metrics::RESTORE_DURATION.observe(start.elapsed().as_secs_f64());
            tracing::info!(
                container = %container.id,
                pid = ?container.state.pid,
                elapsed_ms = start.elapsed().as_millis(),
                "Container restored"
            );
            Ok(())
        }
        Err(err) => {
            fail_restore(runtime, &mut container, rollback, &err).await;
            metrics::RESTORES
                .with_label_values(&[metrics::RESULT_ERROR])
                .inc();
            Err(err)
        }
    }
}

/// Lifecycle checks; nothing is touched before these pass.
pub fn check_preconditions(
    container: &Container,
    opts: &SnapshotOptions,
    force: bool,
) -> Result<(), PreconditionError> {
    let id = || container.id.clone();

    if !force {
        if container.is_running() {
            return Err(PreconditionError::AlreadyRunning(id()));
        }
        if !container.is_checkpointed() {
            return Err(PreconditionError::NotCheckpointed(id()));
        }
    } else if !container.has_been_checkpointed() && !opts.has_images_directory() {
        return Err(PreconditionError::MissingImageDirectory(id()));
    }

    if container.state.dead || container.state.removal_in_progress {
        return Err(PreconditionError::BeingRemoved(id()));
    }

    Ok(())
}

/// Refuse to replace a live process tree. Runs once the lifecycle checks
/// have passed, so it only ever rejects a forced restore.
pub fn check_replaceable(container: &Container) -> Result<(), PreconditionError> {
    if container.is_running() {
        return Err(PreconditionError::ForceRestoreWhileRunning(
            container.id.clone(),
        ));
    }
    Ok(())
}

async fn run_monitored(
    runtime: &Arc<Runtime>,
    slot: &ContainerSlot,
    container: &mut Container,
    opts: SnapshotOptions,
) -> StasisResult<()> {
    let id = container.id.clone();

    let monitor = RestoreMonitor::new(id.clone(), container.config.restart_policy);
    container.monitor = Some(Arc::clone(&monitor));

    let mut replay = spawn_replay(
        Arc::clone(&runtime.engine),
        container.handle(),
        opts,
        Arc::clone(&monitor),
    );

    let race = async {
        tokio::select! {
            // A replay that exits normally fires completion first; prefer it.
            biased;
            completion = monitor.completed() => Race::Completed(completion),
            joined = &mut replay => Race::Replay(joined),
        }
    };

    let timed = match runtime.settings.restore_timeout {
        Some(timeout) => tokio::time::timeout(timeout, race).await.ok(),
        None => Some(race.await),
    };

    let mut replay_joined = false;
    let completion = match timed {
        None => {
            replay.abort();
            return Err(StasisError::RestoreTimeout {
                container: id,
                timeout_ms: runtime
                    .settings
                    .restore_timeout
                    .map(|t| t.as_millis() as u64)
                    .unwrap_or_default(),
            });
        }
        Some(Race::Completed(completion)) => completion,
        Some(Race::Replay(Ok(Ok(exit_code)))) => {
            replay_joined = true;
            Completion::Exited { exit_code }
        }
        Some(Race::Replay(Ok(Err(source)))) => {
            return Err(StasisError::Snapshot {
                container: id,
                action: "restore",
                source,
            });
        }
        Some(Race::Replay(Err(e))) => {
            return Err(StasisError::Snapshot {
                container: id,
                action: "restore",
                source: SnapshotError::TaskAborted {
                    reason: e.to_string(),
                },
            });
        }
    };

    if completion.exit_code() != 0 {
        replay.abort();
        container.state.set_stopped(completion.exit_code());
        return Err(StasisError::RestoreProcessFailed {
            container: id,
            exit_code: completion.exit_code(),
        });
    }

    container.state.set_restored(completion.pid());
    if let Err(e) = runtime.store.persist(container) {
        tracing::warn!(container = %id, error = %e, "Failed to persist restored state");
    }
    runtime.links.publish(container);
    runtime
        .events
        .emit(&id, &container.name, EventAction::Restore, None);

    let replay = (!replay_joined).then_some(replay);
    spawn_supervisor(Arc::clone(runtime), Arc::clone(slot), monitor, replay);

    Ok(())
}

/// Record the failure and release whatever setup acquired.
async fn fail_restore(
    runtime: &Runtime,
    container: &mut Container,
    rollback: Rollback,
    err: &StasisError,
) {
    tracing::error!(container = %container.id, error = %err, "Restore failed");

    container.state.set_failed(&err.to_string());
    container.monitor = None;
    container.command = None;

    if let Err(e) = runtime.store.persist(container) {
        tracing::warn!(container = %container.id, error = %e, "Failed to persist failed state");
    }

    rollback.run(runtime, &container.handle()).await;

    runtime.links.publish(container);
    runtime.events.emit(
        &container.id,
        &container.name,
        EventAction::Die,
        Some(container.state.exit_code),
    );
}

/// Watch a restored process until it exits or a stop is requested, then
/// mark the container stopped.
fn spawn_supervisor(
    runtime: Arc<Runtime>,
    slot: ContainerSlot,
    monitor: Arc<RestoreMonitor>,
    replay: Option<ReplayHandle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut replay = replay;
        let exited = tokio::select! {
            biased;
            code = wait_for_exit(&monitor, replay.as_mut()) => Some(code),
            _ = monitor.stop_requested() => None,
        };
        let exit_code = match exited {
            Some(code) => code,
            None => kill_restored(&runtime, &monitor, replay.take()).await,
        };
        monitor.mark_exited(exit_code);

        let mut container = slot.lock().await;
        if !container.is_current_monitor(&monitor) {
            tracing::debug!(
                container = %container.id,
                exit_code = exit_code,
                "Exit from superseded restore ignored"
            );
            drop(container);
            monitor.mark_settled();
            return;
        }

        let restart = monitor.evaluate_restart(exit_code, container.state.restart_count);
        tracing::info!(
            container = %container.id,
            exit_code = exit_code,
            policy = %monitor.restart_policy(),
            restart = restart,
            stopped = monitor.is_stop_requested(),
            "Restored process exited"
        );

        record_exit(&runtime, &mut container, exit_code).await;
        drop(container);
        monitor.mark_settled();
    })
}

async fn wait_for_exit(monitor: &RestoreMonitor, replay: Option<&mut ReplayHandle>) -> i32 {
    let Some(handle) = replay else {
        return monitor.exited().await;
    };
    match handle.await {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            tracing::warn!(container = %monitor.container(), error = %e, "Replay failed after restore");
            FAILED_EXIT_CODE
        }
        Err(e) => {
            tracing::warn!(container = %monitor.container(), error = %e, "Replay task ended abnormally");
            FAILED_EXIT_CODE
        }
    }
}

/// Kill the restored tree for a stop request and abandon the replay.
async fn kill_restored(
    runtime: &Runtime,
    monitor: &RestoreMonitor,
    replay: Option<ReplayHandle>,
) -> i32 {
    if let Some(pid) = monitor.completion().and_then(|c| c.pid()) {
        if let Err(e) = runtime.engine.terminate(pid).await {
            tracing::warn!(container = %monitor.container(), pid = pid, error = %e, "Failed to kill restored process");
        }
    }
    if let Some(handle) = replay {
        handle.abort();
    }
    STOPPED_EXIT_CODE
}

/// Mark the container stopped and release what the restore acquired.
async fn record_exit(runtime: &Runtime, container: &mut Container, exit_code: i32) {
    container.monitor = None;
    container.state.set_stopped(exit_code);

    if let Err(e) = runtime.store.persist(container) {
        tracing::warn!(container = %container.id, error = %e, "Failed to persist exit state");
    }
    release_resources(runtime, &container.handle()).await;
    runtime.links.publish(container);
    runtime.events.emit(
        &container.id,
        &container.name,
        EventAction::Die,
        Some(exit_code),
    );
}

/// Stop the container's process and record the exit.
///
/// A supervised process is killed by its supervisor; a container recorded
/// as running with nothing supervising it (a previous daemon went away) is
/// killed and marked stopped here. Returns the recorded exit code.
pub async fn stop(runtime: &Runtime, slot: &ContainerSlot) -> StasisResult<i32> {
    let monitor = {
        let mut container = slot.lock().await;
        match container.monitor.clone() {
            Some(monitor) => monitor,
            None if container.is_running() => {
                if let Some(pid) = container.state.pid {
                    if let Err(e) = runtime.engine.terminate(pid).await {
                        tracing::warn!(container = %container.id, pid = pid, error = %e, "Failed to kill process");
                    }
                }
                record_exit(runtime, &mut container, STOPPED_EXIT_CODE).await;
                tracing::info!(container = %container.id, "Unsupervised container stopped");
                return Ok(container.state.exit_code);
            }
            None => return Ok(container.state.exit_code),
        }
    };

    tracing::debug!(container = %monitor.container(), "Stop requested");
    monitor.request_stop();
    monitor.settled().await;

    let container = slot.lock().await;
    Ok(container.state.exit_code)
}
