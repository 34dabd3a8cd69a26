// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Checkpoint orchestrator.
//!
//! Capture comes first. Once the engine has captured the process tree, any
//! later failure (filesystem commit, state persistence) is reported as
//! [`StasisError::Bookkeeping`]: the container *was* checkpointed, the
//! recording of it is what failed.

use std::time::Instant;

use crate::container::Container;
use crate::error::{PreconditionError, SetupStep, StasisError, StasisResult};
use crate::events::EventAction;
use crate::metrics;
use crate::options::{CommitConfig, SnapshotOptions};
use crate::prepare::{create_snapshot_dirs, release_resources};
use crate::runtime::{ContainerSlot, Runtime};

/// Checkpoint the container in `slot`, holding its lock throughout.
pub async fn checkpoint(
    runtime: &Runtime,
    slot: &ContainerSlot,
    opts: &SnapshotOptions,
) -> StasisResult<()> {
    let mut container = slot.lock().await;
    let result = checkpoint_locked(runtime, &mut container, opts).await;

    let label = match &result {
        Ok(()) => metrics::RESULT_OK,
        Err(StasisError::Bookkeeping { .. }) => metrics::RESULT_INCONSISTENT,
        Err(_) => metrics::RESULT_ERROR,
    };
    metrics::CHECKPOINTS.with_label_values(&[label]).inc();

    result
}

async fn checkpoint_locked(
    runtime: &Runtime,
    container: &mut Container,
    opts: &SnapshotOptions,
) -> StasisResult<()> {
    let id = container.id.clone();

    if !container.is_running() {
        return Err(PreconditionError::NotRunning(id).into());
    }

    let opts = opts.resolve(&container.root);
    create_snapshot_dirs(&opts).map_err(|source| StasisError::Setup {
        container: id.clone(),
        step: SetupStep::Directories,
        source,
    })?;

    let start = Instant::now();
    let handle = container.handle();

    tracing::debug!(
        container = %id,
        images = %opts.images_dir().display(),
        leave_running = opts.leave_running,
        "Capturing process state"
    );

    runtime
        .engine
        .capture(&handle, &opts)
        .await
        .map_err(|source| {
            tracing::error!(container = %id, error = %source, "Checkpoint capture failed");
            StasisError::Snapshot {
                container: id.clone(),
                action: "checkpoint",
                source,
            }
        })?;

    container.state.set_checkpointed(opts.leave_running);

    if !opts.leave_running {
        // The supervised tree ended with the capture.
        container.monitor = None;
        release_resources(runtime, &handle).await;
    }

    // Fresh handle: a stopped container has no pid left to pause.
    let image_id = match runtime
        .layers
        .commit(&container.handle(), CommitConfig { pause: true })
        .await
    {
        Ok(image_id) => image_id,
        Err(e) => {
            if let Err(pe) = runtime.store.persist(container) {
                tracing::warn!(container = %id, error = %pe, "Failed to persist state");
            }
            runtime.links.publish(container);
            return Err(bookkeeping(container, "filesystem commit", e.to_string()));
        }
    };

    let images_dir = opts.images_dir().to_path_buf();
    if let Some(previous) = container
        .checkpoint_images
        .record(images_dir.clone(), image_id.clone())
    {
        tracing::debug!(
            container = %id,
            images = %images_dir.display(),
            previous = %previous,
            "Replaced checkpoint image mapping"
        );
    }
    container.image_id = Some(image_id.clone());

    runtime
        .store
        .persist(container)
        .map_err(|e| bookkeeping(container, "state persistence", e.to_string()))?;

    runtime.links.publish(container);
    runtime
        .events
        .emit(&id, &container.name, EventAction::Checkpoint, None);

    tracing::info!(
        container = %id,
        images = %images_dir.display(),
        image = %image_id,
        leave_running = opts.leave_running,
        elapsed_ms = start.elapsed().as_millis(),
        "Container checkpointed"
    );

    Ok(())
}

fn bookkeeping(container: &Container, step: &'static str, reason: String) -> StasisError {
    tracing::warn!(
        container = %container.id,
        step = step,
        error = %reason,
        "Checkpoint captured but not recorded"
    );
    StasisError::Bookkeeping {
        container: container.id.clone(),
        step,
        reason,
    }
}
