// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Prometheus metrics for checkpoint and restore.

use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};

lazy_static! {
    pub static ref CHECKPOINTS: IntCounterVec = register_int_counter_vec!(
        "stasis_checkpoints_total",
        "Checkpoint attempts by result",
        &["result"]
    )
    .unwrap();
    pub static ref RESTORES: IntCounterVec = register_int_counter_vec!(
        "stasis_restores_total",
        "Restore attempts by result",
        &["result"]
    )
    .unwrap();
    pub static ref RESTORE_DURATION: Histogram = register_histogram!(
        "stasis_restore_duration_seconds",
        "Time from restore request until the restored process is running",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

/// Label for a successful transition.
pub const RESULT_OK: &str = "ok";
/// Label for a transition that was rejected or failed.
pub const RESULT_ERROR: &str = "error";
/// Label for a checkpoint whose capture succeeded but recording failed.
pub const RESULT_INCONSISTENT: &str = "inconsistent";

/// Render all registered metrics in the text exposition format.
pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("Encoding error"))
}
