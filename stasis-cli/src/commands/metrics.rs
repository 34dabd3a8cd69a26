// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metrics export for `--metrics-file`.
//!
//! Each CLI run writes its counters in the Prometheus text format, suitable
//! for the node exporter textfile collector.

use std::path::Path;

/// Atomically replace `path` with the current metrics.
pub fn write(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, stasis_core::metrics::render())?;
    std::fs::rename(&tmp, path)
}
