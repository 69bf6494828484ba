//! Progress reporting for the long-running ingest.
//!
//! The pipeline emits exactly two kinds of progress: row-count advances
//! from the persister as batches commit, and a periodic snapshot of the
//! stage counters from the reporter task. [`IngestProgress`] captures
//! that surface so the binary can render it (a spinner, say) without
//! the pipeline knowing about any rendering backend; how a snapshot is
//! turned into a message is the implementation's business.

use std::sync::Arc;

use crate::stats::PipelineStats;

/// Receives run progress from the pipeline.
///
/// Implementations must be `Send + Sync`: the persister task and the
/// periodic reporter both hold the callback across awaits.
pub trait IngestProgress: Send + Sync {
    /// The persister committed `delta` more rows (either pass).
    fn rows_written(&self, delta: u64);

    /// Periodic snapshot of the stage counters, on the reporter's
    /// cadence. Implementations read whichever counters they care to
    /// display.
    fn on_tick(&self, stats: &PipelineStats);

    /// The run ended, successfully or not; tear down any indicator.
    fn done(&self);
}

/// Silent implementation for tests and `--quiet` runs.
pub struct SilentProgress;

impl IngestProgress for SilentProgress {
    fn rows_written(&self, _delta: u64) {}
    fn on_tick(&self, _stats: &PipelineStats) {}
    fn done(&self) {}
}

/// Returns a shared [`SilentProgress`] instance for convenient use.
#[must_use]
pub fn silent() -> Arc<dyn IngestProgress> {
    Arc::new(SilentProgress)
}
