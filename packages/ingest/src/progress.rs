//! Spinner rendering for the ingest run.
//!
//! The dump carries no record count up front, so there is nothing to
//! draw a bar against; a single spinner tracks rows written while the
//! pipeline's periodic snapshot feeds the message line.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use geochron_pipeline::progress::IngestProgress;
use geochron_pipeline::stats::PipelineStats;
use indicatif::{ProgressBar, ProgressStyle};

/// An `indicatif` spinner driven by [`IngestProgress`] events.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    /// Creates the spinner and starts its steady tick.
    #[must_use]
    pub fn start() -> Arc<dyn IngestProgress> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {pos} rows | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Arc::new(Self { bar })
    }
}

impl IngestProgress for SpinnerProgress {
    fn rows_written(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn on_tick(&self, stats: &PipelineStats) {
        // The spinner position already shows rows, so the message only
        // carries the byte-level view of the stream.
        #[allow(clippy::cast_precision_loss)]
        let mib = |v: u64| v as f64 / 1_048_576.0;
        self.bar.set_message(format!(
            "{:.1} MiB read, {:.1} MiB decoded, {} items parsed",
            mib(stats.bytes_read.load(Ordering::Relaxed)),
            mib(stats.bytes_decompressed.load(Ordering::Relaxed)),
            stats.items_parsed.load(Ordering::Relaxed),
        ));
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}
