//! Shared per-stage throughput counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone counters updated by the stages and read by the periodic
/// reporter. All loads/stores are relaxed; the numbers are diagnostic.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Compressed bytes read from the input file.
    pub bytes_read: AtomicU64,
    /// Bytes produced by the decompressor.
    pub bytes_decompressed: AtomicU64,
    /// Record lines cut out of the stream.
    pub lines_extracted: AtomicU64,
    /// Items accepted by the parser.
    pub items_parsed: AtomicU64,
    /// Rows written by the persister (both passes).
    pub items_persisted: AtomicU64,
}

impl PipelineStats {
    /// One-line human-readable snapshot.
    #[must_use]
    pub fn render(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let mib = |v: u64| v as f64 / 1_048_576.0;
        format!(
            "read {:.1} MiB, decompressed {:.1} MiB, {} lines, {} items parsed, {} persisted",
            mib(self.bytes_read.load(Ordering::Relaxed)),
            mib(self.bytes_decompressed.load(Ordering::Relaxed)),
            self.lines_extracted.load(Ordering::Relaxed),
            self.items_parsed.load(Ordering::Relaxed),
            self.items_persisted.load(Ordering::Relaxed),
        )
    }
}
