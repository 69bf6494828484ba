#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The bounded streaming pipeline: read, decompress, parse, persist.
//!
//! Four cooperative tasks connected by small fixed-capacity queues. The
//! reader feeds compressed chunks, the decompressor grows a byte buffer
//! and cuts it into line batches, a pool of parser workers extracts
//! items, and the persister classifies, resolves locations, and writes
//! `SQLite` rows. End of stream propagates queue by queue; the first
//! stage failure stops the run and surfaces a stage-named error.

pub mod decompress;
pub mod progress;
pub mod queue;
pub mod stats;

mod stages;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use geochron_database::{DbError, PersistSummary, Persister};
use geochron_models::Item;
use geochron_parse::LineBatch;

use crate::progress::IngestProgress;
use crate::queue::BoundedQueue;
use crate::stats::PipelineStats;

/// Raw chunks in flight between reader and decompressor.
const CHUNK_QUEUE_CAPACITY: usize = 3;
/// Line batches in flight between decompressor and parsers.
const BATCH_QUEUE_CAPACITY: usize = 26;
/// Items in flight between parsers and persister.
const ITEM_QUEUE_CAPACITY: usize = 126;

/// Default size of one compressed read.
const DEFAULT_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Period of the stdout stats report.
const REPORT_PERIOD: Duration = Duration::from_secs(10);

/// Errors that abort a run, named after the failing stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading the input file failed.
    #[error("read stage: {0}")]
    Read(#[source] std::io::Error),

    /// The decompressor hit a codec error.
    #[error("decompress stage: {0}")]
    Decompress(#[source] std::io::Error),

    /// The input matches no supported compression format.
    #[error("decompress stage: unrecognized compression format")]
    UnknownCodec,

    /// Opening or preparing the output database failed.
    #[error("database setup: {0}")]
    Setup(#[source] DbError),

    /// A transaction-level database failure.
    #[error("persist stage: {0}")]
    Persist(#[source] DbError),

    /// A stage task panicked or was torn down unexpectedly.
    #[error("stage task failed: {0}")]
    Join(#[source] tokio::task::JoinError),

    /// The persister ended without reporting totals (internal error).
    #[error("persist stage ended without reporting a summary")]
    MissingSummary,
}

/// Inputs of one ingest run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the compressed dump.
    pub input: PathBuf,
    /// Path of the `SQLite` database to produce.
    pub db_path: PathBuf,
    /// Number of parser workers (at least 1).
    pub parse_workers: usize,
    /// Size of one compressed read.
    pub read_chunk_size: usize,
}

impl PipelineConfig {
    /// Config with default worker count and chunk size.
    #[must_use]
    pub fn new(input: PathBuf, db_path: PathBuf) -> Self {
        Self {
            input,
            db_path,
            parse_workers: 1,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Compressed bytes read.
    pub bytes_read: u64,
    /// Decompressed bytes produced.
    pub bytes_decompressed: u64,
    /// Items accepted by the parsers.
    pub items_parsed: u64,
    /// Persister totals.
    pub persist: PersistSummary,
}

/// The three queue edges of one run.
pub(crate) struct Queues {
    pub chunks: BoundedQueue<Vec<u8>>,
    pub batches: BoundedQueue<LineBatch>,
    pub items: BoundedQueue<Item>,
}

impl Queues {
    fn new() -> Self {
        Self {
            chunks: BoundedQueue::new(CHUNK_QUEUE_CAPACITY),
            batches: BoundedQueue::new(BATCH_QUEUE_CAPACITY),
            items: BoundedQueue::new(ITEM_QUEUE_CAPACITY),
        }
    }

    /// Run-wide stop: every blocked queue call observes end of stream.
    fn shutdown(&self) {
        self.chunks.mark_end();
        self.batches.mark_end();
        self.items.mark_end();
    }
}

/// Runs the full pipeline to completion.
///
/// Spawns the stages on the current runtime, joins them with
/// until-first-failure semantics, and reports periodic throughput and
/// queue-wait diagnostics while running.
///
/// # Errors
///
/// Returns the first stage error; partial output remains on disk.
pub async fn run(
    config: &PipelineConfig,
    progress: Arc<dyn IngestProgress>,
) -> Result<RunSummary, PipelineError> {
    let conn = geochron_database::open(&config.db_path).map_err(PipelineError::Setup)?;
    let persister = Persister::new(conn);

    let queues = Arc::new(Queues::new());
    let stats = Arc::new(PipelineStats::default());

    let mut tasks: JoinSet<Result<Option<PersistSummary>, PipelineError>> = JoinSet::new();

    tasks.spawn({
        let queues = Arc::clone(&queues);
        let stats = Arc::clone(&stats);
        let input = config.input.clone();
        let chunk_size = config.read_chunk_size;
        async move {
            stages::read_stage(input, chunk_size, queues, stats)
                .await
                .map(|()| None)
        }
    });

    tasks.spawn({
        let queues = Arc::clone(&queues);
        let stats = Arc::clone(&stats);
        async move { stages::decompress_stage(queues, stats).await.map(|()| None) }
    });

    // Parser pool plus a coordinator that marks the item queue ended
    // once every worker has drained its input.
    tasks.spawn({
        let queues = Arc::clone(&queues);
        let stats = Arc::clone(&stats);
        let workers = config.parse_workers.max(1);
        async move {
            let mut pool = JoinSet::new();
            for _ in 0..workers {
                pool.spawn(stages::parse_stage(
                    Arc::clone(&queues),
                    Arc::clone(&stats),
                ));
            }

            let mut result = Ok(None);
            while let Some(joined) = pool.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        pool.abort_all();
                        result = Err(e);
                        break;
                    }
                    Err(e) => {
                        pool.abort_all();
                        result = Err(PipelineError::Join(e));
                        break;
                    }
                }
            }
            queues.items.mark_end();
            result
        }
    });

    tasks.spawn({
        let queues = Arc::clone(&queues);
        let stats = Arc::clone(&stats);
        let progress = Arc::clone(&progress);
        async move {
            stages::persist_stage(persister, queues, stats, progress)
                .await
                .map(Some)
        }
    });

    let reporter = tokio::spawn(report_loop(
        Arc::clone(&queues),
        Arc::clone(&stats),
        Arc::clone(&progress),
    ));

    let mut summary = None;
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Some(s))) => summary = Some(s),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                failure = Some(e);
                queues.shutdown();
                tasks.abort_all();
                break;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                failure = Some(PipelineError::Join(e));
                queues.shutdown();
                tasks.abort_all();
                break;
            }
        }
    }
    while tasks.join_next().await.is_some() {}
    reporter.abort();

    if let Some(e) = failure {
        return Err(e);
    }
    let persist = summary.ok_or(PipelineError::MissingSummary)?;

    log::info!("Run complete: {}", stats.render());
    Ok(RunSummary {
        bytes_read: stats.bytes_read.load(Ordering::Relaxed),
        bytes_decompressed: stats.bytes_decompressed.load(Ordering::Relaxed),
        items_parsed: stats.items_parsed.load(Ordering::Relaxed),
        persist,
    })
}

/// Logs throughput and queue-wait diagnostics until aborted.
async fn report_loop(
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
    progress: Arc<dyn IngestProgress>,
) {
    let mut interval = tokio::time::interval(REPORT_PERIOD);
    interval.tick().await; // the first tick fires immediately

    loop {
        interval.tick().await;
        progress.on_tick(&stats);
        log::info!("{}", stats.render());

        let pct = |r: f64| 100.0 * r;
        log::info!(
            "queue waits: read->decompress enqueue={:.1}% dequeue={:.1}%, \
             decompress->parse enqueue={:.1}% dequeue={:.1}%, \
             parse->persist enqueue={:.1}% dequeue={:.1}%",
            pct(queues.chunks.stats().enqueue_wait_ratio()),
            pct(queues.chunks.stats().dequeue_wait_ratio()),
            pct(queues.batches.stats().enqueue_wait_ratio()),
            pct(queues.batches.stats().dequeue_wait_ratio()),
            pct(queues.items.stats().enqueue_wait_ratio()),
            pct(queues.items.stats().dequeue_wait_ratio()),
        );
    }
}
