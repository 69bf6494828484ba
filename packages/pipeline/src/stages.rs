//! The four stage loops: read, decompress, parse, persist.
//!
//! Every stage runs the same pattern: loop on its input queue, flush on
//! end of stream, mark its output queue ended, return. A closed queue
//! under a send is the run-wide stop signal; the stage simply returns
//! so the orchestrator can surface the originating error.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncReadExt as _;

use geochron_database::{PersistSummary, Persister};
use geochron_models::Item;
use geochron_parse::{extract_item, LineBatch};

use crate::decompress::{detect_codec, StreamDecoder, MAGIC_LEN};
use crate::progress::IngestProgress;
use crate::stats::PipelineStats;
use crate::{PipelineError, Queues};

/// Reads the compressed input in fixed-size chunks.
pub(crate) async fn read_stage(
    input: PathBuf,
    chunk_size: usize,
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
) -> Result<(), PipelineError> {
    let mut file = tokio::fs::File::open(&input)
        .await
        .map_err(PipelineError::Read)?;
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = file.read(&mut buf).await.map_err(PipelineError::Read)?;
        if n == 0 {
            log::info!("Input end reached");
            queues.chunks.mark_end();
            return Ok(());
        }
        stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);

        if queues.chunks.send(buf[..n].to_vec()).await.is_err() {
            // Run-wide stop; the originating stage reports the error.
            return Ok(());
        }
    }
}

/// Decompresses chunks and cuts the output into line batches.
pub(crate) async fn decompress_stage(
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
) -> Result<(), PipelineError> {
    let mut decoder: Option<StreamDecoder> = None;
    let mut sniff: Vec<u8> = Vec::new();

    while let Some(chunk) = queues.chunks.recv().await {
        if let Some(dec) = decoder.as_mut() {
            write_counted(dec, &chunk, &stats)?;
        } else {
            // Identify the codec from the first bytes of the stream.
            sniff.extend_from_slice(&chunk);
            if sniff.len() < MAGIC_LEN {
                continue;
            }
            let codec = detect_codec(&sniff).ok_or(PipelineError::UnknownCodec)?;
            log::info!("Detected {codec}-compressed input");

            let mut dec = StreamDecoder::new(codec).map_err(PipelineError::Decompress)?;
            let head = std::mem::take(&mut sniff);
            write_counted(&mut dec, &head, &stats)?;
            decoder = Some(dec);
        }
        let Some(dec) = decoder.as_mut() else { continue };

        let mut batch = LineBatch::default();
        if batch.take_lines(dec.buffer_mut()) > 0 {
            stats
                .lines_extracted
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            if queues.batches.send(batch).await.is_err() {
                return Ok(());
            }
        }
    }

    if let Some(dec) = decoder.as_mut() {
        dec.finish().map_err(PipelineError::Decompress)?;

        let buf = dec.buffer_mut();
        if !buf.is_empty() {
            // Synthetic newline so the final record is extracted.
            buf.push(b'\n');
            let mut batch = LineBatch::default();
            if batch.take_lines(buf) > 0 {
                stats
                    .lines_extracted
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                let _ = queues.batches.send(batch).await;
            }
        }
    } else if !sniff.is_empty() {
        // Fewer magic bytes than any supported codec produces.
        return Err(PipelineError::UnknownCodec);
    }

    queues.batches.mark_end();
    Ok(())
}

fn write_counted(
    dec: &mut StreamDecoder,
    bytes: &[u8],
    stats: &PipelineStats,
) -> Result<(), PipelineError> {
    let before = dec.buffer_mut().len();
    dec.write(bytes).map_err(PipelineError::Decompress)?;
    let produced = dec.buffer_mut().len() - before;
    stats
        .bytes_decompressed
        .fetch_add(produced as u64, Ordering::Relaxed);
    Ok(())
}

/// Parses each line of each batch; bad lines are dropped. May run as
/// several workers sharing both queues.
pub(crate) async fn parse_stage(
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
) -> Result<(), PipelineError> {
    let mut items: Vec<Item> = Vec::new();

    while let Some(mut batch) = queues.batches.recv().await {
        for i in 0..batch.len() {
            if let Some(item) = extract_item(batch.line_mut(i)) {
                items.push(item);
            }
        }
        stats
            .items_parsed
            .fetch_add(items.len() as u64, Ordering::Relaxed);

        if queues.items.force_send_all(&mut items).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

/// Runs the classifier, location resolver, and bulk inserts; after the
/// stream ends, drains the second pass and writes class stats.
pub(crate) async fn persist_stage(
    mut persister: Persister,
    queues: Arc<Queues>,
    stats: Arc<PipelineStats>,
    progress: Arc<dyn IngestProgress>,
) -> Result<PersistSummary, PipelineError> {
    let mut batch: Vec<Item> = Vec::new();

    while let Some(item) = queues.items.recv().await {
        batch.push(item);
        queues.items.force_recv_all(&mut batch);

        let n = persister
            .intake(std::mem::take(&mut batch))
            .map_err(PipelineError::Persist)?;
        stats.items_persisted.fetch_add(n, Ordering::Relaxed);
        progress.rows_written(n);
    }

    let summary = persister.finish().map_err(PipelineError::Persist)?;
    stats
        .items_persisted
        .fetch_add(summary.resolved_second_pass, Ordering::Relaxed);
    progress.rows_written(summary.resolved_second_pass);

    Ok(summary)
}
