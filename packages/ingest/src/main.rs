#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! CLI tool that ingests a compressed Wikidata JSON dump into a compact
//! spatio-temporal `SQLite` index.

mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use geochron_pipeline::progress::{silent, IngestProgress as _};
use geochron_pipeline::{run, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "geochron_ingest",
    about = "Index spatio-temporal entities from a Wikidata JSON dump"
)]
struct Cli {
    /// Compressed dump file (gzip or zstd, auto-detected), e.g.
    /// `latest-all.json.zst`
    input: PathBuf,

    /// Output SQLite database path
    #[arg(long, default_value = "geochron.sqlite")]
    output: PathBuf,

    /// Number of JSON parser workers
    #[arg(long, default_value_t = 1)]
    parse_workers: usize,

    /// Compressed bytes per read
    #[arg(long, default_value_t = 1024 * 1024)]
    read_chunk_size: usize,

    /// Disable the progress spinner
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut config = PipelineConfig::new(cli.input, cli.output);
    config.parse_workers = cli.parse_workers.max(1);
    config.read_chunk_size = cli.read_chunk_size.max(4);

    let progress = if cli.quiet {
        silent()
    } else {
        progress::SpinnerProgress::start()
    };

    let start = Instant::now();
    log::info!(
        "Ingesting {} -> {} ({} parser worker(s))",
        config.input.display(),
        config.db_path.display(),
        config.parse_workers
    );

    match run(&config, progress.clone()).await {
        Ok(summary) => {
            progress.done();
            let elapsed = start.elapsed();
            log::info!(
                "Done in {:.1}s: {} rows ({} broken, {} resolved on second pass), \
                 {} classes, {} rows lost to insert errors",
                elapsed.as_secs_f64(),
                summary.persist.inserted,
                summary.persist.broken,
                summary.persist.resolved_second_pass,
                summary.persist.classes,
                summary.persist.failed_rows,
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            progress.done();
            eprintln!("geochron_ingest: {e}");
            ExitCode::FAILURE
        }
    }
}
