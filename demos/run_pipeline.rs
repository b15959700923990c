//! Run both pipeline phases with terminal progress bars
//!
//! Usage:
//!   cargo run --example run_pipeline [config.json]
//!
//! Without a config file the defaults apply: sprites 001..151 are fetched into
//! `./pokemon_dataset` and the filtered copies land in `./pokemon_processed`.
//! Set `RUST_LOG=sprite_pipeline=debug` for per-item logging.

use sprite_pipeline::progress::spawn_progress_bars;
use sprite_pipeline::{Config, Pipeline, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(std::path::Path::new(&path))?,
        None => Config::default(),
    };

    let pipeline = Pipeline::new(config)?;
    let settings = pipeline.config();
    println!(
        "Fetching {} sprites with {} range workers, transforming with {} workers",
        settings.fetch.count, settings.fetch.range_workers, settings.transform.pool_size
    );

    let renderer = spawn_progress_bars(pipeline.subscribe());

    let result = run_with_shutdown(&pipeline).await;
    let interrupted = pipeline.is_shut_down();

    // The renderer exits once every event sender is gone
    drop(pipeline);
    if let Err(e) = renderer.await {
        tracing::error!(error = %e, "Progress renderer panicked");
    }

    let summary = result?;
    if interrupted {
        println!("Interrupted, partial results:");
    }
    for report in [&summary.fetch, &summary.transform] {
        println!("{report}");
        if let Some(avg) = report.average_per_item() {
            println!("  average per item: {:.3}s", avg.as_secs_f64());
        }
    }
    println!("Total time: {:.2}s", summary.total_elapsed().as_secs_f64());

    Ok(())
}
