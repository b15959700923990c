//! # sprite-pipeline
//!
//! Two-phase concurrent batch pipeline for numbered image collections.
//!
//! 1. **Fetch**: the index range `[1, n]` is partitioned across range-workers; each
//!    worker downloads its indices concurrently (bounded) and writes `NNN.png` files.
//!    A shared counter tracks handled items and is sampled for progress.
//! 2. **Transform**: every fetched file is pushed through a fixed filter chain on a
//!    bounded pool of blocking workers and saved under the same name.
//!
//! Per-item failures never abort a phase: they are logged, published as
//! [`Event::ItemFailed`], and counted in the phase's [`PhaseReport`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use sprite_pipeline::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.fetch.count = 151;
//!     config.fetch.range_workers = 8;
//!     config.transform.pool_size = 8;
//!
//!     let pipeline = Pipeline::new(config)?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("{}\n{}", summary.fetch, summary.transform);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch phase: partitioning, image sources, range-workers
pub mod fetch;
/// Pipeline facade composing both phases
pub mod pipeline;
/// Shared progress counter, poller and progress bars
pub mod progress;
/// Transform phase: filter chain, listing, worker pool
pub mod transform;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, FetchConfig, ProgressConfig, TransformConfig};
pub use error::{Error, FetchError, Result, TransformError};
pub use fetch::{HttpImageSource, ImageSource, partition};
pub use pipeline::Pipeline;
pub use progress::SharedProgress;
pub use transform::{ImageTransform, SpriteFilterChain, TransformTask};
pub use types::{
    Event, FetchTask, IndexRange, ItemOutcome, Phase, PhaseReport, PipelineSummary,
};

/// Run the pipeline, cancelling it when a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// On a signal the pipeline stops dispatching new items and the phases return
/// reports with the undispatched items counted as skipped.
///
/// # Example
///
/// ```no_run
/// use sprite_pipeline::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///     let summary = run_with_shutdown(&pipeline).await?;
///     println!("total: {:.2}s", summary.total_elapsed().as_secs_f64());
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: &Pipeline) -> Result<PipelineSummary> {
    let run = pipeline.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = wait_for_signal() => {
            pipeline.shutdown();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
