//! Fetch phase -- partition the index range and download every image.
//!
//! Split into focused submodules:
//! - [`partition`] - Splitting `[1, n]` into per-worker ranges
//! - [`source`] - The [`ImageSource`] seam and its HTTP implementation
//! - `range_worker` - Bounded per-index fan-out inside one range
//!
//! Each range runs on its own spawned task. The only state shared between range-workers
//! is the [`SharedProgress`] counter.

mod partition;
mod range_worker;
mod source;


pub use partition::partition;
pub use source::{HttpImageSource, ImageSource};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::progress::{
    ProgressPollerParams, SharedProgress, publish_fetch_sample, spawn_progress_poller,
};
use crate::types::{Event, ItemOutcome, Phase, PhaseReport};

/// State shared by every range-worker of one fetch phase.
pub(crate) struct FetchContext {
    pub(crate) source: Arc<dyn ImageSource>,
    pub(crate) dest_dir: PathBuf,
    pub(crate) base_url: String,
    pub(crate) extension: String,
    pub(crate) max_in_flight: usize,
    pub(crate) progress: SharedProgress,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
}

/// Parameters for running the fetch phase
pub(crate) struct FetchPhaseParams<'a> {
    pub config: &'a FetchConfig,
    pub source: Arc<dyn ImageSource>,
    pub progress: SharedProgress,
    pub poll_interval: Duration,
    pub event_tx: broadcast::Sender<Event>,
    pub cancel_token: CancellationToken,
}

/// Run the fetch phase to completion.
///
/// Fails only when the destination directory cannot be created; every per-image
/// failure is logged and counted in the returned report.
pub(crate) async fn run_fetch_phase(params: FetchPhaseParams<'_>) -> Result<PhaseReport> {
    let FetchPhaseParams {
        config,
        source,
        progress,
        poll_interval,
        event_tx,
        cancel_token,
    } = params;

    tokio::fs::create_dir_all(&config.dest_dir)
        .await
        .map_err(|source| Error::DestinationDir {
            path: config.dest_dir.clone(),
            source,
        })?;

    let total = u64::from(config.count);
    let ranges = partition(config.count, config.range_workers);

    tracing::info!(
        count = config.count,
        range_workers = config.range_workers,
        dest_dir = %config.dest_dir.display(),
        "Starting fetch phase"
    );
    event_tx
        .send(Event::PhaseStarted {
            phase: Phase::Fetch,
            total,
        })
        .ok();

    let started = Instant::now();
    let poller_token = cancel_token.child_token();
    let poller = spawn_progress_poller(ProgressPollerParams {
        total,
        started,
        progress: progress.clone(),
        event_tx: event_tx.clone(),
        interval: poll_interval,
        cancel_token: poller_token.clone(),
    });

    let ctx = Arc::new(FetchContext {
        source,
        dest_dir: config.dest_dir.clone(),
        base_url: config.base_url.clone(),
        extension: config.extension.clone(),
        max_in_flight: config.max_in_flight_per_range.max(1),
        progress: progress.clone(),
        event_tx: event_tx.clone(),
        cancel_token,
    });

    let workers: Vec<_> = ranges
        .into_iter()
        .map(|range| {
            let handle = tokio::spawn(range_worker::run_range_worker(Arc::clone(&ctx), range));
            (range, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(config.count as usize);
    for (range, handle) in workers {
        match handle.await {
            Ok(range_outcomes) => outcomes.extend(range_outcomes),
            Err(e) => {
                tracing::error!(
                    range_start = range.start,
                    range_end = range.end,
                    error = %e,
                    "Range worker panicked"
                );
                outcomes.extend(std::iter::repeat_n(ItemOutcome::Failed, range.len()));
            }
        }
    }

    poller_token.cancel();
    if let Err(e) = poller.await {
        tracing::error!(error = %e, "Progress poller panicked");
    }
    let elapsed = started.elapsed();
    publish_fetch_sample(&event_tx, progress.get(), total, elapsed);

    let report = PhaseReport::from_outcomes(Phase::Fetch, outcomes, elapsed);
    event_tx.send(report.to_event()).ok();
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        elapsed_secs = elapsed.as_secs_f64(),
        "Fetch phase complete"
    );

    Ok(report)
}
