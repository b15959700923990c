//! Transform phase -- run the filter chain over every fetched image on a bounded pool.
//!
//! - [`chain`] - The [`ImageTransform`] seam, the sprite filter chain, decode/encode helpers
//! - [`listing`] - Sorted discovery of input files
//!
//! Items are independent: each one is decoded, transformed and saved on a blocking
//! worker, and any failure is confined to that item.

mod chain;
mod listing;


pub use chain::{
    EDGE_ENHANCE_MORE, ImageTransform, SpriteFilterChain, enhance_contrast, load_image,
    save_image,
};
pub use listing::list_images;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::TransformConfig;
use crate::error::{Error, Result, TransformError};
use crate::types::{Event, ItemOutcome, Phase, PhaseReport, percent_of, rate_per_sec};

/// One input image and where its output goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformTask {
    /// File name shared by input and output
    pub file_name: String,
    /// Full path of the input image
    pub source_path: PathBuf,
    /// Full path the transformed image is written to
    pub dest_path: PathBuf,
}

impl TransformTask {
    /// Build the task for `file_name` between the two directories
    pub fn new(file_name: &str, source_dir: &Path, dest_dir: &Path) -> Self {
        Self {
            file_name: file_name.to_string(),
            source_path: source_dir.join(file_name),
            dest_path: dest_dir.join(file_name),
        }
    }
}

/// Decode, transform and save one image. Blocking.
pub fn process_image(
    task: &TransformTask,
    transform: &dyn ImageTransform,
    quality: u8,
) -> std::result::Result<(), TransformError> {
    let image = load_image(&task.source_path)?;
    let output = transform.apply(image);
    save_image(&output, &task.dest_path, quality)
}

/// Parameters for running the transform phase
pub(crate) struct TransformPhaseParams<'a> {
    pub source_dir: &'a Path,
    pub config: &'a TransformConfig,
    pub extension: &'a str,
    pub transform: Arc<dyn ImageTransform>,
    pub event_tx: broadcast::Sender<Event>,
    pub cancel_token: CancellationToken,
}

/// Run the transform phase to completion.
///
/// Fails only when the destination directory cannot be created or the source
/// directory cannot be listed; per-image failures are logged and counted.
pub(crate) async fn run_transform_phase(params: TransformPhaseParams<'_>) -> Result<PhaseReport> {
    let TransformPhaseParams {
        source_dir,
        config,
        extension,
        transform,
        event_tx,
        cancel_token,
    } = params;

    tokio::fs::create_dir_all(&config.dest_dir)
        .await
        .map_err(|source| Error::DestinationDir {
            path: config.dest_dir.clone(),
            source,
        })?;
    let names = list_images(source_dir, extension).await?;
    let total = names.len() as u64;
    let pool_size = config.pool_size.max(1);

    tracing::info!(
        images = total,
        pool_size,
        source_dir = %source_dir.display(),
        dest_dir = %config.dest_dir.display(),
        "Starting transform phase"
    );
    event_tx
        .send(Event::PhaseStarted {
            phase: Phase::Transform,
            total,
        })
        .ok();

    let started = Instant::now();
    let quality = config.quality;
    let tasks: Vec<TransformTask> = names
        .iter()
        .map(|name| TransformTask::new(name, source_dir, &config.dest_dir))
        .collect();

    let completions = stream::iter(tasks)
        .map(|task| {
            let transform = Arc::clone(&transform);
            let cancel_token = cancel_token.clone();
            async move {
                if cancel_token.is_cancelled() {
                    return (task.file_name, None);
                }
                let file_name = task.file_name.clone();
                let result = tokio::task::spawn_blocking(move || {
                    process_image(&task, transform.as_ref(), quality)
                })
                .await
                .unwrap_or_else(|e| Err(TransformError::WorkerPanicked(e.to_string())));
                (file_name, Some(result))
            }
        })
        .buffer_unordered(pool_size);
    let mut completions = std::pin::pin!(completions);

    let mut outcomes = Vec::with_capacity(names.len());
    let mut finished = 0u64;
    while let Some((file_name, result)) = completions.next().await {
        let outcome = match result {
            None => ItemOutcome::Skipped,
            Some(Ok(())) => {
                tracing::debug!(file_name = %file_name, "Transformed image");
                ItemOutcome::Succeeded
            }
            Some(Err(e)) => {
                tracing::warn!(file_name = %file_name, error = %e, "Failed to transform image");
                event_tx
                    .send(Event::ItemFailed {
                        phase: Phase::Transform,
                        file_name,
                        error: e.to_string(),
                    })
                    .ok();
                ItemOutcome::Failed
            }
        };

        if outcome != ItemOutcome::Skipped {
            finished += 1;
            event_tx
                .send(Event::TransformProgress {
                    completed: finished,
                    total,
                    percent: percent_of(finished, total),
                    items_per_sec: rate_per_sec(finished, started.elapsed()),
                })
                .ok();
        }
        outcomes.push(outcome);
    }

    let report = PhaseReport::from_outcomes(Phase::Transform, outcomes, started.elapsed());
    event_tx.send(report.to_event()).ok();
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "Transform phase complete"
    );

    Ok(report)
}
