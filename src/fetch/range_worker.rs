//! Range-worker execution: bounded fan-out over one index range.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::FetchError;
use crate::types::{Event, FetchTask, IndexRange, ItemOutcome, Phase, staging_path};

use super::FetchContext;

/// Fetch every index in `range`, at most `ctx.max_in_flight` at a time.
///
/// Returns one outcome per index. Never fails: per-index errors are logged and
/// reported as [`ItemOutcome::Failed`].
pub(super) async fn run_range_worker(
    ctx: Arc<FetchContext>,
    range: IndexRange,
) -> Vec<ItemOutcome> {
    tracing::debug!(
        range_start = range.start,
        range_end = range.end,
        "Range worker started"
    );

    let outcomes: Vec<ItemOutcome> = stream::iter(range.iter())
        .map(|index| {
            let ctx = Arc::clone(&ctx);
            async move {
                let task = FetchTask::new(index, &ctx.base_url, &ctx.extension);
                fetch_one(&ctx, task).await
            }
        })
        .buffer_unordered(ctx.max_in_flight)
        .collect()
        .await;

    tracing::debug!(
        range_start = range.start,
        range_end = range.end,
        "Range worker finished"
    );
    outcomes
}

/// Fetch and persist a single task, then record it in the shared progress.
///
/// Cancelled tasks return [`ItemOutcome::Skipped`] without touching the progress counter.
async fn fetch_one(ctx: &FetchContext, task: FetchTask) -> ItemOutcome {
    if ctx.cancel_token.is_cancelled() {
        return ItemOutcome::Skipped;
    }

    let result = tokio::select! {
        result = fetch_and_store(ctx, &task) => result,
        _ = ctx.cancel_token.cancelled() => {
            tracing::debug!(file_name = task.file_name(), "Fetch abandoned on cancellation");
            return ItemOutcome::Skipped;
        }
    };

    let outcome = match result {
        Ok(bytes) => {
            tracing::debug!(
                index = task.index(),
                file_name = task.file_name(),
                bytes,
                "Fetched image"
            );
            ItemOutcome::Succeeded
        }
        Err(e) => {
            tracing::warn!(
                index = task.index(),
                file_name = task.file_name(),
                error = %e,
                "Failed to fetch image"
            );
            ctx.event_tx
                .send(Event::ItemFailed {
                    phase: Phase::Fetch,
                    file_name: task.file_name().to_string(),
                    error: e.to_string(),
                })
                .ok();
            ItemOutcome::Failed
        }
    };

    ctx.progress.increment();
    outcome
}

/// Download the task's bytes and write them verbatim, replacing any existing file.
///
/// Returns the number of bytes written.
async fn fetch_and_store(ctx: &FetchContext, task: &FetchTask) -> Result<usize, FetchError> {
    let bytes = ctx.source.fetch(task).await?;
    let path = ctx.dest_dir.join(task.file_name());
    write_image(&path, &bytes).await?;
    Ok(bytes.len())
}

/// Write to a staging file and rename it over `path`.
///
/// A failed write leaves `path` as it was, so a partial body is never listed by the
/// transform phase.
async fn write_image(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let staging = staging_path(path);
    let result = match tokio::fs::write(&staging, bytes).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(e) => Err(e),
    };

    if let Err(source) = result {
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            tracing::trace!(path = %staging.display(), error = %e, "No staging file to remove");
        }
        return Err(FetchError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
