//! Progress tracking and rendering.
//!
//! - [`SharedProgress`] is the counter every fetch worker bumps once per handled index.
//! - [`spawn_progress_poller`] samples that counter on a fixed interval and publishes
//!   [`Event::FetchProgress`].
//! - [`spawn_progress_bars`] turns the event stream into terminal progress bars.
//!
//! Nothing in here feeds back into control flow; dropping every subscriber leaves the
//! pipeline's behavior unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::types::{Event, Phase, percent_of, rate_per_sec};

/// Monotonic counter of handled fetch tasks, shared across range-workers
///
/// Cloning is cheap and every clone observes the same count.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    completed: Arc<AtomicU64>,
}

impl SharedProgress {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one handled task and return the new count
    pub fn increment(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current count
    pub fn get(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

/// Parameters for spawning the fetch progress poller
pub(crate) struct ProgressPollerParams {
    /// Number of fetch tasks in the phase
    pub total: u64,
    /// Phase start time
    pub started: Instant,
    /// Counter shared with the range-workers
    pub progress: SharedProgress,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Sampling interval
    pub interval: Duration,
    /// Stops the poller
    pub cancel_token: CancellationToken,
}

/// Spawn a background task that samples [`SharedProgress`] and publishes fetch progress.
///
/// A sample is only published when the count moved since the previous one.
pub(crate) fn spawn_progress_poller(params: ProgressPollerParams) -> tokio::task::JoinHandle<()> {
    let ProgressPollerParams {
        total,
        started,
        progress,
        event_tx,
        interval,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_seen = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let completed = progress.get();
                    if last_seen != Some(completed) {
                        last_seen = Some(completed);
                        publish_fetch_sample(&event_tx, completed, total, started.elapsed());
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}

/// Publish one fetch progress sample. Send errors (no subscribers) are ignored.
pub(crate) fn publish_fetch_sample(
    event_tx: &broadcast::Sender<Event>,
    completed: u64,
    total: u64,
    elapsed: Duration,
) {
    event_tx
        .send(Event::FetchProgress {
            completed,
            total,
            percent: percent_of(completed, total),
            items_per_sec: rate_per_sec(completed, elapsed),
        })
        .ok();
}

/// Create a progress bar for one pipeline phase
pub fn create_phase_bar(phase: Phase, total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg:<12} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(match phase {
        Phase::Fetch => "Downloading",
        Phase::Transform => "Processing",
    });
    pb
}

/// Render pipeline events as terminal progress bars until the event channel closes.
///
/// Failed items are printed above the bars so they do not corrupt the display.
pub fn spawn_progress_bars(mut events: broadcast::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut bars: HashMap<Phase, ProgressBar> = HashMap::new();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress renderer lagged behind events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                Event::PhaseStarted { phase, total } => {
                    bars.insert(phase, create_phase_bar(phase, total));
                }
                Event::FetchProgress { completed, .. } => {
                    if let Some(bar) = bars.get(&Phase::Fetch) {
                        bar.set_position(completed);
                    }
                }
                Event::TransformProgress { completed, .. } => {
                    if let Some(bar) = bars.get(&Phase::Transform) {
                        bar.set_position(completed);
                    }
                }
                Event::ItemFailed {
                    phase,
                    file_name,
                    error,
                } => {
                    let line = format!("  error {phase} {file_name}: {error}");
                    match bars.get(&phase) {
                        Some(bar) => bar.println(line),
                        None => eprintln!("{line}"),
                    }
                }
                Event::PhaseComplete { phase, .. } => {
                    if let Some(bar) = bars.remove(&phase) {
                        bar.finish();
                    }
                }
            }
        }

        for bar in bars.into_values() {
            bar.abandon();
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_returns_running_count() {
        let progress = SharedProgress::new();
        assert_eq!(progress.get(), 0);
        assert_eq!(progress.increment(), 1);
        assert_eq!(progress.increment(), 2);
        assert_eq!(progress.get(), 2);
    }

    #[test]
    fn clones_share_one_counter() {
        let progress = SharedProgress::new();
        let clone = progress.clone();
        clone.increment();
        clone.increment();
        assert_eq!(progress.get(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_never_lost() {
        let progress = SharedProgress::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let progress = progress.clone();
                tokio::spawn(async move {
                    for _ in 0..250 {
                        progress.increment();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(progress.get(), 2000);
    }

    #[tokio::test]
    async fn poller_publishes_only_when_count_changes() {
        let (event_tx, mut event_rx) = broadcast::channel(64);
        let progress = SharedProgress::new();
        let cancel_token = CancellationToken::new();

        let handle = spawn_progress_poller(ProgressPollerParams {
            total: 4,
            started: Instant::now(),
            progress: progress.clone(),
            event_tx,
            interval: Duration::from_millis(10),
            cancel_token: cancel_token.clone(),
        });

        // First tick fires immediately with the initial count.
        let first = event_rx.recv().await.unwrap();
        assert!(matches!(first, Event::FetchProgress { completed: 0, total: 4, .. }));

        progress.increment();
        progress.increment();

        let second = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .expect("poller should publish the new count")
            .unwrap();
        match second {
            Event::FetchProgress {
                completed, percent, ..
            } => {
                assert_eq!(completed, 2);
                assert_eq!(percent, 50.0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Unchanged count: nothing more is published.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(event_rx.try_recv().is_err());

        cancel_token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn poller_samples_are_non_decreasing() {
        let (event_tx, mut event_rx) = broadcast::channel(1024);
        let progress = SharedProgress::new();
        let cancel_token = CancellationToken::new();

        let handle = spawn_progress_poller(ProgressPollerParams {
            total: 50,
            started: Instant::now(),
            progress: progress.clone(),
            event_tx,
            interval: Duration::from_millis(1),
            cancel_token: cancel_token.clone(),
        });

        for _ in 0..50 {
            progress.increment();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_token.cancel();
        handle.await.unwrap();

        let mut previous = 0;
        while let Ok(event) = event_rx.try_recv() {
            if let Event::FetchProgress { completed, .. } = event {
                assert!(completed >= previous, "{completed} < {previous}");
                previous = completed;
            }
        }
        assert_eq!(previous, 50);
    }

    #[test]
    fn phase_bar_uses_total_as_length() {
        let pb = create_phase_bar(Phase::Fetch, 151);
        assert_eq!(pb.length(), Some(151));
    }

    #[tokio::test]
    async fn renderer_exits_when_channel_closes() {
        let (event_tx, event_rx) = broadcast::channel(16);
        let handle = spawn_progress_bars(event_rx);

        event_tx
            .send(Event::PhaseStarted {
                phase: Phase::Transform,
                total: 2,
            })
            .unwrap();
        event_tx
            .send(Event::TransformProgress {
                completed: 2,
                total: 2,
                percent: 100.0,
                items_per_sec: 1.0,
            })
            .unwrap();
        drop(event_tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("renderer should stop after the sender is dropped")
            .unwrap();
    }
}
