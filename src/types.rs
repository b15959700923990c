//! Core types and events for sprite-pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A single image to fetch, identified by its 1-based index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTask {
    index: u32,
    file_name: String,
    url: String,
}

impl FetchTask {
    /// Build the task for `index`, deriving its file name and URL
    ///
    /// ```
    /// use sprite_pipeline::FetchTask;
    ///
    /// let task = FetchTask::new(7, "https://example.com/images/", "png");
    /// assert_eq!(task.file_name(), "007.png");
    /// assert_eq!(task.url(), "https://example.com/images/007.png");
    /// ```
    pub fn new(index: u32, base_url: &str, extension: &str) -> Self {
        let file_name = format!("{index:03}.{extension}");
        let url = format!("{}/{}", base_url.trim_end_matches('/'), file_name);
        Self {
            index,
            file_name,
            url,
        }
    }

    /// 1-based index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Zero-padded file name (e.g. `007.png`)
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Source URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Closed range of indices assigned to one range-worker
///
/// A range with `start > end` is empty. Empty ranges appear when there are more
/// workers than items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    /// First index (inclusive)
    pub start: u32,
    /// Last index (inclusive)
    pub end: u32,
}

impl IndexRange {
    /// Create a new range
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of indices in the range
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    /// Whether the range holds no indices
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Iterate the indices in ascending order
    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// Pipeline phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Downloading source images
    Fetch,
    /// Applying the transform chain
    Transform,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Fetch => write!(f, "fetch"),
            Phase::Transform => write!(f, "transform"),
        }
    }
}

/// How a single item ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Output written
    Succeeded,
    /// Attempted and failed (already logged)
    Failed,
    /// Never attempted because the phase was cancelled
    Skipped,
}

/// Events published while the pipeline runs
///
/// Delivered over a broadcast channel; see [`Pipeline::subscribe`](crate::Pipeline::subscribe).
/// Slow subscribers miss events rather than slowing the pipeline down.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A phase is starting with a known number of items
    PhaseStarted {
        /// Which phase
        phase: Phase,
        /// Number of items the phase will attempt
        total: u64,
    },

    /// Sampled fetch progress
    FetchProgress {
        /// Items handled so far (succeeded or failed)
        completed: u64,
        /// Total items in the phase
        total: u64,
        /// Completion percentage (0.0 to 100.0)
        percent: f32,
        /// Average handled items per second since the phase started
        items_per_sec: f64,
    },

    /// One transform item finished
    TransformProgress {
        /// Items finished so far (succeeded or failed)
        completed: u64,
        /// Total items in the phase
        total: u64,
        /// Completion percentage (0.0 to 100.0)
        percent: f32,
        /// Average finished items per second since the phase started
        items_per_sec: f64,
    },

    /// An item failed and was skipped
    ItemFailed {
        /// Which phase
        phase: Phase,
        /// File name of the failed item
        file_name: String,
        /// Error message
        error: String,
    },

    /// A phase ended
    PhaseComplete {
        /// Which phase
        phase: Phase,
        /// Items written successfully
        succeeded: u64,
        /// Items that failed
        failed: u64,
        /// Items never attempted because of cancellation
        skipped: u64,
        /// Wall-clock duration of the phase in milliseconds
        elapsed_ms: u64,
    },
}

/// Summary of one finished phase
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseReport {
    /// Which phase
    pub phase: Phase,
    /// Items the phase set out to process
    pub total: u64,
    /// Items written successfully
    pub succeeded: u64,
    /// Items that failed (each one was logged)
    pub failed: u64,
    /// Items never attempted because the phase was cancelled
    pub skipped: u64,
    /// Wall-clock duration of the phase
    pub elapsed: Duration,
}

impl PhaseReport {
    /// Tally item outcomes into a report
    pub fn from_outcomes(
        phase: Phase,
        outcomes: impl IntoIterator<Item = ItemOutcome>,
        elapsed: Duration,
    ) -> Self {
        let mut report = Self {
            phase,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            elapsed,
        };
        for outcome in outcomes {
            report.total += 1;
            match outcome {
                ItemOutcome::Succeeded => report.succeeded += 1,
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
            }
        }
        report
    }

    /// Mean wall-clock time per attempted item
    pub fn average_per_item(&self) -> Option<Duration> {
        let attempted = self.succeeded + self.failed;
        if attempted == 0 {
            return None;
        }
        Some(self.elapsed.div_f64(attempted as f64))
    }

    /// Event announcing this report
    pub fn to_event(&self) -> Event {
        Event::PhaseComplete {
            phase: self.phase,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

impl std::fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} succeeded, {} failed, {} skipped in {:.2}s",
            self.phase,
            self.succeeded,
            self.total,
            self.failed,
            self.skipped,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Result of running both phases back to back
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Fetch phase report
    pub fetch: PhaseReport,
    /// Transform phase report
    pub transform: PhaseReport,
}

impl PipelineSummary {
    /// Sum of both phase durations
    pub fn total_elapsed(&self) -> Duration {
        self.fetch.elapsed + self.transform.elapsed
    }
}

/// Percentage helper shared by progress events
pub(crate) fn percent_of(completed: u64, total: u64) -> f32 {
    if total == 0 {
        100.0
    } else {
        (completed as f32 / total as f32) * 100.0
    }
}

/// Throughput helper shared by progress events
pub(crate) fn rate_per_sec(completed: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        completed as f64 / secs
    } else {
        0.0
    }
}

/// Hidden sibling of `path` that output is written to before being renamed into place.
///
/// `dir/007.png` stages as `dir/.007.png.tmp`, which never matches an extension listing.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_task_pads_index_to_three_digits() {
        assert_eq!(FetchTask::new(1, "http://h", "png").file_name(), "001.png");
        assert_eq!(FetchTask::new(42, "http://h", "png").file_name(), "042.png");
        assert_eq!(FetchTask::new(151, "http://h", "png").file_name(), "151.png");
        assert_eq!(FetchTask::new(1000, "http://h", "png").file_name(), "1000.png");
    }

    #[test]
    fn fetch_task_url_joins_without_double_slash() {
        let with_slash = FetchTask::new(3, "http://host/assets/", "png");
        let without_slash = FetchTask::new(3, "http://host/assets", "png");
        assert_eq!(with_slash.url(), "http://host/assets/003.png");
        assert_eq!(with_slash.url(), without_slash.url());
    }

    #[test]
    fn index_range_len_handles_empty_ranges() {
        assert_eq!(IndexRange::new(1, 2).len(), 2);
        assert_eq!(IndexRange::new(5, 5).len(), 1);
        assert_eq!(IndexRange::new(1, 0).len(), 0);
        assert!(IndexRange::new(1, 0).is_empty());
        assert_eq!(IndexRange::new(1, 0).iter().count(), 0);
    }

    #[test]
    fn report_tallies_outcomes() {
        let report = PhaseReport::from_outcomes(
            Phase::Fetch,
            [
                ItemOutcome::Succeeded,
                ItemOutcome::Failed,
                ItemOutcome::Succeeded,
                ItemOutcome::Skipped,
            ],
            Duration::from_secs(3),
        );

        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.average_per_item(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn report_average_is_none_when_nothing_attempted() {
        let report = PhaseReport::from_outcomes(Phase::Transform, [], Duration::from_secs(1));
        assert_eq!(report.total, 0);
        assert_eq!(report.average_per_item(), None);
    }

    #[test]
    fn phase_complete_event_serializes_with_tag() {
        let report = PhaseReport::from_outcomes(
            Phase::Transform,
            [ItemOutcome::Succeeded],
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(report.to_event()).expect("serialize failed");

        assert_eq!(json["type"], "phase_complete");
        assert_eq!(json["phase"], "transform");
        assert_eq!(json["elapsed_ms"], 1500);
    }

    #[test]
    fn staging_path_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/data/raw/007.png")),
            PathBuf::from("/data/raw/.007.png.tmp")
        );
    }

    #[test]
    fn percent_of_empty_total_is_complete() {
        assert_eq!(percent_of(0, 0), 100.0);
        assert_eq!(percent_of(5, 10), 50.0);
    }
}
