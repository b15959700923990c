//! The two-phase pipeline facade.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{self, FetchPhaseParams, HttpImageSource, ImageSource};
use crate::progress::SharedProgress;
use crate::transform::{self, ImageTransform, SpriteFilterChain, TransformPhaseParams};
use crate::types::{Event, PhaseReport, PipelineSummary};

/// Buffer size for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs the fetch phase and then the transform phase.
///
/// Cloning is cheap; clones share the event channel and cancellation token, so
/// [`shutdown`](Self::shutdown) on any clone stops work started from every other.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn ImageSource>,
    transform: Arc<dyn ImageTransform>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline using HTTP for fetching and [`SpriteFilterChain`] for transforming.
    ///
    /// Fails if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpImageSource::new(config.fetch.request_timeout)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            source: Arc::new(source),
            transform: Arc::new(SpriteFilterChain::default()),
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Replace the image source
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the transform chain
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn ImageTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stop dispatching new items in any running or future phase.
    ///
    /// In-flight downloads are abandoned; in-flight transforms run to completion.
    pub fn shutdown(&self) {
        tracing::info!("Pipeline shutdown requested");
        self.cancel_token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Run the fetch phase with a fresh progress counter
    pub async fn fetch(&self) -> Result<PhaseReport> {
        self.fetch_with_progress(&SharedProgress::new()).await
    }

    /// Run the fetch phase, counting handled items in `progress`.
    ///
    /// Useful when the caller wants to observe the counter directly instead of
    /// through [`Event::FetchProgress`].
    pub async fn fetch_with_progress(&self, progress: &SharedProgress) -> Result<PhaseReport> {
        fetch::run_fetch_phase(FetchPhaseParams {
            config: &self.config.fetch,
            source: Arc::clone(&self.source),
            progress: progress.clone(),
            poll_interval: self.config.progress.poll_interval,
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.clone(),
        })
        .await
    }

    /// Run the transform phase over whatever the source directory holds
    pub async fn transform(&self) -> Result<PhaseReport> {
        transform::run_transform_phase(TransformPhaseParams {
            source_dir: self.config.transform_source_dir(),
            config: &self.config.transform,
            extension: &self.config.fetch.extension,
            transform: Arc::clone(&self.transform),
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.clone(),
        })
        .await
    }

    /// Run both phases back to back.
    ///
    /// The transform phase starts only after every fetch worker has joined.
    pub async fn run(&self) -> Result<PipelineSummary> {
        let fetch = self.fetch().await?;
        let transform = self.transform().await?;
        let summary = PipelineSummary { fetch, transform };

        tracing::info!(
            fetch_secs = summary.fetch.elapsed.as_secs_f64(),
            transform_secs = summary.transform.elapsed.as_secs_f64(),
            total_secs = summary.total_elapsed().as_secs_f64(),
            "Pipeline complete"
        );
        Ok(summary)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, FetchError};
    use crate::types::{FetchTask, Phase};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;

    /// Serves a small PNG for every index.
    struct PngSource;

    #[async_trait::async_trait]
    impl ImageSource for PngSource {
        async fn fetch(&self, task: &FetchTask) -> std::result::Result<Vec<u8>, FetchError> {
            let side = task.index() + 1;
            let image = RgbImage::from_pixel(side, side, Rgb([task.index() as u8, 0, 0]));
            let mut bytes = Cursor::new(Vec::new());
            DynamicImage::ImageRgb8(image)
                .write_to(&mut bytes, ImageFormat::Png)
                .map_err(|e| FetchError::Other(e.to_string()))?;
            Ok(bytes.into_inner())
        }
    }

    fn test_config(root: &Path, count: u32) -> Config {
        let mut config = Config::default();
        config.fetch.count = count;
        config.fetch.base_url = "http://images.test".to_string();
        config.fetch.dest_dir = root.join("raw");
        config.fetch.range_workers = 2;
        config.transform.dest_dir = root.join("processed");
        config.transform.pool_size = 2;
        config
    }

    fn listed_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = Config::default();
        config.fetch.count = 0;
        assert!(matches!(Pipeline::new(config), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn run_fetches_then_transforms_everything() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(root.path(), 4))
            .unwrap()
            .with_source(Arc::new(PngSource))
            .with_transform(Arc::new(|image: DynamicImage| image.grayscale()));

        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.fetch.succeeded, 4);
        assert_eq!(summary.transform.succeeded, 4);
        assert_eq!(
            summary.total_elapsed(),
            summary.fetch.elapsed + summary.transform.elapsed
        );
        let expected = vec!["001.png", "002.png", "003.png", "004.png"];
        assert_eq!(listed_files(&root.path().join("raw")), expected);
        assert_eq!(listed_files(&root.path().join("processed")), expected);
    }

    #[tokio::test]
    async fn transform_reads_custom_source_dir() {
        let root = tempfile::tempdir().unwrap();
        let custom = root.path().join("elsewhere");
        std::fs::create_dir(&custom).unwrap();
        RgbImage::from_pixel(3, 3, Rgb([1, 2, 3]))
            .save(custom.join("042.png"))
            .unwrap();

        let mut config = test_config(root.path(), 1);
        config.transform.source_dir = Some(custom);
        let pipeline = Pipeline::new(config)
            .unwrap()
            .with_transform(Arc::new(|image: DynamicImage| image));

        let report = pipeline.transform().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(listed_files(&root.path().join("processed")), vec!["042.png"]);
    }

    #[tokio::test]
    async fn fetch_with_progress_exposes_counter() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(root.path(), 5))
            .unwrap()
            .with_source(Arc::new(PngSource));
        let progress = SharedProgress::new();

        let report = pipeline.fetch_with_progress(&progress).await.unwrap();

        assert_eq!(progress.get(), 5);
        assert_eq!(report.phase, Phase::Fetch);
    }

    #[tokio::test]
    async fn shutdown_before_run_skips_all_work() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(root.path(), 3))
            .unwrap()
            .with_source(Arc::new(PngSource));

        pipeline.clone().shutdown();
        assert!(pipeline.is_shut_down());

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.fetch.skipped, 3);
        assert_eq!(summary.transform.total, 0);
    }

    #[tokio::test]
    async fn subscribers_see_both_phases_complete() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(root.path(), 2))
            .unwrap()
            .with_source(Arc::new(PngSource))
            .with_transform(Arc::new(|image: DynamicImage| image));
        let mut events = pipeline.subscribe();

        pipeline.run().await.unwrap();

        let mut completed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::PhaseComplete { phase, .. } = event {
                completed.push(phase);
            }
        }
        assert_eq!(completed, vec![Phase::Fetch, Phase::Transform]);
    }
}
