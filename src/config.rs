//! Configuration types for sprite-pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Fetch phase configuration (source URL, index range, concurrency)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of images to fetch; indices run from 1 to `count` inclusive (default: 151)
    #[serde(default = "default_count")]
    pub count: u32,

    /// Base URL that file names are appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory fetched images are written to (default: "./pokemon_dataset")
    #[serde(default = "default_fetch_dir")]
    pub dest_dir: PathBuf,

    /// Number of range-workers the index range is partitioned across (default: 8)
    #[serde(default = "default_range_workers")]
    pub range_workers: usize,

    /// Maximum concurrent requests inside a single range-worker (default: 16)
    ///
    /// Bounds the inner fan-out so a large range cannot open an unbounded number of
    /// connections. Total in-flight requests are at most
    /// `range_workers * max_in_flight_per_range`.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_range: usize,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_secs_serde")]
    pub request_timeout: Duration,

    /// File extension used for both the URL and the stored file (default: "png")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            base_url: default_base_url(),
            dest_dir: default_fetch_dir(),
            range_workers: default_range_workers(),
            max_in_flight_per_range: default_max_in_flight(),
            request_timeout: default_request_timeout(),
            extension: default_extension(),
        }
    }
}

/// Transform phase configuration (directories, pool width, output quality)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Directory to read images from (None = the fetch phase's `dest_dir`)
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Directory transformed images are written to (default: "./pokemon_processed")
    #[serde(default = "default_transform_dir")]
    pub dest_dir: PathBuf,

    /// Number of pool workers (default: available parallelism)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Encoder quality for lossy output formats, 1-100 (default: 95)
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            dest_dir: default_transform_dir(),
            pool_size: default_pool_size(),
            quality: default_quality(),
        }
    }
}

/// Progress reporting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// How often the fetch phase's shared counter is sampled (default: 100 ms)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    pub poll_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

/// Main configuration for [`Pipeline`](crate::Pipeline)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch phase settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Transform phase settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Progress reporting settings
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Directory the transform phase reads from
    pub fn transform_source_dir(&self) -> &Path {
        self.transform
            .source_dir
            .as_deref()
            .unwrap_or(&self.fetch.dest_dir)
    }

    /// Check that every setting is usable before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.fetch.count == 0 {
            return Err(Error::config("fetch.count", "count must be at least 1"));
        }
        if self.fetch.range_workers == 0 {
            return Err(Error::config(
                "fetch.range_workers",
                "range_workers must be at least 1",
            ));
        }
        if self.fetch.max_in_flight_per_range == 0 {
            return Err(Error::config(
                "fetch.max_in_flight_per_range",
                "max_in_flight_per_range must be at least 1",
            ));
        }
        if self.fetch.extension.is_empty() || self.fetch.extension.contains('/') {
            return Err(Error::config(
                "fetch.extension",
                format!("invalid extension '{}'", self.fetch.extension),
            ));
        }

        let url = url::Url::parse(&self.fetch.base_url).map_err(|e| {
            Error::config(
                "fetch.base_url",
                format!("invalid base URL '{}': {}", self.fetch.base_url, e),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(
                "fetch.base_url",
                format!("unsupported URL scheme '{}'", url.scheme()),
            ));
        }

        if self.transform.pool_size == 0 {
            return Err(Error::config(
                "transform.pool_size",
                "pool_size must be at least 1",
            ));
        }
        if !(1..=100).contains(&self.transform.quality) {
            return Err(Error::config(
                "transform.quality",
                format!("quality must be within 1..=100, got {}", self.transform.quality),
            ));
        }
        if self.progress.poll_interval.is_zero() {
            return Err(Error::config(
                "progress.poll_interval",
                "poll_interval must be non-zero",
            ));
        }

        Ok(())
    }
}

fn default_count() -> u32 {
    151
}

fn default_base_url() -> String {
    "https://raw.githubusercontent.com/HybridShivam/Pokemon/master/assets/imagesHQ".to_string()
}

fn default_fetch_dir() -> PathBuf {
    PathBuf::from("./pokemon_dataset")
}

fn default_transform_dir() -> PathBuf {
    PathBuf::from("./pokemon_processed")
}

fn default_range_workers() -> usize {
    8
}

fn default_max_in_flight() -> usize {
    16
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_extension() -> String {
    "png".to_string()
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

fn default_quality() -> u8 {
    95
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

// Duration serialization helpers
mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
