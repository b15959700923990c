//! Image source trait and the HTTP implementation.

use std::time::Duration;

use crate::error::{FetchError, Result};
use crate::types::FetchTask;

/// Abstraction over where fetched image bytes come from, enabling testability.
///
/// Implementations must be safe to call concurrently from every range-worker.
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the raw bytes for one task
    async fn fetch(&self, task: &FetchTask) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Production [`ImageSource`] issuing one HTTP GET per task.
///
/// A single client (and so a single connection pool) is shared by all workers.
#[derive(Clone)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    /// Create a source whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, task: &FetchTask) -> std::result::Result<Vec<u8>, FetchError> {
        let url = task.url();
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(body.to_vec())
    }
}
