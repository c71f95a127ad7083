//! Optional retry decorator for a [`Fetcher`].
//!
//! The pipeline itself is single-attempt. Wrapping the fetcher in
//! [`RetryingFetcher`] retries the request phase (up to response headers) on
//! transient failures only; a body that fails mid-stream is not retried.

use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};

use crate::fetch::{FetchResponse, Fetcher};
use crate::FetchError;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

pub struct RetryingFetcher<F> {
    inner: F,
    settings: RetrySettings,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, settings: RetrySettings) -> Self {
        Self { inner, settings }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

#[async_trait::async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let attempts = self.settings.attempts.max(1);
        let mut backoff = self.settings.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.inner.fetch(url, timeout).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    engine_debug!(
                        "Retrying {} ({}/{}) after {}",
                        url,
                        attempt,
                        attempts,
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        engine_warn!("Giving up on {} after {} attempts: {}", url, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
