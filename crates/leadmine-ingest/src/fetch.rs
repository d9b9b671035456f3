//! Rate-limited HTTP fetch client with retry and backoff.
//!
//! One fetcher instance is scoped to one upstream host: the pacing state
//! (the timestamp of the previous request) lives on the instance, so
//! concurrent runs against different hosts never contend on a shared clock.
//!
//! Transient failures (HTTP 429, 5xx, network errors, timeouts) are retried
//! with a linearly growing backoff (`backoff_base × attempt`); a 429 response
//! prefers the server's `Retry-After` hint. Non-transient failures (404,
//! other 4xx, body parse errors) are propagated immediately.

use std::time::Duration;

use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::io::StreamReader;

use crate::error::IngestError;

/// Tuning for a [`RateLimitedFetcher`] instance.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Minimum wall-clock gap between the starts of two consecutive requests.
    pub min_request_interval_ms: u64,
    /// Additional attempts after the first failure for transient errors.
    /// Set to `0` to disable retries.
    pub max_retries: u32,
    /// Base delay for retry backoff: the wait before retry n is `base × n`.
    pub backoff_base_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "leadmine/0.1 (ingestion)".to_owned(),
            min_request_interval_ms: 100,
            max_retries: 3,
            backoff_base_secs: 2,
        }
    }
}

/// HTTP GET client enforcing a minimum inter-request interval per instance.
///
/// Every public operation paces itself against the previous request issued
/// through the same instance, then retries transient failures up to
/// `max_retries` additional attempts.
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    min_interval: Duration,
    max_retries: u32,
    backoff_base: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedFetcher {
    /// Creates a fetcher with configured timeout, `User-Agent`, pacing, and
    /// retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(config: &FetchConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            max_retries: config.max_retries,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            last_request: Mutex::new(None),
        })
    }

    /// Fetches `url` and parses the response body as JSON.
    ///
    /// # Errors
    ///
    /// - [`IngestError::RateLimited`] — HTTP 429 after all retries exhausted.
    /// - [`IngestError::NotFound`] — HTTP 404 (not retried); callers decide
    ///   whether that means "zero results".
    /// - [`IngestError::UpstreamStatus`] — any other non-2xx status (5xx
    ///   retried, 4xx not).
    /// - [`IngestError::Timeout`] / [`IngestError::Http`] — request-level
    ///   failures after all retries exhausted.
    /// - [`IngestError::Deserialize`] — response body is not valid JSON
    ///   (not retried).
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, IngestError> {
        let response = self.request(url).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| IngestError::Deserialize {
            context: format!("response body from {url}"),
            source: e,
        })
    }

    /// Fetches `url` and returns the response body as text.
    ///
    /// # Errors
    ///
    /// Same request-level errors as [`Self::get_json`].
    pub async fn get_text(&self, url: &str) -> Result<String, IngestError> {
        let response = self.request(url).await?;
        Ok(response.text().await?)
    }

    /// Fetches `url` and returns the response body as an incremental reader.
    ///
    /// The body is consumed as it arrives on the wire — nothing is buffered
    /// beyond the transport's own chunks, so arbitrarily large bulk files can
    /// be parsed without holding them in memory.
    ///
    /// Retries cover obtaining the response head; an error while streaming
    /// the body surfaces as an I/O error from the returned reader.
    ///
    /// # Errors
    ///
    /// Same request-level errors as [`Self::get_json`].
    pub async fn get_reader(
        &self,
        url: &str,
    ) -> Result<impl AsyncRead + Unpin + Send, IngestError> {
        let response = self.request(url).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        Ok(StreamReader::new(Box::pin(stream)))
    }

    /// Issues a paced GET with retry on transient errors, returning the raw
    /// response on any 2xx status.
    async fn request(&self, url: &str) -> Result<reqwest::Response, IngestError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.pace().await;
            match self.send_once(url, attempt).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_transient() || attempt > self.max_retries {
                        return Err(err);
                    }
                    let delay = match &err {
                        IngestError::RateLimited {
                            retry_after_secs, ..
                        } => Duration::from_secs(*retry_after_secs),
                        _ => self.backoff_base.saturating_mul(attempt),
                    };
                    tracing::warn!(
                        url,
                        attempt,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "transient fetch error — retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Suspends until `min_interval` has elapsed since the previous request
    /// issued through this instance, then stamps the new request start.
    ///
    /// The pacing lock is held across the sleep so concurrent callers queue
    /// behind the interval instead of bursting through together.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// One request attempt, with status-to-error mapping.
    ///
    /// `attempt` feeds the fallback retry-after value for a 429 response
    /// missing the `Retry-After` header.
    async fn send_once(&self, url: &str, attempt: u32) -> Result<reqwest::Response, IngestError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(IngestError::Timeout {
                    url: url.to_owned(),
                })
            }
            Err(e) => return Err(IngestError::Http(e)),
        };
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or_else(|| self.backoff_base.as_secs() * u64::from(attempt));

            return Err(IngestError::RateLimited {
                host: host_of(url),
                retry_after_secs,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IngestError::NotFound {
                url: url.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(IngestError::UpstreamStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response)
    }
}

/// Extracts the host from a URL for error reporting; falls back to the full
/// URL when it does not parse.
fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}
