use std::time::Duration;

use modproxy_config::{RetryConfig, UpstreamConfig};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream request failed: {0}")]
    Http(#[source] reqwest::Error),
}

fn map_reqwest_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Http(err)
    }
}

/// A response from the upstream registry, relayed to the client unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP client for the fallback registry.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base: String,
    retry: RetryConfig,
}

impl UpstreamClient {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            http,
            base: config.url.as_str().trim_end_matches('/').to_owned(),
            retry: config.retry.clone(),
        })
    }

    /// Upstream URL for a raw request path such as `/example.com/mod/@latest`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `GET`s `path` from the upstream registry.
    ///
    /// With retries enabled, transport errors and retryable statuses are
    /// retried; once the budget is spent the last response is returned as-is.
    pub async fn fetch(&self, path: &str) -> Result<UpstreamReply, UpstreamError> {
        let url = self.url_for(path);
        let mut attempt = 0usize;

        loop {
            debug!(url = %url, attempt, "upstream request");
            match self.send(&url).await {
                Ok(reply) => {
                    if attempt < self.retry.max_retries && should_retry(reply.status) {
                        attempt += 1;
                        warn!(url = %url, status = %reply.status, attempt, "upstream request failed, retrying");
                        tokio::time::sleep(backoff_delay(attempt, &self.retry)).await;
                        continue;
                    }
                    return Ok(reply);
                }
                Err(err) => {
                    if attempt < self.retry.max_retries {
                        attempt += 1;
                        warn!(url = %url, error = %err, attempt, "upstream request failed, retrying");
                        tokio::time::sleep(backoff_delay(attempt, &self.retry)).await;
                        continue;
                    }
                    return Err(map_reqwest_error(err));
                }
            }
        }
    }

    async fn send(&self, url: &str) -> Result<UpstreamReply, reqwest::Error> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Exponential backoff for retry `attempt` (1-based), capped at `max_backoff`.
fn backoff_delay(attempt: usize, cfg: &RetryConfig) -> Duration {
    let factor = 2u32.saturating_pow((attempt.saturating_sub(1)).min(16) as u32);
    cfg.initial_backoff()
        .saturating_mul(factor)
        .min(cfg.max_backoff())
}
