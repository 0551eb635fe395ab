//! Venue read API: historical trade queries over HTTP.
//!
//! History is served by the venue's indexer, not by the chains, and is never
//! merged into the canonical store. This client is deliberately small: one
//! GET endpoint family with per-request retry policies.

pub mod retry;

pub use retry::{RetryConfig, RetryPolicy};

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{Trade, TradeFilter};
use crate::error::HttpError;

/// Read-only client for the venue's HTTP API.
pub struct ReadApi {
    base_url: String,
    client: Client,
}

impl ReadApi {
    pub fn new(base_url: &str) -> Self {
        let builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build().expect("Failed to build HTTP client"),
        }
    }

    /// Fetches historical trades matching `filter`, newest first.
    pub async fn get_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, HttpError> {
        let url = trades_url(&self.base_url, filter);
        self.get(&url, RetryPolicy::Idempotent).await
    }

    // ── Internal HTTP methods ────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: &str, retry: RetryPolicy) -> Result<T, HttpError> {
        let config = match retry {
            RetryPolicy::None => return self.do_get(url).await,
            RetryPolicy::Idempotent => RetryConfig::idempotent(),
            RetryPolicy::Custom(config) => config,
        };

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            match self.do_get::<T>(url).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let (should_retry, server_delay_ms) = match &err {
                        HttpError::ServerError { status, .. } => {
                            (config.retryable_statuses.contains(status), None)
                        }
                        HttpError::RateLimited { retry_after_ms } => (true, *retry_after_ms),
                        HttpError::Timeout => (true, None),
                        HttpError::Reqwest(re) => {
                            (re.is_connect() || re.is_timeout() || re.is_request(), None)
                        }
                        _ => (false, None),
                    };

                    if should_retry && attempt < config.max_retries {
                        // A server-directed Retry-After takes precedence over
                        // the computed backoff, but not over max_delay.
                        let delay = server_delay_ms
                            .map(|ms| config.clamp_delay(Duration::from_millis(ms)))
                            .unwrap_or_else(|| config.delay_for_attempt(attempt));
                        debug!(
                            attempt = attempt + 1,
                            max = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "retrying request to {}",
                            url
                        );
                        futures_timer::Delay::new(delay).await;
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        Err(HttpError::MaxRetriesExceeded {
            attempts: config.max_retries + 1,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn do_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let status_code = status.as_u16();
        let retry_after_ms = parse_retry_after(
            resp.headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body_text = resp.text().await.unwrap_or_default();

        match status_code {
            401 => Err(HttpError::Unauthorized),
            404 => Err(HttpError::NotFound(body_text)),
            408 => Err(HttpError::Timeout),
            429 => Err(HttpError::RateLimited { retry_after_ms }),
            400..=499 => Err(HttpError::BadRequest(body_text)),
            _ => Err(HttpError::ServerError {
                status: status_code,
                body: body_text,
            }),
        }
    }
}

impl Clone for ReadApi {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
        }
    }
}

fn trades_url(base_url: &str, filter: &TradeFilter) -> String {
    let mut url = format!("{}/api/trades?limit={}", base_url, filter.limit);
    if let Some(market) = &filter.market {
        url = format!("{}&market={}", url, urlencoding::encode(market.as_str()));
    }
    if let Some(from) = filter.from {
        url = format!("{}&from={}", url, from.timestamp_millis());
    }
    if let Some(to) = filter.to {
        url = format!("{}&to={}", url, to.timestamp_millis());
    }
    url
}

/// Parses the numeric (delta-seconds) form of Retry-After. The HTTP-date
/// form is ignored; the backoff schedule covers it.
fn parse_retry_after(header: Option<&str>) -> Option<u64> {
    header?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}
