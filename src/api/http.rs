//! HTTP Executor: a single request, retried per the closed status taxonomy.
//!
//! Mirrors the shape of [`crate::download::RetryPolicy`] (classify, then
//! decide) but the taxonomy itself is the API Client's, not the
//! Downloader's: 401/403/404/other-4xx fail fast, 408/429/5xx/network
//! errors retry, and 429 backs off on a steeper multiplier than 5xx.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::error::ApiError;

/// Maximum total attempts for a single logical request (including the
/// first). Matches the teacher's `RetryPolicy::DEFAULT_MAX_RETRIES`
/// convention of treating the configured count as the *total* number of
/// attempts, not additional retries on top of the first try.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the first retry.
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// 429 responses back off `RATE_LIMIT_MULTIPLIER` times as fast in wall
/// time as the plain exponential 5xx schedule, to be polite to the server.
const RATE_LIMIT_MULTIPLIER: u32 = 5;

/// Cap added jitter to avoid a thundering herd on synchronized retries.
const MAX_JITTER_MS: u64 = 250;

/// Retryable per the closed taxonomy in the module docs. Shared with the
/// Downloader's own streaming-transfer retry loop, which applies the same
/// policy to file downloads.
#[must_use]
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 429 | 500 | 502 | 503 | 504
    )
}

fn classify_status(url: &str, status: StatusCode) -> ApiError {
    let code = status.as_u16();
    match code {
        401 | 403 => ApiError::Unauthorized {
            url: url.to_string(),
            status: code,
        },
        404 => ApiError::NotFound {
            url: url.to_string(),
        },
        _ if (400..500).contains(&code) => ApiError::ClientError {
            url: url.to_string(),
            status: code,
        },
        _ => ApiError::ClientError {
            url: url.to_string(),
            status: code,
        },
    }
}

/// Performs a single prepared HTTP request with bounded exponential-backoff
/// retries, per the status taxonomy in the type-level docs above.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    api_key: Option<String>,
    user_agent: String,
    max_attempts: u32,
    initial_retry_delay: Duration,
    cancellation: CancellationToken,
}

impl HttpExecutor {
    /// Builds a new executor sharing a single `reqwest::Client` (and
    /// therefore its connection pool) across every request it issues.
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        user_agent: String,
        max_attempts: u32,
        initial_retry_delay: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            api_key,
            user_agent,
            max_attempts: max_attempts.max(1),
            initial_retry_delay,
            cancellation,
        }
    }

    /// Issues a GET request against `url`, returning the decoded body bytes
    /// on success or a classified [`ApiError`] after retries (if any) are
    /// exhausted.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.execute(Method::GET, url).await
    }

    async fn execute(&self, method: Method, url: &str) -> Result<Vec<u8>, ApiError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if self.cancellation.is_cancelled() {
                return Err(ApiError::Cancelled(url.to_string()));
            }

            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Accept", "application/json")
                .header("User-Agent", &self.user_agent);

            if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
                request = request.bearer_auth(key);
            }

            let outcome = tokio::select! {
                response = request.send() => response,
                () = self.cancellation.cancelled() => {
                    return Err(ApiError::Cancelled(url.to_string()));
                }
            };

            let response = match outcome {
                Ok(response) => response,
                Err(source) => {
                    if attempt >= self.max_attempts {
                        return Err(ApiError::Network {
                            url: url.to_string(),
                            source,
                        });
                    }
                    debug!(attempt, error = %source, "network error, retrying");
                    self.sleep_for_attempt(attempt, None, false).await;
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .bytes()
                    .await
                    .map(|bytes| bytes.to_vec())
                    .map_err(|source| ApiError::Network {
                        url: url.to_string(),
                        source,
                    });
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after_seconds);

            // Drain the body so the underlying connection can be reused.
            let _ = response.bytes().await;

            if !is_retryable_status(status) {
                return Err(classify_status(url, status));
            }

            if attempt >= self.max_attempts {
                return Err(if status.as_u16() == 429 {
                    ApiError::RateLimited {
                        url: url.to_string(),
                        attempts: attempt,
                    }
                } else {
                    ApiError::ServerError {
                        url: url.to_string(),
                        status: status.as_u16(),
                        attempts: attempt,
                    }
                });
            }

            warn!(attempt, status = status.as_u16(), url, "retryable status, backing off");
            let rate_limited = status.as_u16() == 429;
            self.sleep_for_attempt(attempt, retry_after, rate_limited).await;
        }
    }

    async fn sleep_for_attempt(&self, attempt: u32, retry_after: Option<Duration>, rate_limited: bool) {
        let delay = retry_after.unwrap_or_else(|| {
            if rate_limited {
                self.rate_limit_backoff(attempt)
            } else {
                self.backoff_delay(attempt)
            }
        });
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.cancellation.cancelled() => {}
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        exponential_backoff_with_jitter(self.initial_retry_delay, attempt)
    }

    /// Computes the 429-specific backoff: `RATE_LIMIT_MULTIPLIER` times the
    /// plain exponential schedule, in wall time, unless the server supplied
    /// an explicit `Retry-After`.
    #[must_use]
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt) * RATE_LIMIT_MULTIPLIER
    }
}

/// Exponential backoff with jitter, shared by the API Client's retry loop
/// and the Downloader's streaming-transfer retry loop (spec requires the
/// latter to "apply the retry policy" of the former rather than invent a
/// second one).
#[must_use]
pub(crate) fn exponential_backoff_with_jitter(initial_delay: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let base_ms = u64::try_from(initial_delay.as_millis()).unwrap_or(u64::MAX);
    let doubled = base_ms.saturating_mul(1u64 << exponent.min(16));
    let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
    Duration::from_millis(doubled + jitter_ms)
}

/// The 429-specific multiplier applied on top of [`exponential_backoff_with_jitter`].
pub(crate) const RATE_LIMIT_BACKOFF_MULTIPLIER: u32 = RATE_LIMIT_MULTIPLIER;

pub(crate) fn parse_retry_after_seconds(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    httpdate::parse_http_date(value)
        .ok()
        .and_then(|when| when.duration_since(std::time::SystemTime::now()).ok())
}
