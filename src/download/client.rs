//! Streaming transfer client: a single file GET, hashed as bytes arrive and
//! written through a `.part` sibling so a crash or cancellation never leaves
//! a half-written file at the final path.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::api::{exponential_backoff_with_jitter, is_retryable_status, RATE_LIMIT_BACKOFF_MULTIPLIER};
use crate::hash::{Digests, StreamingHasher};

use super::error::DownloadError;

/// Default per-transfer timeout, per the component contract: 15 minutes.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Performs the streaming GET + hash-verify + `.part` write for one file.
/// Shares one `reqwest::Client` (and its connection pool) across every
/// transfer it issues, mirroring the API Client's `HttpExecutor`.
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: Client,
    api_key: Option<String>,
    user_agent: String,
    max_attempts: u32,
    initial_retry_delay: Duration,
    transfer_timeout: Duration,
    cancellation: CancellationToken,
}

impl TransferClient {
    #[must_use]
    pub fn new(
        client: Client,
        api_key: Option<String>,
        user_agent: String,
        max_attempts: u32,
        initial_retry_delay: Duration,
        transfer_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            api_key,
            user_agent,
            max_attempts: max_attempts.max(1),
            initial_retry_delay,
            transfer_timeout,
            cancellation,
        }
    }

    /// Streams `url` into the `.part` sibling of `final_path`, retrying
    /// per the taxonomy shared with the API Client, and returns the
    /// resulting digests on success. Does not rename `.part` into place or
    /// compare against an expected hash; callers own both of those steps.
    #[instrument(skip(self), fields(url = %url, part = %part_path.display()))]
    pub async fn fetch_to_part(&self, url: &str, part_path: &Path) -> Result<Digests, DownloadError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if self.cancellation.is_cancelled() {
                return Err(DownloadError::Cancelled { url: url.to_string() });
            }

            let outcome = tokio::select! {
                result = tokio::time::timeout(self.transfer_timeout, self.attempt_once(url, part_path)) => result,
                () = self.cancellation.cancelled() => {
                    return Err(DownloadError::Cancelled { url: url.to_string() });
                }
            };

            let error = match outcome {
                Ok(Ok(digests)) => return Ok(digests),
                Ok(Err(error)) => error,
                Err(_elapsed) => {
                    let _ = tokio::fs::remove_file(part_path).await;
                    DownloadError::Timeout { url: url.to_string() }
                }
            };

            if attempt >= self.max_attempts || !is_retryable(&error) {
                return Err(error);
            }

            warn!(attempt, error = %error, "retryable transfer failure, retrying");
            let delay = retry_delay(&error, self.initial_retry_delay, attempt);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancellation.cancelled() => {
                    return Err(DownloadError::Cancelled { url: url.to_string() });
                }
            }
        }
    }

    async fn attempt_once(&self, url: &str, part_path: &Path) -> Result<Digests, DownloadError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DownloadError::Network { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            let _ = response.bytes().await;
            return Err(DownloadError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }

        if let Some(parent) = part_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::io(parent, source))?;
        }

        let mut file = open_part_file(part_path).await?;
        let mut hasher = StreamingHasher::new();
        let mut stream = response.bytes_stream();

        let result = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|source| DownloadError::Network { url: url.to_string(), source })?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|source| DownloadError::io(part_path, source))?;
            }
            Ok::<(), DownloadError>(())
        }
        .await;

        if let Err(error) = result {
            let _ = tokio::fs::remove_file(part_path).await;
            return Err(error);
        }

        file.flush().await.map_err(|source| DownloadError::io(part_path, source))?;
        debug!("transfer body fully written to .part");
        Ok(hasher.finalize())
    }

    /// Fetches the bytes at `url` in full, without retry or `.part` staging.
    /// Used for best-effort auxiliary artifacts (preview images) where a
    /// failure is logged and skipped rather than propagated.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DownloadError::Network { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            let _ = response.bytes().await;
            return Err(DownloadError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|source| DownloadError::Network { url: url.to_string(), source })
    }
}

/// Opens the `.part` file with create+write+truncate semantics (mode 0600
/// on unix), never resuming a previous partial write.
#[cfg(unix)]
async fn open_part_file(part_path: &Path) -> Result<tokio::fs::File, DownloadError> {
    use std::os::unix::fs::OpenOptionsExt;

    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(part_path)
        .await
        .map_err(|source| DownloadError::io(part_path, source))
}

#[cfg(not(unix))]
async fn open_part_file(part_path: &Path) -> Result<tokio::fs::File, DownloadError> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await
        .map_err(|source| DownloadError::io(part_path, source))
}

fn is_retryable(error: &DownloadError) -> bool {
    match error {
        DownloadError::Network { .. } | DownloadError::Timeout { .. } => true,
        DownloadError::HttpStatus { status, .. } => {
            reqwest::StatusCode::from_u16(*status).is_ok_and(is_retryable_status)
        }
        DownloadError::Io { .. } | DownloadError::HashMismatch { .. } | DownloadError::Cancelled { .. } => false,
    }
}

fn retry_delay(error: &DownloadError, initial_delay: Duration, attempt: u32) -> Duration {
    let base = exponential_backoff_with_jitter(initial_delay, attempt);
    match error {
        DownloadError::HttpStatus { status, .. } if *status == 429 => base * RATE_LIMIT_BACKOFF_MULTIPLIER,
        _ => base,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(timeout: Duration) -> TransferClient {
        TransferClient::new(
            Client::new(),
            None,
            "test-agent".to_string(),
            3,
            Duration::from_millis(1),
            timeout,
            CancellationToken::new(),
        )
    }

    #[test]
    fn retryable_errors_match_the_shared_taxonomy() {
        assert!(is_retryable(&DownloadError::Timeout { url: "x".into() }));
        assert!(is_retryable(&DownloadError::HttpStatus { url: "x".into(), status: 503 }));
        assert!(!is_retryable(&DownloadError::HttpStatus { url: "x".into(), status: 404 }));
        assert!(!is_retryable(&DownloadError::Cancelled { url: "x".into() }));
    }

    #[test]
    fn rate_limit_retry_delay_is_steeper() {
        let plain = retry_delay(
            &DownloadError::HttpStatus { url: "x".into(), status: 503 },
            Duration::from_millis(100),
            2,
        );
        let limited = retry_delay(
            &DownloadError::HttpStatus { url: "x".into(), status: 429 },
            Duration::from_millis(100),
            2,
        );
        assert!(limited >= plain * RATE_LIMIT_BACKOFF_MULTIPLIER);
    }

    #[tokio::test]
    async fn fetch_to_part_writes_body_and_returns_matching_blake3() {
        let server = MockServer::start().await;
        let body = b"hello world".to_vec();
        let expected = blake3::hash(&body).to_hex().to_string();
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("out.part");
        let client = test_client(Duration::from_secs(5));
        let digests = client
            .fetch_to_part(&format!("{}/file", server.uri()), &part_path)
            .await
            .unwrap();

        assert_eq!(digests.blake3, expected);
        assert!(part_path.exists());
        assert_eq!(tokio::fs::read(&part_path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn fetch_to_part_retries_retryable_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("out.part");
        let client = test_client(Duration::from_secs(5));
        let digests = client
            .fetch_to_part(&format!("{}/flaky", server.uri()), &part_path)
            .await
            .unwrap();
        assert_eq!(digests.blake3, blake3::hash(b"ok").to_hex().to_string());
    }

    #[tokio::test]
    async fn fetch_to_part_removes_part_file_on_final_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("out.part");
        let client = test_client(Duration::from_secs(5));
        let result = client
            .fetch_to_part(&format!("{}/missing", server.uri()), &part_path)
            .await;
        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 404, .. })));
        assert!(!part_path.exists());
    }
}
