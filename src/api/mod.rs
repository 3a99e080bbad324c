//! HTTP Executor and API Client: the typed boundary to the public
//! model-hosting API.

mod client;
mod error;
mod http;
mod query;

pub use client::ApiClient;
pub use error::ApiError;
pub use http::{HttpExecutor, DEFAULT_INITIAL_RETRY_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use query::{ImageQueryParameters, QueryParameters};

/// Retry/backoff primitives shared with the Downloader's own streaming-transfer
/// retry loop, so it can "apply the retry policy" of the HTTP Executor rather
/// than maintain a second taxonomy.
pub(crate) use http::{
    exponential_backoff_with_jitter, is_retryable_status, parse_retry_after_seconds,
    RATE_LIMIT_BACKOFF_MULTIPLIER,
};
