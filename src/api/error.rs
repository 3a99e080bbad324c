//! Error taxonomy for the HTTP Executor and API Client.

use thiserror::Error;

/// Closed taxonomy of failures the HTTP Executor and API Client can surface.
///
/// Status codes are classified once, at the executor boundary, so downstream
/// callers never need to re-inspect a raw status code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403: fatal for the current command, no further retries.
    #[error("unauthorized ({status}) fetching {url}")]
    Unauthorized { url: String, status: u16 },

    /// 404: non-fatal when per-item, fatal when a per-command target.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-retryable 4xx.
    #[error("client error {status} fetching {url}")]
    ClientError { url: String, status: u16 },

    /// A 5xx response that survived retry exhaustion.
    #[error("server error {status} fetching {url} after {attempts} attempts")]
    ServerError {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// 429 that survived retry exhaustion.
    #[error("rate limited fetching {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// Transport-level failure (DNS, connect, TLS) that survived retries.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body failed to decode into the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request URL could not be constructed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Cooperative cancellation fired mid-request.
    #[error("request to {0} was cancelled")]
    Cancelled(String),
}

impl ApiError {
    /// Returns the HTTP status code carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. }
            | Self::ClientError { status, .. }
            | Self::ServerError { status, .. } => Some(*status),
            Self::NotFound { .. }
            | Self::RateLimited { .. }
            | Self::Network { .. }
            | Self::Decode { .. }
            | Self::InvalidUrl(_)
            | Self::Cancelled(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_extracts_code_for_status_bearing_variants() {
        let error = ApiError::Unauthorized {
            url: "https://example.com".to_string(),
            status: 401,
        };
        assert_eq!(error.status(), Some(401));

        let error = ApiError::NotFound {
            url: "https://example.com".to_string(),
        };
        assert_eq!(error.status(), None);
    }
}
