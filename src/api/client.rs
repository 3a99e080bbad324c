//! Typed operations on top of the HTTP Executor.

use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::model::{Model, ModelVersion, ModelImage, Page};

use super::error::ApiError;
use super::http::HttpExecutor;
use super::query::{ImageQueryParameters, QueryParameters};

const BASE_URL: &str = "https://civitai.com/api/v1";

#[derive(Debug, Deserialize)]
struct ModelListEnvelope {
    items: Vec<Model>,
    metadata: ListMetadata,
}

#[derive(Debug, Deserialize)]
struct ImageListEnvelope {
    items: Vec<ModelImage>,
    metadata: ListMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ListMetadata {
    #[serde(rename = "nextCursor", default, deserialize_with = "cursor_as_string")]
    next_cursor: Option<String>,
}

/// `nextCursor` may arrive as a JSON string or a JSON number; both are
/// coerced to a `String` since the cursor is opaque and only ever echoed
/// back verbatim on the next request.
fn cursor_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::String(text) if !text.is_empty() => Some(text),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }))
}

/// Typed wrapper over [`HttpExecutor`] implementing the four operations the
/// Fetch-Queue Stage consumes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    executor: HttpExecutor,
    base_url: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(executor: HttpExecutor) -> Self {
        Self {
            executor,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Overrides the base URL; used by tests to point at a mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[instrument(skip(self, params))]
    pub async fn list_models(&self, params: &QueryParameters) -> Result<Page<Model>, ApiError> {
        let mut url = self.url("models")?;
        params.apply_to(&mut url);
        let bytes = self.executor.get(url.as_str()).await?;
        let envelope: ModelListEnvelope =
            serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })?;
        Ok(Page {
            items: envelope.items,
            next_cursor: envelope.metadata.next_cursor,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_model(&self, model_id: u64) -> Result<Model, ApiError> {
        let url = self.url(&format!("models/{model_id}"))?;
        let bytes = self.executor.get(url.as_str()).await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_version(&self, version_id: u64) -> Result<ModelVersion, ApiError> {
        let url = self.url(&format!("model-versions/{version_id}"))?;
        let bytes = self.executor.get(url.as_str()).await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    #[instrument(skip(self, params))]
    pub async fn list_images(
        &self,
        params: &ImageQueryParameters,
    ) -> Result<Page<ModelImage>, ApiError> {
        let mut url = self.url("images")?;
        params.apply_to(&mut url);
        let bytes = self.executor.get(url.as_str()).await?;
        let envelope: ImageListEnvelope =
            serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })?;
        Ok(Page {
            items: envelope.items,
            next_cursor: envelope.metadata.next_cursor,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|_| ApiError::InvalidUrl(format!("{}/{path}", self.base_url)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reqwest::Client;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_executor() -> HttpExecutor {
        HttpExecutor::new(
            Client::new(),
            None,
            "test-agent".to_string(),
            3,
            Duration::from_millis(1),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn list_models_coerces_numeric_next_cursor_to_string() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [],
                "metadata": { "nextCursor": 42 }
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_executor()).with_base_url(server.uri());
        let page = client.list_models(&QueryParameters::default()).await.unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn get_version_returns_not_found_for_missing_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model-versions/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ApiClient::new(test_executor()).with_base_url(server.uri());
        let result = client.get_version(9).await;
        assert!(matches!(result, Err(ApiError::NotFound { .. })));
    }
}
