use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{ProviderError, TextTransform, TransformRequest};

const CONTEXT_LENGTH_CODE: &str = "context_length_exceeded";

/// Client for a transform gateway that fronts the LLM providers.
///
/// `POST {base_url}/v1/transform` with a JSON [`TransformRequest`]; the
/// gateway answers `{"text": "..."}` or an error body
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Clone)]
pub struct HttpTransformClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransformResponse {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpTransformClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransformClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: &TransformRequest) -> Result<String, TransformClientError> {
        let url = format!("{}/v1/transform", self.base_url);
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        let status = resp.status();

        if status.is_success() {
            let body: TransformResponse = resp.json().await?;
            return Ok(body.text);
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();

        Err(TransformClientError::Rejected(classify_failure(
            status,
            retry_after.as_deref(),
            &body,
        )))
    }
}

#[async_trait]
impl TextTransform for HttpTransformClient {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        tracing::debug!(
            provider = %request.provider,
            mode = %request.mode,
            chars = request.text.len(),
            "Sending transform request"
        );
        self.send(request).await.map_err(ProviderError::from)
    }
}

/// Map a non-success gateway response onto the provider error taxonomy.
/// Classification uses the status and the structured error code only.
pub fn classify_failure(status: StatusCode, retry_after: Option<&str>, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = detail
        .message
        .unwrap_or_else(|| format!("gateway returned {status}"));

    if status == StatusCode::PAYLOAD_TOO_LARGE
        || detail.code.as_deref() == Some(CONTEXT_LENGTH_CODE)
    {
        return ProviderError::context_too_large(message);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return ProviderError::rate_limited(retry_after, message);
    }

    ProviderError::upstream(message)
}

#[derive(Debug, thiserror::Error)]
pub enum TransformClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Rejected(ProviderError),
}

impl From<TransformClientError> for ProviderError {
    fn from(err: TransformClientError) -> Self {
        match err {
            TransformClientError::Rejected(e) => e,
            TransformClientError::Http(e) if e.is_timeout() => {
                ProviderError::upstream(format!("request timed out: {e}"))
            }
            TransformClientError::Http(e) => ProviderError::upstream(e.to_string()),
        }
    }
}
