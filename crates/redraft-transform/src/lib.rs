pub mod http;
pub mod mock;
pub mod retry;

pub use http::{HttpTransformClient, TransformClientError};
pub use mock::{EchoTransform, ScriptedTransform};
pub use retry::RetryOnRateLimit;

use async_trait::async_trait;
use redraft_common::types::{Provider, TransformMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One call against the external text-transform capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub text: String,
    pub instructions: String,
    /// Reference text whose content should inform the output. Only present
    /// when the caller enabled it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_source: Option<String>,
    /// Reference text whose style the output should imitate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_source: Option<String>,
    pub provider: Provider,
    pub mode: TransformMode,
}

/// The text-transform capability. Implementations talk to a provider; the
/// orchestrator only cares about the error kind.
#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T: TextTransform + ?Sized> TextTransform for std::sync::Arc<T> {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        (**self).transform(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The input exceeded the provider's context window.
    ContextTooLarge,
    RateLimited { retry_after: Option<Duration> },
    Upstream,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::ContextTooLarge => write!(f, "context too large"),
            ProviderErrorKind::RateLimited { .. } => write!(f, "rate limited"),
            ProviderErrorKind::Upstream => write!(f, "upstream error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn context_too_large(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ContextTooLarge, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited { retry_after }, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Upstream, message)
    }

    pub fn is_context_too_large(&self) -> bool {
        self.kind == ProviderErrorKind::ContextTooLarge
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::RateLimited { .. })
    }
}
