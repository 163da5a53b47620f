//! Offline transforms: a pass-through for dry runs and a scriptable fake for
//! exercising orchestration without a provider.

use async_trait::async_trait;
use redraft_common::types::TransformMode;
use std::sync::Mutex;
use std::time::Duration;

use crate::{ProviderError, TextTransform, TransformRequest};

/// Returns rewrite/expand input unchanged and produces nothing for append.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTransform;

#[async_trait]
impl TextTransform for EchoTransform {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        match request.mode {
            TransformMode::Rewrite | TransformMode::Expand => Ok(request.text.clone()),
            TransformMode::Append => Ok(String::new()),
        }
    }
}

type Responder = Box<dyn Fn(&TransformRequest) -> Result<String, ProviderError> + Send + Sync>;
type Latency = Box<dyn Fn(&TransformRequest) -> Duration + Send + Sync>;

/// Scriptable fake: a responder closure decides each answer, an optional
/// latency function delays it, and an optional context limit (in characters)
/// rejects oversized input the way a provider would. Every request is logged.
pub struct ScriptedTransform {
    responder: Responder,
    latency: Option<Latency>,
    context_limit_chars: Option<usize>,
    calls: Mutex<Vec<TransformRequest>>,
}

impl ScriptedTransform {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&TransformRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            context_limit_chars: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Wraps each input as `<tag>(text)`.
    pub fn tagging(tag: &'static str) -> Self {
        Self::new(move |req| Ok(format!("{tag}({})", req.text)))
    }

    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&TransformRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn with_context_limit(mut self, max_chars: usize) -> Self {
        self.context_limit_chars = Some(max_chars);
        self
    }

    pub fn calls(&self) -> Vec<TransformRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TextTransform for ScriptedTransform {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }

        if let Some(limit) = self.context_limit_chars {
            let chars = request.text.chars().count();
            if chars > limit {
                return Err(ProviderError::context_too_large(format!(
                    "{chars} chars exceeds limit of {limit}"
                )));
            }
        }

        (self.responder)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redraft_common::types::Provider;

    fn request(text: &str, mode: TransformMode) -> TransformRequest {
        TransformRequest {
            text: text.to_string(),
            instructions: String::new(),
            content_source: None,
            style_source: None,
            provider: Provider::DeepSeek,
            mode,
        }
    }

    #[tokio::test]
    async fn echo_passes_text_through() {
        let echo = EchoTransform;
        let out = echo.transform(&request("abc", TransformMode::Rewrite)).await;
        assert_eq!(out.unwrap(), "abc");
        let out = echo.transform(&request("abc", TransformMode::Append)).await;
        assert_eq!(out.unwrap(), "");
    }

    #[tokio::test]
    async fn scripted_logs_calls_and_enforces_limit() {
        let fake = ScriptedTransform::tagging("T").with_context_limit(5);

        assert_eq!(
            fake.transform(&request("short", TransformMode::Rewrite)).await.unwrap(),
            "T(short)"
        );
        let err = fake
            .transform(&request("too long", TransformMode::Rewrite))
            .await
            .unwrap_err();
        assert!(err.is_context_too_large());

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].text, "too long");
    }
}
