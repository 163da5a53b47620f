use async_trait::async_trait;
use std::time::Duration;

use crate::{ProviderError, ProviderErrorKind, TextTransform, TransformRequest};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retries rate-limited calls with exponential backoff. Every other failure
/// is returned untouched on the first attempt.
pub struct RetryOnRateLimit<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
}

impl<T> RetryOnRateLimit<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn delay_for(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait.min(MAX_BACKOFF);
        }
        let exponent = attempt.min(16) as u32;
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(MAX_BACKOFF)
    }
}

#[async_trait]
impl<T: TextTransform> TextTransform for RetryOnRateLimit<T> {
    async fn transform(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.transform(request).await {
                Err(ProviderError {
                    kind: ProviderErrorKind::RateLimited { retry_after },
                    message,
                }) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, retry_after);
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        reason = %message,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
