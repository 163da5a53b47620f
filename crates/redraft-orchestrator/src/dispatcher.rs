use redraft_chunker::{estimate_tokens, BoundarySplitter, SplitGranularity, CHUNK_SEPARATOR};
use redraft_transform::{ProviderError, TextTransform, TransformRequest};
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_MAX_RESPLIT_DEPTH: usize = 6;

/// Output of one dispatch. `skipped` holds the failure for every piece that
/// was kept untransformed behind an inline marker.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub text: String,
    pub skipped: Vec<ProviderError>,
}

/// Sends one chunk to the transform capability. When the provider reports
/// the input as too large, the chunk is re-split at half its size and each
/// piece is sent on its own, results joined back in order.
///
/// Re-splitting never goes below a sentence. A piece that cannot shrink any
/// further fails the whole chunk when it is the chunk itself, and is kept
/// with an inline marker when it is one piece of a larger chunk. Any other
/// provider failure is returned as is.
#[derive(Clone)]
pub struct TransformDispatcher {
    transform: Arc<dyn TextTransform>,
    max_resplit_depth: usize,
    granularity: SplitGranularity,
}

impl TransformDispatcher {
    pub fn new(transform: Arc<dyn TextTransform>) -> Self {
        Self {
            transform,
            max_resplit_depth: DEFAULT_MAX_RESPLIT_DEPTH,
            granularity: SplitGranularity::Paragraph,
        }
    }

    pub fn with_max_resplit_depth(mut self, depth: usize) -> Self {
        self.max_resplit_depth = depth;
        self
    }

    pub fn with_granularity(mut self, granularity: SplitGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Send `request` as is. A context error is returned, never re-split.
    pub async fn dispatch_once(&self, request: &TransformRequest) -> Result<String, ProviderError> {
        self.transform.transform(request).await
    }

    pub async fn dispatch(&self, request: &TransformRequest) -> Result<Dispatched, ProviderError> {
        let mut pending: VecDeque<(String, usize)> = VecDeque::new();
        pending.push_back((request.text.clone(), 0));
        let mut outputs = Vec::new();
        let mut skipped = Vec::new();

        while let Some((text, depth)) = pending.pop_front() {
            let piece = TransformRequest {
                text,
                ..request.clone()
            };

            let err = match self.transform.transform(&piece).await {
                Ok(out) => {
                    outputs.push(out);
                    continue;
                }
                Err(err) if err.is_context_too_large() => err,
                Err(err) => return Err(err),
            };

            let budget = (estimate_tokens(&piece.text) / 2).max(1);
            let parts = BoundarySplitter::new(budget)
                .with_granularity(self.granularity)
                .split(&piece.text);

            if parts.len() > 1 && depth < self.max_resplit_depth {
                tracing::debug!(
                    depth = depth + 1,
                    budget,
                    pieces = parts.len(),
                    "Context too large, re-splitting"
                );
                for part in parts.into_iter().rev() {
                    pending.push_front((part, depth + 1));
                }
                continue;
            }

            if depth == 0 {
                return Err(err);
            }

            tracing::warn!(depth, error = %err, "Piece cannot be split further, keeping it as is");
            outputs.push(format!(
                "[section could not be transformed: {err}]{CHUNK_SEPARATOR}{}",
                piece.text
            ));
            skipped.push(err);
        }

        Ok(Dispatched {
            text: outputs.join(CHUNK_SEPARATOR),
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redraft_common::types::{Provider, TransformMode};
    use redraft_transform::{ProviderErrorKind, ScriptedTransform};

    fn request(text: &str) -> TransformRequest {
        TransformRequest {
            text: text.to_string(),
            instructions: "rewrite".to_string(),
            content_source: None,
            style_source: None,
            provider: Provider::Anthropic,
            mode: TransformMode::Rewrite,
        }
    }

    #[tokio::test]
    async fn passes_through_when_it_fits() {
        let fake = Arc::new(ScriptedTransform::tagging("T"));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let out = dispatcher.dispatch(&request("Hello.")).await.unwrap();
        assert_eq!(out.text, "T(Hello.)");
        assert!(out.skipped.is_empty());
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn resplits_on_context_error_and_keeps_order() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let fake = Arc::new(ScriptedTransform::tagging("T").with_context_limit(30));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let out = dispatcher.dispatch(&request(text)).await.unwrap();
        assert!(out.skipped.is_empty());
        assert_eq!(
            out.text,
            "T(First paragraph here.)\n\nT(Second paragraph here.)\n\nT(Third paragraph here.)"
        );
        // One rejected attempt on the whole chunk, then one per paragraph.
        assert_eq!(fake.call_count(), 4);
    }

    #[tokio::test]
    async fn unsplittable_chunk_fails() {
        let sentence = "one long sentence without any break at all";
        let fake = Arc::new(ScriptedTransform::tagging("T").with_context_limit(10));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let err = dispatcher.dispatch(&request(sentence)).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::ContextTooLarge);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn unsplittable_piece_is_marked_inline() {
        let long = "an oversized sentence that never fits the limit";
        let text = format!("Ok.\n\n{long}");
        let fake = Arc::new(ScriptedTransform::tagging("T").with_context_limit(20));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let out = dispatcher.dispatch(&request(&text)).await.unwrap();
        assert!(out
            .text
            .starts_with("T(Ok.)\n\n[section could not be transformed: context too large"));
        assert!(out.text.ends_with(long));
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].kind, ProviderErrorKind::ContextTooLarge);
    }

    #[tokio::test]
    async fn depth_limit_stops_recursion() {
        let text = (0..16)
            .map(|i| format!("Sentence number {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        // Rejects everything, so each level keeps splitting until the cap.
        let fake = Arc::new(ScriptedTransform::new(|_| {
            Err(ProviderError::context_too_large("always"))
        }));
        let dispatcher = TransformDispatcher::new(fake.clone()).with_max_resplit_depth(2);

        let out = dispatcher.dispatch(&request(&text)).await.unwrap();
        assert!(out.text.contains("[section could not be transformed"));
        assert!(!out.skipped.is_empty());
        for i in 0..16 {
            assert!(out.text.contains(&format!("Sentence number {i}.")));
        }
        // Whole chunk, then at most two levels of halving: 1 + 2 + 4 calls.
        assert!(fake.call_count() <= 7);
    }

    #[tokio::test]
    async fn other_failures_propagate_without_retry() {
        let fake = Arc::new(ScriptedTransform::new(|_| Err(ProviderError::upstream("502"))));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let err = dispatcher.dispatch(&request("Anything.")).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn dispatch_once_never_resplits() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let fake = Arc::new(ScriptedTransform::tagging("T").with_context_limit(30));
        let dispatcher = TransformDispatcher::new(fake.clone());

        let err = dispatcher.dispatch_once(&request(text)).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::ContextTooLarge);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn sub_piece_failure_fails_the_chunk() {
        let fake = Arc::new(ScriptedTransform::new(|req| {
            if req.text.contains("\n\n") {
                Err(ProviderError::context_too_large("too big"))
            } else if req.text.starts_with("Bad") {
                Err(ProviderError::upstream("nope"))
            } else {
                Ok(req.text.clone())
            }
        }));
        let dispatcher = TransformDispatcher::new(fake);

        let err = dispatcher
            .dispatch(&request("Good part.\n\nBad part."))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Upstream);
    }
}
