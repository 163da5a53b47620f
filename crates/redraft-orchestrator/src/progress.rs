use redraft_common::types::{RunId, TransformMode};
use serde::Serialize;
use tokio::sync::mpsc;

/// Immutable snapshot published after each dispatched chunk completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestrationProgress {
    pub run_id: RunId,
    pub phase: TransformMode,
    /// Plan index of the chunk that just finished; `None` for append.
    pub chunk_index: Option<usize>,
    /// Transform calls completed so far in this run. Only ever grows.
    pub current_chunk: usize,
    pub total_chunks: usize,
    /// The document as rebuilt so far, in plan order.
    pub accumulated_result: String,
}

impl OrchestrationProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total_chunks == 0 {
            0.0
        } else {
            (self.current_chunk as f64 / self.total_chunks as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_chunk >= self.total_chunks
    }
}

/// Receives progress snapshots. Called inline by the orchestrator, so
/// implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &OrchestrationProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&OrchestrationProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &OrchestrationProgress) {
        self(progress)
    }
}

/// Forwards snapshots into an unbounded channel so callers can consume them
/// as a stream. A dropped receiver is ignored.
pub struct ChannelSink(pub mpsc::UnboundedSender<OrchestrationProgress>);

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OrchestrationProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, progress: &OrchestrationProgress) {
        let _ = self.0.send(progress.clone());
    }
}
