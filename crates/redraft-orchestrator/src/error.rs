use redraft_chunker::PlanningError;
use redraft_transform::ProviderError;
use serde::Serialize;

/// A single chunk that could not be transformed. Never aborts a run; it is
/// rendered inline next to the chunk's untransformed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("chunk {index} could not be transformed: {reason}")]
pub struct ChunkTransformError {
    pub index: usize,
    pub reason: String,
}

impl ChunkTransformError {
    pub fn new(index: usize, err: &ProviderError) -> Self {
        Self {
            index,
            reason: err.to_string(),
        }
    }

    /// Inline marker followed by the text that was kept in place.
    pub fn annotate(&self, preserved: &str) -> String {
        format!("[{self}]\n\n{preserved}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no chunks selected")]
    Empty,
    #[error("chunk index {index} is out of range for a plan of {len} chunks")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum RefinementError {
    #[error("there is no previous rewrite to refine")]
    NoHistory,
    #[error("the previous rewrite is empty")]
    EmptyRewrite,
    #[error("refinement instructions are empty")]
    EmptyInstructions,
    #[error("refinement failed: {0}")]
    Transform(#[from] ProviderError),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("planning error: {0}")]
    Planning(#[from] PlanningError),
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
    #[error("instructions are empty")]
    EmptyInstructions,
    #[error("append requires at least one new section")]
    InvalidAppendCount,
    #[error("no operations requested")]
    NoOperations,
    #[error("an orchestration run is already in progress")]
    AlreadyRunning,
    #[error("orchestration task failed: {0}")]
    TaskFailed(String),
}
