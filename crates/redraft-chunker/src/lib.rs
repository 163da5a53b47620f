pub mod planner;
pub mod splitter;

pub use planner::{plan, plan_chunks, ChunkPlan, ChunkingPolicy, PlanningError, SplitGranularity};
pub use splitter::BoundarySplitter;

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Separator placed between chunks when a plan is reassembled.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// One planned segment of a document. Identity is the index; rewriting a
/// chunk produces new text for the same index, never a new chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub token_estimate: usize,
    /// Byte range in the source document covered by this chunk, when it
    /// could be located.
    pub source_span: Option<Range<usize>>,
}

/// Approximates how many model tokens a span of text will consume.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// ~4 characters per token. Counts chars, not bytes, so non-ASCII text is
/// not overestimated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristic;

impl TokenEstimator for CharHeuristic {
    fn estimate(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Estimate token count using the ~4 chars per token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
