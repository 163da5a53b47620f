use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::splitter::BoundarySplitter;
use crate::{estimate_tokens, Chunk, CHUNK_SEPARATOR};

/// Finest boundary the splitter starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitGranularity {
    /// Paragraphs first, sentences only for paragraphs that do not fit.
    #[default]
    Paragraph,
    /// Sentences packed greedily, paragraph breaks kept between them.
    Sentence,
}

/// Budgets that decide whether a document goes out in one call or in chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingPolicy {
    /// Documents estimated at or below this go out as a single chunk.
    pub single_call_budget: usize,
    /// Budget for each chunk once splitting is required.
    pub chunk_budget: usize,
    #[serde(default)]
    pub granularity: SplitGranularity,
}

impl ChunkingPolicy {
    pub fn new(single_call_budget: usize) -> Self {
        Self {
            single_call_budget,
            chunk_budget: single_call_budget,
            granularity: SplitGranularity::Paragraph,
        }
    }

    pub fn with_chunk_budget(mut self, chunk_budget: usize) -> Self {
        self.chunk_budget = chunk_budget;
        self
    }

    pub fn with_granularity(mut self, granularity: SplitGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn validate(&self) -> Result<(), PlanningError> {
        if self.single_call_budget == 0 || self.chunk_budget == 0 {
            return Err(PlanningError::ZeroBudget);
        }
        if self.chunk_budget > self.single_call_budget {
            return Err(PlanningError::ChunkBudgetTooLarge {
                chunk_budget: self.chunk_budget,
                single_call_budget: self.single_call_budget,
            });
        }
        Ok(())
    }

    pub fn splitter(&self) -> BoundarySplitter {
        BoundarySplitter::new(self.chunk_budget).with_granularity(self.granularity)
    }
}

/// Ordered chunks derived from one document under one policy. Read-only:
/// a changed document or policy means a new plan, never an edited one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    chunks: Vec<Chunk>,
    policy: ChunkingPolicy,
    fingerprint: String,
}

impl ChunkPlan {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// True when one call covers the whole document.
    pub fn is_single(&self) -> bool {
        self.chunks.len() == 1
    }

    pub fn policy(&self) -> &ChunkingPolicy {
        &self.policy
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }

    pub fn reassemble(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR)
    }

    /// Whether this plan no longer describes `document` under `policy`.
    pub fn is_stale_for(&self, document: &str, policy: &ChunkingPolicy) -> bool {
        self.fingerprint != fingerprint(document, policy)
    }
}

/// Plan `document` under `policy`.
pub fn plan(document: &str, policy: &ChunkingPolicy) -> Result<ChunkPlan, PlanningError> {
    policy.validate()?;

    if document.trim().is_empty() {
        return Err(PlanningError::EmptyDocument);
    }

    let fingerprint = fingerprint(document, policy);
    let total_tokens = estimate_tokens(document);

    if total_tokens <= policy.single_call_budget {
        tracing::debug!(total_tokens, "Document fits in a single call");
        return Ok(ChunkPlan {
            chunks: vec![Chunk {
                index: 0,
                text: document.to_string(),
                token_estimate: total_tokens,
                source_span: Some(0..document.len()),
            }],
            policy: *policy,
            fingerprint,
        });
    }

    let splitter = policy.splitter();
    let mut cursor = 0;
    let chunks: Vec<Chunk> = splitter
        .split(document)
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let source_span = locate(document, &text, &mut cursor);
            Chunk {
                index,
                token_estimate: splitter.estimate(&text),
                text,
                source_span,
            }
        })
        .collect();

    tracing::info!(
        total_tokens,
        chunk_count = chunks.len(),
        chunk_budget = policy.chunk_budget,
        "Planned multi-chunk document"
    );

    Ok(ChunkPlan {
        chunks,
        policy: *policy,
        fingerprint,
    })
}

/// Plan with a single budget used both for the one-call check and per chunk.
pub fn plan_chunks(document: &str, budget: usize) -> Result<ChunkPlan, PlanningError> {
    plan(document, &ChunkingPolicy::new(budget))
}

/// Walk the chunk's words through the source to find the byte span it covers.
/// Split points may have collapsed whitespace, so exact substring search is
/// not enough.
fn locate(document: &str, chunk: &str, cursor: &mut usize) -> Option<std::ops::Range<usize>> {
    let mut start = None;
    let mut pos = *cursor;

    for word in chunk.split_whitespace() {
        let found = document[pos..].find(word)? + pos;
        start.get_or_insert(found);
        pos = found + word.len();
    }

    *cursor = pos;
    start.map(|s| s..pos)
}

fn fingerprint(document: &str, policy: &ChunkingPolicy) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update(policy.single_call_budget.to_le_bytes());
    hasher.update(policy.chunk_budget.to_le_bytes());
    hasher.update([policy.granularity as u8]);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    #[error("document is empty")]
    EmptyDocument,
    #[error("token budget must be greater than zero")]
    ZeroBudget,
    #[error("chunk budget {chunk_budget} exceeds single-call budget {single_call_budget}")]
    ChunkBudgetTooLarge {
        chunk_budget: usize,
        single_call_budget: usize,
    },
}
