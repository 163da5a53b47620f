use redraft_chunker::ChunkPlan;
use redraft_common::types::{Provider, TransformMode};
use redraft_transform::TransformRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::SelectionError;

/// User-selected options carried unchanged to every call of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub instructions: String,
    pub content_source: Option<String>,
    pub use_content_source: bool,
    pub style_source: Option<String>,
    pub use_style_source: bool,
    pub provider: Provider,
    pub mode: TransformMode,
}

impl TransformOptions {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Default::default()
        }
    }

    pub fn with_content_source(mut self, source: impl Into<String>) -> Self {
        self.content_source = Some(source.into());
        self.use_content_source = true;
        self
    }

    pub fn with_style_source(mut self, source: impl Into<String>) -> Self {
        self.style_source = Some(source.into());
        self.use_style_source = true;
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build a request for `text`. Reference sources are forwarded only when
    /// enabled and non-blank.
    pub fn request(
        &self,
        text: impl Into<String>,
        mode: TransformMode,
        instructions: impl Into<String>,
    ) -> TransformRequest {
        TransformRequest {
            text: text.into(),
            instructions: instructions.into(),
            content_source: enabled(self.use_content_source, &self.content_source),
            style_source: enabled(self.use_style_source, &self.style_source),
            provider: self.provider,
            mode,
        }
    }
}

fn enabled(flag: bool, source: &Option<String>) -> Option<String> {
    source
        .as_ref()
        .filter(|s| flag && !s.trim().is_empty())
        .cloned()
}

/// Chunk indices chosen for an operation, kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    indices: BTreeSet<usize>,
}

impl Selection {
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    pub fn all(len: usize) -> Self {
        Self::new(0..len)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn validate(&self, plan: &ChunkPlan) -> Result<(), SelectionError> {
        if self.indices.is_empty() {
            return Err(SelectionError::Empty);
        }
        match self.indices.iter().find(|&&i| i >= plan.len()) {
            Some(&index) => Err(SelectionError::OutOfRange {
                index,
                len: plan.len(),
            }),
            None => Ok(()),
        }
    }
}

/// One step of a run. Steps always execute rewrite, then expand, then
/// append, whatever order they were requested in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Rewrite(Selection),
    Expand(Selection),
    Append { sections: usize },
}

impl Operation {
    pub fn mode(&self) -> TransformMode {
        match self {
            Operation::Rewrite(_) => TransformMode::Rewrite,
            Operation::Expand(_) => TransformMode::Expand,
            Operation::Append { .. } => TransformMode::Append,
        }
    }

    /// Number of transform calls this step makes.
    pub fn units(&self) -> usize {
        match self {
            Operation::Rewrite(sel) | Operation::Expand(sel) => sel.len(),
            Operation::Append { .. } => 1,
        }
    }

    /// The default step for `mode` over a whole plan.
    pub fn whole_plan(mode: TransformMode, plan: &ChunkPlan) -> Self {
        match mode {
            TransformMode::Rewrite => Operation::Rewrite(Selection::all(plan.len())),
            TransformMode::Expand => Operation::Expand(Selection::all(plan.len())),
            TransformMode::Append => Operation::Append { sections: 1 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redraft_chunker::plan_chunks;

    #[test]
    fn disabled_sources_are_not_forwarded() {
        let mut options = TransformOptions::new("tighten")
            .with_content_source("facts")
            .with_style_source("   ");
        options.use_content_source = false;

        let req = options.request("body", TransformMode::Rewrite, "tighten");
        assert_eq!(req.content_source, None);
        assert_eq!(req.style_source, None);

        let options = TransformOptions::new("tighten").with_content_source("facts");
        let req = options.request("body", TransformMode::Expand, "more");
        assert_eq!(req.content_source.as_deref(), Some("facts"));
        assert_eq!(req.mode, TransformMode::Expand);
        assert_eq!(req.instructions, "more");
    }

    #[test]
    fn selection_validation() {
        let plan = plan_chunks("One.\n\nTwo.\n\nThree.", 1).unwrap();
        assert_eq!(plan.len(), 3);

        assert_eq!(Selection::new([]).validate(&plan), Err(SelectionError::Empty));
        assert_eq!(
            Selection::new([0, 3]).validate(&plan),
            Err(SelectionError::OutOfRange { index: 3, len: 3 })
        );
        assert!(Selection::new([2, 0]).validate(&plan).is_ok());
    }

    #[test]
    fn selection_is_sorted_and_deduplicated() {
        let sel = Selection::new([2, 0, 2]);
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn operation_units() {
        assert_eq!(Operation::Rewrite(Selection::all(4)).units(), 4);
        assert_eq!(Operation::Append { sections: 3 }.units(), 1);
    }
}
