use redraft_chunker::ChunkPlan;
use redraft_common::types::{RunStatus, TransformMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{OrchestratorError, RefinementError, SelectionError};
use crate::options::{Operation, Selection, TransformOptions};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::prompts;
use crate::session::OrchestrationSession;

/// The last successful rewrite, kept so it can be refined again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteHistory {
    pub original_text: String,
    pub previous_instructions: String,
    pub current_rewrite: String,
}

/// Validate `indices` against `plan` and turn them into a selection.
/// Nothing is dispatched when this fails.
pub fn select_chunks_for_reprocessing(
    plan: &ChunkPlan,
    indices: impl IntoIterator<Item = usize>,
) -> Result<Selection, SelectionError> {
    let selection = Selection::new(indices);
    selection.validate(plan)?;
    Ok(selection)
}

/// Reruns chosen chunks of a plan and chains refinement passes over the most
/// recent result. Holds at most one [`RewriteHistory`]; each successful run
/// replaces it.
pub struct ReprocessingController {
    orchestrator: Arc<Orchestrator>,
    history: Option<RewriteHistory>,
    pending_refinement: String,
}

impl ReprocessingController {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            history: None,
            pending_refinement: String::new(),
        }
    }

    pub fn history(&self) -> Option<&RewriteHistory> {
        self.history.as_ref()
    }

    pub fn set_history(&mut self, history: RewriteHistory) {
        self.history = Some(history);
    }

    /// Refinement text staged by the caller before it asks for a pass.
    pub fn pending_refinement(&self) -> &str {
        &self.pending_refinement
    }

    pub fn set_pending_refinement(&mut self, instructions: impl Into<String>) {
        self.pending_refinement = instructions.into();
    }

    /// Run operations over a plan and remember the result for refinement.
    pub async fn run(
        &mut self,
        session: &mut OrchestrationSession,
        plan: &ChunkPlan,
        options: &TransformOptions,
        operations: Vec<Operation>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let outcome = self
            .orchestrator
            .run_operations(session, plan, options, operations)
            .await?;
        self.record(plan, &options.instructions, &outcome);
        Ok(outcome)
    }

    /// Rewrite only the chunks in `selection`; every other chunk is carried
    /// over byte for byte.
    pub async fn reprocess(
        &mut self,
        session: &mut OrchestrationSession,
        plan: &ChunkPlan,
        selection: Selection,
        instructions: &str,
        options: &TransformOptions,
    ) -> Result<RunOutcome, OrchestratorError> {
        let options = TransformOptions {
            instructions: instructions.to_string(),
            mode: TransformMode::Rewrite,
            ..options.clone()
        };
        self.run(session, plan, &options, vec![Operation::Rewrite(selection)])
            .await
    }

    /// Validate `indices` and reprocess them in one step.
    pub async fn reprocess_selected(
        &mut self,
        session: &mut OrchestrationSession,
        plan: &ChunkPlan,
        indices: impl IntoIterator<Item = usize>,
        instructions: &str,
        options: &TransformOptions,
    ) -> Result<RunOutcome, OrchestratorError> {
        let selection = select_chunks_for_reprocessing(plan, indices)?;
        self.reprocess(session, plan, selection, instructions, options)
            .await
    }

    /// Apply `refinement` to the last rewrite as a single call. On success
    /// the history holds the refined text and the pending refinement is
    /// cleared.
    pub async fn refine_last_rewrite(
        &mut self,
        refinement: &str,
        options: &TransformOptions,
    ) -> Result<String, RefinementError> {
        let history = self.history.as_mut().ok_or(RefinementError::NoHistory)?;
        if history.current_rewrite.trim().is_empty() {
            return Err(RefinementError::EmptyRewrite);
        }
        let refinement = refinement.trim().to_string();
        if refinement.is_empty() {
            return Err(RefinementError::EmptyInstructions);
        }

        let instructions =
            prompts::refinement_instructions(&history.previous_instructions, &refinement);
        let request = options.request(
            history.current_rewrite.clone(),
            TransformMode::Rewrite,
            instructions,
        );

        let out = self.orchestrator.dispatcher().dispatch(&request).await?;
        for err in &out.skipped {
            tracing::warn!(error = %err, "Part of the rewrite kept unrefined");
        }
        let refined = out.text;
        tracing::info!(chars = refined.len(), "Refined last rewrite");

        history.current_rewrite = refined.clone();
        history.previous_instructions = refinement;
        self.pending_refinement.clear();
        Ok(refined)
    }

    fn record(&mut self, plan: &ChunkPlan, instructions: &str, outcome: &RunOutcome) {
        if outcome.status != RunStatus::Completed {
            return;
        }
        self.history = Some(RewriteHistory {
            original_text: plan.reassemble(),
            previous_instructions: instructions.to_string(),
            current_rewrite: outcome.text.clone(),
        });
    }
}
