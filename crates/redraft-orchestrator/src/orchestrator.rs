use redraft_chunker::{ChunkPlan, PlanningError, CHUNK_SEPARATOR};
use redraft_common::config::AppConfig;
use redraft_common::types::{RunId, RunStatus, TransformMode};
use redraft_transform::TextTransform;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dispatcher::TransformDispatcher;
use crate::error::{ChunkTransformError, OrchestratorError};
use crate::options::{Operation, TransformOptions};
use crate::progress::OrchestrationProgress;
use crate::prompts;
use crate::session::OrchestrationSession;

/// Result of one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    /// The accumulated document. Partial when the run was cancelled.
    pub text: String,
    /// Per-chunk text after the run, in plan order, plus any appended
    /// sections. Unprocessed chunks keep their planned text.
    pub chunks: Vec<String>,
    pub failures: Vec<ChunkTransformError>,
    /// Transform calls that completed, successfully or not.
    pub dispatched: usize,
}

/// Drives a plan through the transform capability one chunk at a time.
///
/// Dispatch is strictly sequential: results are accumulated in plan order,
/// an optional cooldown separates consecutive calls, and cancellation is
/// checked before every call. A failing chunk is annotated inline with its
/// original text kept, and the run moves on.
pub struct Orchestrator {
    dispatcher: TransformDispatcher,
    cooldown: Duration,
}

impl Orchestrator {
    pub fn new(transform: Arc<dyn TextTransform>) -> Self {
        Self {
            dispatcher: TransformDispatcher::new(transform),
            cooldown: Duration::ZERO,
        }
    }

    pub fn from_config(transform: Arc<dyn TextTransform>, config: &AppConfig) -> Self {
        Self {
            dispatcher: TransformDispatcher::new(transform)
                .with_max_resplit_depth(config.max_resplit_depth),
            cooldown: config.cooldown(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: TransformDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher(&self) -> &TransformDispatcher {
        &self.dispatcher
    }

    /// Run `options.mode` over every chunk of the plan. Append mode asks for
    /// a single new section.
    pub async fn run(
        &self,
        session: &mut OrchestrationSession,
        plan: &ChunkPlan,
        options: &TransformOptions,
    ) -> Result<RunOutcome, OrchestratorError> {
        let operation = Operation::whole_plan(options.mode, plan);
        self.run_operations(session, plan, options, vec![operation])
            .await
    }

    /// Run several operations in one pass. They are applied in the order
    /// rewrite, expand, append so that append sees the rewritten text.
    pub async fn run_operations(
        &self,
        session: &mut OrchestrationSession,
        plan: &ChunkPlan,
        options: &TransformOptions,
        mut operations: Vec<Operation>,
    ) -> Result<RunOutcome, OrchestratorError> {
        validate(plan, options, &operations)?;
        operations.sort_by_key(Operation::mode);

        session.begin()?;

        let run_id = RunId::new();
        let started = Instant::now();
        let total: usize = operations.iter().map(Operation::units).sum();
        let mut run = RunState {
            run_id,
            slots: plan.texts(),
            failures: Vec::new(),
            completed: 0,
            failed: 0,
            total,
            passes_done: 0,
            stopped_at: None,
        };

        tracing::info!(
            %run_id,
            session_id = %session.id(),
            chunks = plan.len(),
            calls = total,
            "Starting orchestration run"
        );

        for operation in &operations {
            let finished = match operation {
                Operation::Rewrite(selection) | Operation::Expand(selection) => {
                    let mode = operation.mode();
                    let instructions = match mode {
                        TransformMode::Expand => prompts::expand_instructions(&options.instructions),
                        _ => options.instructions.clone(),
                    };
                    self.chunk_pass(session, &mut run, options, mode, &instructions, |i| {
                        selection.contains(i)
                    })
                    .await
                }
                Operation::Append { sections } => {
                    self.append_pass(session, &mut run, options, *sections).await
                }
            };
            if !finished {
                break;
            }
            run.passes_done += 1;
        }

        let status = if run.stopped_at.is_some() {
            RunStatus::Cancelled
        } else if run.completed > 0 && run.failed == run.completed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        session.finish(status);

        let text = match run.stopped_at {
            Some(next) => run.result_through(next),
            None => run.slots.join(CHUNK_SEPARATOR),
        };

        tracing::info!(
            %run_id,
            %status,
            dispatched = run.completed,
            failed = run.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Orchestration run finished"
        );

        Ok(RunOutcome {
            run_id,
            status,
            text,
            chunks: run.slots,
            failures: run.failures,
            dispatched: run.completed,
        })
    }

    /// Walk every slot in order, transforming the selected ones. Returns
    /// `false` if cancellation stopped the pass, with `stopped_at` set to the
    /// first slot that was not reached.
    async fn chunk_pass(
        &self,
        session: &mut OrchestrationSession,
        run: &mut RunState,
        options: &TransformOptions,
        mode: TransformMode,
        instructions: &str,
        selected: impl Fn(usize) -> bool,
    ) -> bool {
        for index in (0..run.slots.len()).filter(|&i| selected(i)) {
            if !self.wait_turn(session, run.completed > 0).await {
                tracing::info!(run_id = %run.run_id, chunk = index, "Cancellation observed");
                run.stopped_at = Some(index);
                return false;
            }

            let request = options.request(run.slots[index].clone(), mode, instructions);
            tracing::debug!(run_id = %run.run_id, chunk = index, %mode, "Dispatching chunk");

            match self.dispatcher.dispatch(&request).await {
                Ok(out) => {
                    for err in &out.skipped {
                        tracing::warn!(run_id = %run.run_id, chunk = index, error = %err, "Part of chunk kept untransformed");
                        run.failures.push(ChunkTransformError::new(index, err));
                    }
                    run.slots[index] = out.text;
                }
                Err(err) => {
                    let failure = ChunkTransformError::new(index, &err);
                    tracing::warn!(run_id = %run.run_id, chunk = index, error = %err, "Chunk transform failed");
                    run.slots[index] = failure.annotate(&run.slots[index]);
                    run.failures.push(failure);
                    run.failed += 1;
                }
            }

            run.completed += 1;
            let accumulated = run.result_through(index + 1);
            session.publish(run.snapshot(mode, Some(index), accumulated));
        }

        true
    }

    async fn append_pass(
        &self,
        session: &mut OrchestrationSession,
        run: &mut RunState,
        options: &TransformOptions,
        sections: usize,
    ) -> bool {
        if !self.wait_turn(session, run.completed > 0).await {
            tracing::info!(run_id = %run.run_id, "Cancellation observed before append");
            run.stopped_at = Some(0);
            return false;
        }

        let document = run.slots.join(CHUNK_SEPARATOR);
        let instructions = prompts::append_instructions(&options.instructions, sections);
        let request = options.request(document, TransformMode::Append, instructions);
        let index = run.slots.len();

        // One call for the whole document; re-splitting would repeat the new
        // sections once per piece.
        match self.dispatcher.dispatch_once(&request).await {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    run.slots.push(text.to_string());
                }
            }
            Err(err) => {
                let failure = ChunkTransformError::new(index, &err);
                tracing::warn!(run_id = %run.run_id, error = %err, "Append failed");
                run.slots.push(format!("[{failure}]"));
                run.failures.push(failure);
                run.failed += 1;
            }
        }

        run.completed += 1;
        let accumulated = run.slots.join(CHUNK_SEPARATOR);
        session.publish(run.snapshot(TransformMode::Append, None, accumulated));
        true
    }

    /// Honour the cooldown between calls. Returns `false` once cancelled.
    async fn wait_turn(&self, session: &OrchestrationSession, after_call: bool) -> bool {
        if session.is_cancelled() {
            return false;
        }
        if after_call && !self.cooldown.is_zero() {
            let token = session.cancel_token();
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
        !session.is_cancelled()
    }
}

struct RunState {
    run_id: RunId,
    slots: Vec<String>,
    failures: Vec<ChunkTransformError>,
    /// Units dispatched, successfully or not.
    completed: usize,
    /// Units whose call failed outright.
    failed: usize,
    total: usize,
    passes_done: usize,
    /// First slot the interrupted pass did not reach.
    stopped_at: Option<usize>,
}

impl RunState {
    /// The result so far with the current pass finished up to `next`. Once an
    /// earlier pass has completed, the slots after `next` carry its output
    /// and belong to the result too.
    fn result_through(&self, next: usize) -> String {
        if self.passes_done > 0 {
            self.slots.join(CHUNK_SEPARATOR)
        } else {
            self.slots[..next].join(CHUNK_SEPARATOR)
        }
    }

    fn snapshot(
        &self,
        phase: TransformMode,
        chunk_index: Option<usize>,
        accumulated_result: String,
    ) -> OrchestrationProgress {
        OrchestrationProgress {
            run_id: self.run_id,
            phase,
            chunk_index,
            current_chunk: self.completed,
            total_chunks: self.total,
            accumulated_result,
        }
    }
}

fn validate(
    plan: &ChunkPlan,
    options: &TransformOptions,
    operations: &[Operation],
) -> Result<(), OrchestratorError> {
    if plan.is_empty() {
        return Err(PlanningError::EmptyDocument.into());
    }
    if options.instructions.trim().is_empty() {
        return Err(OrchestratorError::EmptyInstructions);
    }
    if operations.is_empty() {
        return Err(OrchestratorError::NoOperations);
    }
    for operation in operations {
        match operation {
            Operation::Rewrite(selection) | Operation::Expand(selection) => {
                selection.validate(plan)?
            }
            Operation::Append { sections: 0 } => return Err(OrchestratorError::InvalidAppendCount),
            Operation::Append { .. } => {}
        }
    }
    Ok(())
}
