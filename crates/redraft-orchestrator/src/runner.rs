use redraft_chunker::ChunkPlan;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::options::{Operation, TransformOptions};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::progress::{ChannelSink, OrchestrationProgress};
use crate::session::OrchestrationSession;

/// An orchestration run executing on its own tokio task.
pub struct RunHandle {
    progress: mpsc::UnboundedReceiver<OrchestrationProgress>,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, OrchestratorError>>,
}

impl RunHandle {
    /// Spawn a run over `plan`. Progress snapshots arrive on [`RunHandle::progress`].
    pub fn spawn(
        orchestrator: Arc<Orchestrator>,
        plan: ChunkPlan,
        options: TransformOptions,
        operations: Vec<Operation>,
    ) -> Self {
        let (sink, progress) = ChannelSink::channel();
        let mut session = OrchestrationSession::new().with_sink(sink);
        let cancel = session.cancel_token();
        let session_id = session.id();

        let task = tokio::spawn(async move {
            let result = orchestrator
                .run_operations(&mut session, &plan, &options, operations)
                .await;
            match &result {
                Ok(outcome) => {
                    tracing::info!(%session_id, status = %outcome.status, "Background run finished")
                }
                Err(e) => tracing::error!(%session_id, error = %e, "Background run rejected"),
            }
            result
        });

        Self {
            progress,
            cancel,
            task,
        }
    }

    pub fn progress(&mut self) -> &mut mpsc::UnboundedReceiver<OrchestrationProgress> {
        &mut self.progress
    }

    /// Stop before the next chunk starts. The call in flight is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<RunOutcome, OrchestratorError> {
        self.task
            .await
            .map_err(|e| OrchestratorError::TaskFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redraft_chunker::plan_chunks;
    use redraft_common::types::RunStatus;
    use redraft_transform::ScriptedTransform;
    use std::time::Duration;

    #[tokio::test]
    async fn streams_progress_then_joins() {
        let fake = Arc::new(ScriptedTransform::tagging("R"));
        let orchestrator = Arc::new(Orchestrator::new(fake));
        let plan = plan_chunks("One.\n\nTwo.", 1).unwrap();

        let mut handle = RunHandle::spawn(
            orchestrator,
            plan.clone(),
            TransformOptions::new("go"),
            vec![Operation::whole_plan(Default::default(), &plan)],
        );

        let first = handle.progress().recv().await.unwrap();
        assert_eq!(first.current_chunk, 1);
        let second = handle.progress().recv().await.unwrap();
        assert_eq!(second.accumulated_result, "R(One.)\n\nR(Two.)");

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_handle() {
        let fake = Arc::new(
            ScriptedTransform::tagging("R").with_latency(|_| Duration::from_millis(500)),
        );
        let orchestrator = Arc::new(Orchestrator::new(fake.clone()));
        let plan = plan_chunks("One.\n\nTwo.\n\nThree.", 1).unwrap();

        let mut handle = RunHandle::spawn(
            orchestrator,
            plan.clone(),
            TransformOptions::new("go"),
            vec![Operation::whole_plan(Default::default(), &plan)],
        );

        handle.progress().recv().await.unwrap();
        handle.cancel();

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(fake.call_count() < 3);
    }
}
