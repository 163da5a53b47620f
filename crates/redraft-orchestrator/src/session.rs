use redraft_common::types::{RunStatus, SessionId};
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::progress::{OrchestrationProgress, ProgressSink};

/// Explicit state for one caller's orchestration: run status, the cancel
/// token and where progress goes. The orchestrator is its only writer while a
/// run is active.
pub struct OrchestrationSession {
    id: SessionId,
    status: RunStatus,
    cancel: CancellationToken,
    sink: Option<Box<dyn ProgressSink>>,
    last_progress: Option<OrchestrationProgress>,
}

impl Default for OrchestrationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            status: RunStatus::Idle,
            cancel: CancellationToken::new(),
            sink: None,
            last_progress: None,
        }
    }

    pub fn with_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn last_progress(&self) -> Option<&OrchestrationProgress> {
        self.last_progress.as_ref()
    }

    /// Token for cancelling the current or next run from elsewhere. Every
    /// finished run gets a fresh token, so a clone taken earlier cannot reach
    /// a later run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the run in progress. Does nothing while no run is active.
    pub fn cancel(&self) {
        if self.status == RunStatus::Running {
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn begin(&mut self) -> Result<(), OrchestratorError> {
        if self.status == RunStatus::Running {
            return Err(OrchestratorError::AlreadyRunning);
        }
        self.status = RunStatus::Running;
        self.last_progress = None;
        Ok(())
    }

    pub(crate) fn publish(&mut self, progress: OrchestrationProgress) {
        if let Some(sink) = &self.sink {
            sink.on_progress(&progress);
        }
        self.last_progress = Some(progress);
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.cancel = CancellationToken::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_while_running_is_rejected() {
        let mut session = OrchestrationSession::new();
        session.begin().unwrap();
        assert!(matches!(session.begin(), Err(OrchestratorError::AlreadyRunning)));

        session.finish(RunStatus::Completed);
        assert!(session.begin().is_ok());
    }

    #[test]
    fn cancelled_run_rearms_the_token() {
        let mut session = OrchestrationSession::new();
        let token = session.cancel_token();
        session.begin().unwrap();
        token.cancel();
        assert!(session.is_cancelled());

        session.finish(RunStatus::Cancelled);
        assert_eq!(session.status(), RunStatus::Cancelled);
        assert!(!session.is_cancelled());
    }

    #[test]
    fn late_cancel_does_not_reach_the_next_run() {
        let mut session = OrchestrationSession::new();
        let stale = session.cancel_token();
        session.begin().unwrap();
        session.finish(RunStatus::Completed);

        stale.cancel();
        session.cancel();
        assert!(!session.is_cancelled());

        session.begin().unwrap();
        assert!(!session.is_cancelled());
        session.cancel();
        assert!(session.is_cancelled());
    }
}
