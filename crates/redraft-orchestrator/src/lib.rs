pub mod dispatcher;
pub mod error;
pub mod options;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod reprocess;
pub mod runner;
pub mod session;

pub use dispatcher::{Dispatched, TransformDispatcher};
pub use error::{ChunkTransformError, OrchestratorError, RefinementError, SelectionError};
pub use options::{Operation, Selection, TransformOptions};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use progress::{ChannelSink, OrchestrationProgress, ProgressSink};
pub use reprocess::{select_chunks_for_reprocessing, ReprocessingController, RewriteHistory};
pub use runner::RunHandle;
pub use session::OrchestrationSession;
