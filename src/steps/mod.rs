//! Processing steps
//!
//! Each step is one node in the orchestration graph: a transformation from
//! (session state, transcript) to a result envelope. Steps read shared state
//! but never mutate it; all updates flow through the orchestrator's merge.

use async_trait::async_trait;

use crate::models::{SessionState, StepOutcome};
use crate::transcript::Transcript;
use crate::Result;

pub mod fetcher;
pub mod planner;
pub mod responder;
pub mod summarizer;

pub use fetcher::Fetcher;
pub use planner::Planner;
pub use responder::FallbackResponder;
pub use summarizer::Summarizer;

/// One node in the orchestration graph.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    /// Perform the step's work against a read-only view of the run.
    async fn run(&self, state: &SessionState, transcript: &Transcript) -> Result<StepOutcome>;
}
