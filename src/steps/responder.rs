//! Fallback conversation step
//!
//! Handles the non-lookup branch: a short context window from the most
//! recent transcript entries, one concise conversational reply. No session
//! field besides the transcript is touched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::PipelineError;
use crate::llm::LanguageModel;
use crate::models::{SessionState, StateDelta, StepOutcome, StepStatus};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::steps::Step;
use crate::transcript::{Message, Transcript};
use crate::Result;

/// Window size for the conversational context.
const CONTEXT_WINDOW: usize = 3;

pub struct FallbackResponder {
    llm: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl FallbackResponder {
    pub fn new(llm: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }
}

#[async_trait]
impl Step for FallbackResponder {
    fn name(&self) -> &'static str {
        "fallback_responder"
    }

    async fn run(&self, _state: &SessionState, transcript: &Transcript) -> Result<StepOutcome> {
        let context = transcript.formatted_window(CONTEXT_WINDOW);

        let prompt = format!(
            "Respond concisely to the conversation, prioritizing the most \
             recent message (the last one). Earlier messages may be summaries \
             of tool output:\n{}",
            context
        );
        let request = vec![Message::user(prompt)];

        let reply = run_with_retry(self.retry, "responder_llm", || self.llm.invoke(&request))
            .await
            .map_err(|e| PipelineError::Conversation(e.to_string()))?;

        info!("Conversational reply produced");

        Ok(StepOutcome::new(StepStatus::Success, StateDelta::default())
            .with_message(Message::assistant(reply)))
    }
}
