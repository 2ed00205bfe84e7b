//! Summarization step
//!
//! Folds the collected provider payloads into a statistics-oriented
//! narrative. Runs even on an empty data set: the model is told explicitly
//! that nothing could be retrieved and produces a best-effort
//! insufficient-data narrative instead of the pipeline aborting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::PipelineError;
use crate::llm::LanguageModel;
use crate::models::{PipelineStatus, SessionState, StateDelta, StepOutcome, StepStatus};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::steps::Step;
use crate::transcript::{Message, Transcript};
use crate::Result;

/// Derives the final answer from whatever data the fetch produced.
pub struct Summarizer {
    llm: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    fn build_prompt(&self, state: &SessionState, transcript: &Transcript) -> Result<String> {
        let context = transcript.formatted_window(3);

        let data_section = if state.raw_results.is_empty() {
            "No provider data could be retrieved for this request. State that \
             clearly and explain what a user can do next."
                .to_string()
        } else {
            serde_json::to_string_pretty(&state.raw_results)?
        };

        Ok(format!(
            r#"You are a financial analyst. Summarize the performance of {} based on this data:

{}

Recent conversation:
{}

Provide specific statistics, trends, and insights. If the data is missing or
incomplete, say so and give a best-effort narrative with reduced confidence."#,
            state.subject, data_section, context
        ))
    }

    /// Terminal completion tag: every requested tool delivered a payload
    /// means success, anything less is a partial failure.
    fn completion_tag(state: &SessionState) -> PipelineStatus {
        let all_delivered = state
            .requested_tools
            .iter()
            .all(|tool| state.raw_results.contains_key(tool));

        if all_delivered && !state.raw_results.is_empty() {
            PipelineStatus::Success
        } else {
            PipelineStatus::PartialFailure
        }
    }
}

#[async_trait]
impl Step for Summarizer {
    fn name(&self) -> &'static str {
        "summarizer"
    }

    async fn run(&self, state: &SessionState, transcript: &Transcript) -> Result<StepOutcome> {
        let prompt = self.build_prompt(state, transcript)?;
        let request = vec![Message::user(prompt)];

        let answer = run_with_retry(self.retry, "summarizer_llm", || self.llm.invoke(&request))
            .await
            .map_err(|e| PipelineError::Summarization(e.to_string()))?;

        info!(
            subject = %state.subject,
            sources = state.raw_results.len(),
            "Summary produced"
        );

        let delta = StateDelta {
            final_answer: Some(answer.clone()),
            status: Some(Self::completion_tag(state)),
            ..Default::default()
        };

        Ok(StepOutcome::new(StepStatus::Success, delta).with_message(Message::assistant(answer)))
    }
}
