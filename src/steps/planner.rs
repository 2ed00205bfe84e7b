//! Tool planning step
//!
//! Asks the language model which of the known market-data providers are
//! needed for the subject, then parses the free-text reply by testing for
//! the presence of each capability name. Unrecognized text is discarded.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::llm::LanguageModel;
use crate::models::{PipelineStatus, SessionState, StateDelta, StepOutcome, StepStatus};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::steps::Step;
use crate::transcript::{Message, Transcript};
use crate::Result;

lazy_static! {
    static ref ALPHA_VANTAGE_RE: Regex = Regex::new(r"(?i)alpha\s*vantage").unwrap();
    static ref YAHOO_FINANCE_RE: Regex = Regex::new(r"(?i)yahoo\s*finance").unwrap();
}

/// Extract known capability names from free-text model output.
/// Case-insensitive and whitespace-tolerant; anything else is ignored.
pub fn parse_capabilities(text: &str) -> Vec<String> {
    let mut tools = Vec::new();

    if ALPHA_VANTAGE_RE.is_match(text) {
        tools.push("Alpha Vantage".to_string());
    }
    if YAHOO_FINANCE_RE.is_match(text) {
        tools.push("Yahoo Finance".to_string());
    }

    tools
}

/// Chooses which providers to call for the current subject.
pub struct Planner {
    llm: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl Planner {
    pub fn new(llm: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    fn build_prompt(&self, subject: &str, transcript: &Transcript) -> String {
        let context = transcript.formatted_window(1);

        format!(
            r#"You are a financial assistant. You can only use the following data providers:
- Alpha Vantage
- Yahoo Finance

Your goal is to identify which of these providers are required to summarize the performance of {}.

User context: {}

Respond ONLY with the provider names separated by commas, nothing else.
Example response: "Alpha Vantage, Yahoo Finance""#,
            subject, context
        )
    }
}

#[async_trait]
impl Step for Planner {
    fn name(&self) -> &'static str {
        "planner"
    }

    async fn run(&self, state: &SessionState, transcript: &Transcript) -> Result<StepOutcome> {
        let prompt = self.build_prompt(&state.subject, transcript);
        let request = vec![Message::user(prompt)];

        let reply = run_with_retry(self.retry, "planner_llm", || self.llm.invoke(&request))
            .await
            .map_err(|e| PipelineError::Planning(e.to_string()))?;

        let tools = parse_capabilities(&reply);

        debug!(reply = %reply, ?tools, "Planner reply parsed");
        info!(subject = %state.subject, tool_count = tools.len(), "Plan created");

        let delta = StateDelta {
            requested_tools: tools,
            status: Some(PipelineStatus::Planned),
            ..Default::default()
        };

        Ok(StepOutcome::new(StepStatus::Success, delta)
            .with_message(Message::assistant(format!("Querying: {}", reply.trim()))))
    }
}
