//! Data fetching step
//!
//! Dispatches every requested tool through the registry with bounded retry.
//! Per-tool failures are contained: an unresolved name fails fast, an
//! exhausted retry budget is recorded as a persistent failure, and sibling
//! tools always run. A partial data set still flows to the summarizer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::{PipelineStatus, SessionState, StateDelta, StepOutcome, StepStatus};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::steps::Step;
use crate::tools::{normalize_tool_name, ToolRegistry};
use crate::transcript::{Message, Transcript};
use crate::Result;

/// Collects raw provider payloads for the requested tools.
pub struct Fetcher {
    registry: Arc<ToolRegistry>,
    retry: RetryPolicy,
    /// Collapse duplicate requests before dispatch. Off by default: a tool
    /// requested twice is invoked twice, last write wins per result key.
    dedupe_requested: bool,
}

impl Fetcher {
    pub fn new(registry: Arc<ToolRegistry>, retry: RetryPolicy, dedupe_requested: bool) -> Self {
        Self {
            registry,
            retry,
            dedupe_requested,
        }
    }

    fn dispatch_list(&self, requested: &[String]) -> Vec<String> {
        if !self.dedupe_requested {
            return requested.to_vec();
        }

        let mut seen = Vec::new();
        let mut list = Vec::new();
        for name in requested {
            let normalized = normalize_tool_name(name);
            if !seen.contains(&normalized) {
                seen.push(normalized);
                list.push(name.clone());
            }
        }
        list
    }
}

#[async_trait]
impl Step for Fetcher {
    fn name(&self) -> &'static str {
        "fetcher"
    }

    async fn run(&self, state: &SessionState, _transcript: &Transcript) -> Result<StepOutcome> {
        let mut delta = StateDelta {
            status: Some(PipelineStatus::Fetched),
            ..Default::default()
        };
        let mut successful_tools: Vec<String> = Vec::new();

        for tool_name in self.dispatch_list(&state.requested_tools) {
            // Resolution failures are non-retryable and consume no budget
            let tool = match self.registry.resolve(&tool_name) {
                Ok(tool) => tool,
                Err(error) => {
                    warn!(tool = %tool_name, error = %error, "Tool unresolved, skipping");
                    continue;
                }
            };

            let subject = state.subject.clone();
            match run_with_retry(self.retry, &tool_name, || tool.fetch(&subject)).await {
                Ok(payload) => {
                    delta.raw_results.insert(tool_name.clone(), payload);
                    successful_tools.push(tool_name);
                }
                Err(error) => {
                    warn!(tool = %tool_name, error = %error, "Persistent tool failure");
                }
            }
        }

        info!(
            requested = state.requested_tools.len(),
            succeeded = successful_tools.len(),
            "Fetch completed"
        );

        // Whole-step tag: any tool succeeded counts as success
        let status = if successful_tools.is_empty() {
            StepStatus::PartialFailure
        } else {
            StepStatus::Success
        };

        let summary = format!(
            "Fetched and normalized data from tools: {}",
            successful_tools.join(", ")
        );

        Ok(StepOutcome::new(status, delta).with_message(Message::assistant(summary)))
    }
}
