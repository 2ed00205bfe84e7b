//! Process configuration
//!
//! One credential per external collaborator, read from the environment once
//! at startup. A missing credential is fatal here, never a per-call error.

use std::env;
use std::time::Duration;

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::Result;

/// Runtime configuration for the pipeline and its external collaborators.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub alpha_vantage_api_key: String,
    pub yahoo_finance_api_key: String,
    /// When set, duplicate entries in the requested-tool list are collapsed
    /// before dispatch. Off by default: a tool requested twice is invoked
    /// twice, last write wins per result key.
    pub dedupe_requested_tools: bool,
    /// Retry budget for tool invocations.
    pub tool_retry: RetryPolicy,
    /// Retry budget for language-model invocations. A single attempt by
    /// default; the same combinator accepts any policy.
    pub llm_retry: RetryPolicy,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gemini_api_key: require_var("GEMINI_API_KEY")?,
            alpha_vantage_api_key: require_var("ALPHA_VANTAGE_API_KEY")?,
            yahoo_finance_api_key: require_var("YAHOO_FINANCE_API_KEY")?,
            dedupe_requested_tools: flag_var("AGENT_DEDUPE_TOOLS"),
            tool_retry: RetryPolicy::new(3, Duration::from_secs(1)),
            llm_retry: RetryPolicy::new(1, Duration::from_secs(1)),
        })
    }
}

fn require_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PipelineError::Config(format!(
            "required environment variable {} is not set",
            name
        ))),
    }
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_is_fatal() {
        env::remove_var("GEMINI_API_KEY");

        let result = Config::from_env();
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_flag_parsing() {
        env::set_var("AGENT_DEDUPE_TOOLS_TEST", "true");
        assert!(flag_var("AGENT_DEDUPE_TOOLS_TEST"));

        env::set_var("AGENT_DEDUPE_TOOLS_TEST", "0");
        assert!(!flag_var("AGENT_DEDUPE_TOOLS_TEST"));

        env::remove_var("AGENT_DEDUPE_TOOLS_TEST");
        assert!(!flag_var("AGENT_DEDUPE_TOOLS_TEST"));
    }
}
