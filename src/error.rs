//! Error types for the market-lookup pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Step-Level Errors (abort the run)
    // =============================

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("Language model error: {0}")]
    Llm(String),

    // =============================
    // Per-Tool Errors (contained in the Fetcher)
    // =============================

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' failed: {cause}")]
    ToolFailed { tool: String, cause: String },

    // =============================
    // Startup Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the failure is worth another attempt. Unresolved tool names
    /// fail fast and never consume the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ToolFailed { .. } | PipelineError::Llm(_) | PipelineError::Http(_)
        )
    }
}
