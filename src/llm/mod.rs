//! Language-model service boundary
//!
//! Steps talk to the model through the `LanguageModel` trait; the concrete
//! Gemini client lives behind it so the pipeline stays testable offline.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::transcript::Message;
use crate::Result;

pub mod gemini;
pub use gemini::GeminiLlm;

/// Blocking, synchronous call into the external language-model service.
/// Transport, auth, and parse failures surface as `PipelineError::Llm`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<String>;
}

/// Scripted mock for development & testing.
/// Keeps the pipeline functional without the external dependency.
pub struct MockLlm {
    replies: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
        }
    }

    /// Replies are handed out in order; once exhausted, a canned line is
    /// returned so long conversations keep flowing.
    pub fn with_replies(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
        }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn invoke(&self, _messages: &[Message]) -> Result<String> {
        let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        Ok(replies
            .pop_front()
            .unwrap_or_else(|| "Understood.".to_string()))
    }
}

/// Mock that always fails, for exercising the abort paths.
pub struct FailingLlm;

#[async_trait]
impl LanguageModel for FailingLlm {
    async fn invoke(&self, _messages: &[Message]) -> Result<String> {
        Err(crate::error::PipelineError::Llm(
            "language model unavailable".to_string(),
        ))
    }
}
