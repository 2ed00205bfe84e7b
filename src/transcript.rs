//! Append-only conversation transcript
//!
//! Stores role-tagged messages shared by all steps of a run. Steps read a
//! sliding window over the most recent entries; only the orchestrator appends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only message log for one session.
///
/// No entry is ever removed or edited. Read access goes through the window
/// helpers so prompt size stays bounded regardless of session length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: VecDeque<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent entry, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Iterate over all messages in order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// The `count` most recent messages, oldest first.
    pub fn window(&self, count: usize) -> impl Iterator<Item = &Message> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip)
    }

    /// Format the `count` most recent messages as prompt context, one
    /// `role: text` line per entry.
    pub fn formatted_window(&self, count: usize) -> String {
        self.window(count)
            .map(|m| format!("{}: {}", m.role.as_str(), m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Count assistant entries (one per executed step in a well-formed run).
    pub fn assistant_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("lookup stock: AAPL"));
        transcript.push(Message::assistant("Querying: Alpha Vantage"));

        let roles: Vec<Role> = transcript.messages().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(transcript.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut transcript = Transcript::new();
        for i in 0..10 {
            transcript.push(Message::user(format!("message {}", i)));
        }

        let window: Vec<&Message> = transcript.window(3).collect();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].text, "message 7");
        assert_eq!(window[2].text, "message 9");
    }

    #[test]
    fn test_window_larger_than_history() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("hello"));

        assert_eq!(transcript.window(3).count(), 1);
    }

    #[test]
    fn test_formatted_window() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("what is RSI?"));
        transcript.push(Message::assistant("RSI is a momentum oscillator."));

        let formatted = transcript.formatted_window(3);
        assert!(formatted.starts_with("user: what is RSI?"));
        assert!(formatted.contains("assistant: RSI is a momentum oscillator."));
    }
}
