//! Conditional routing decision
//!
//! Pure routing over the most recent transcript entry: no retry, no external
//! call. A missing subject token is a designed default (general
//! conversation), not an error.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::transcript::{Role, Transcript};

/// Case-insensitive command prefix that triggers the lookup branch.
pub const LOOKUP_PREFIX: &str = "lookup stock:";

lazy_static! {
    /// Subject token: uppercase alphanumeric code, 1-5 characters,
    /// starting with a letter.
    static ref SUBJECT_RE: Regex = Regex::new(r"\b[A-Z][A-Z0-9]{0,4}\b").unwrap();
}

/// Branch outcome of the routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Lookup { subject: String },
    Fallback,
}

/// Decide the branch for the most recent transcript entry.
pub fn route(transcript: &Transcript) -> RouteDecision {
    let Some(last) = transcript.last() else {
        return RouteDecision::Fallback;
    };

    if last.role != Role::User {
        return RouteDecision::Fallback;
    }

    if let Some(subject) = extract_subject(&last.text) {
        debug!(subject = %subject, "Lookup intent detected");
        return RouteDecision::Lookup { subject };
    }

    RouteDecision::Fallback
}

/// Extract the subject token from a lookup command, if both the prefix and
/// a token are present.
fn extract_subject(text: &str) -> Option<String> {
    let prefix = text.get(..LOOKUP_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(LOOKUP_PREFIX) {
        return None;
    }

    let remainder = &text[LOOKUP_PREFIX.len()..];
    SUBJECT_RE
        .find(remainder)
        .map(|m| m.as_str().to_string())
}
