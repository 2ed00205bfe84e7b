//! Market Lookup Agent
//!
//! A small orchestration engine that routes user requests through a pipeline
//! of specialized steps sharing one session state and one append-only
//! transcript:
//! - Conversational inputs get a direct language-model reply
//! - Lookup commands are planned against a closed set of market-data
//!   providers, fetched with bounded retry and partial-failure isolation,
//!   and folded into a statistics-oriented summary
//!
//! PIPELINE:
//! INPUT → ROUTE → {PLAN → FETCH → SUMMARIZE} | {RESPOND} → COMPLETE

pub mod audit;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod router;
pub mod steps;
pub mod tools;
pub mod transcript;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use router::{route, RouteDecision};
pub use transcript::{Message, Role, Transcript};
