//! Core data models for the market-lookup pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::transcript::Message;

//
// ================= Pipeline Status =================
//

/// Progress marker for one pipeline run. Transitions are strictly forward:
/// `Idle → Planned → Fetched → {PartialFailure | Success}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Planned,
    Fetched,
    PartialFailure,
    Success,
}

impl PipelineStatus {
    fn rank(self) -> u8 {
        match self {
            PipelineStatus::Idle => 0,
            PipelineStatus::Planned => 1,
            PipelineStatus::Fetched => 2,
            PipelineStatus::PartialFailure | PipelineStatus::Success => 3,
        }
    }

    /// Whether the run has reached a completion tag.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStatus::PartialFailure | PipelineStatus::Success
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Planned => "planned",
            PipelineStatus::Fetched => "fetched",
            PipelineStatus::PartialFailure => "partial_failure",
            PipelineStatus::Success => "success",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Session State =================
//

/// The single mutable record describing one pipeline run: the subject of the
/// request, the tools chosen to satisfy it, the raw results collected from
/// them, a progress tag, and the final derived answer.
///
/// Owned exclusively by the orchestrator; steps receive a shared reference
/// and propose changes through a [`StateDelta`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub subject: String,
    pub requested_tools: Vec<String>,
    pub raw_results: HashMap<String, serde_json::Value>,
    pub status: PipelineStatus,
    pub final_answer: String,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            subject: String::new(),
            requested_tools: Vec::new(),
            raw_results: HashMap::new(),
            status: PipelineStatus::Idle,
            final_answer: String::new(),
        }
    }

    /// Advance the status marker. Backward transitions are rejected.
    pub fn advance_status(&mut self, next: PipelineStatus) {
        if next.rank() < self.status.rank() {
            warn!(
                current = %self.status,
                attempted = %next,
                "Rejected backward status transition"
            );
            return;
        }
        self.status = next;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= State Delta =================
//

/// The additive state update a step proposes. Applied by the orchestrator's
/// merge function, the single mutation boundary for session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    /// Set-once; ignored when the session already carries a subject.
    pub subject: Option<String>,
    /// Appended to `requested_tools`, never replacing.
    pub requested_tools: Vec<String>,
    /// Inserted into `raw_results`; last write wins per key.
    pub raw_results: HashMap<String, serde_json::Value>,
    /// Forward status advance, if any.
    pub status: Option<PipelineStatus>,
    /// Set-once; ignored when the session already carries an answer.
    pub final_answer: Option<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.requested_tools.is_empty()
            && self.raw_results.is_empty()
            && self.status.is_none()
            && self.final_answer.is_none()
    }
}

//
// ================= Step Result Envelope =================
//

/// Whole-step outcome tag. The Fetcher reports `Success` as soon as at least
/// one tool succeeded and `PartialFailure` only when none did; per-tool
/// success is tracked separately in `raw_results`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    PartialFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetadata {
    pub task_id: Uuid,
    pub parent_task_id: Option<Uuid>,
}

impl StepMetadata {
    pub fn new() -> Self {
        Self {
            task_id: Uuid::new_v4(),
            parent_task_id: None,
        }
    }
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// The envelope every step returns. Messages are appended to the transcript
/// by the orchestrator exactly once; the delta is the authoritative state
/// update. Steps never mutate session state or the transcript directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub messages: Vec<Message>,
    pub delta: StateDelta,
    pub metadata: StepMetadata,
}

impl StepOutcome {
    pub fn new(status: StepStatus, delta: StateDelta) -> Self {
        Self {
            status,
            messages: Vec::new(),
            delta,
            metadata: StepMetadata::new(),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}
