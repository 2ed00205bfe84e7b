//! Pipeline orchestrator and merge semantics
//!
//! Owns the graph edges — Router → {Planner → Fetcher → Summarizer} or
//! {Fallback-Responder} — and the merge rule for every step envelope:
//! messages are concatenated onto the transcript in execution order, exactly
//! once, and the envelope delta is applied through a single merge function.

use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{compute_state_hash, AuditLog, RecordedStep, RunRecord};
use crate::models::{SessionState, StateDelta, StepOutcome};
use crate::router::{route, RouteDecision};
use crate::steps::{FallbackResponder, Fetcher, Planner, Step, Summarizer};
use crate::transcript::{Message, Transcript};
use crate::Result;

/// Outcome of one pipeline run handed back to the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// What the user should see: the final answer on the lookup branch, the
    /// conversational reply on the fallback branch.
    pub reply: String,
    pub state: SessionState,
}

/// Apply a step's proposed delta to the session state. The only place
/// session state is mutated.
fn apply_delta(state: &mut SessionState, delta: &StateDelta) {
    if let Some(subject) = &delta.subject {
        if state.subject.is_empty() {
            state.subject = subject.clone();
        } else {
            warn!(existing = %state.subject, "Subject already set, ignoring");
        }
    }

    state
        .requested_tools
        .extend(delta.requested_tools.iter().cloned());

    for (tool, payload) in &delta.raw_results {
        state.raw_results.insert(tool.clone(), payload.clone());
    }

    if let Some(status) = delta.status {
        state.advance_status(status);
    }

    if let Some(answer) = &delta.final_answer {
        if state.final_answer.is_empty() {
            state.final_answer = answer.clone();
        } else {
            warn!("Final answer already set, ignoring");
        }
    }
}

/// Main orchestrator that coordinates one run through the step graph
pub struct Orchestrator {
    planner: Planner,
    fetcher: Fetcher,
    summarizer: Summarizer,
    responder: FallbackResponder,
    audit_log: AuditLog,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        fetcher: Fetcher,
        summarizer: Summarizer,
        responder: FallbackResponder,
        audit_log: AuditLog,
    ) -> Self {
        Self {
            planner,
            fetcher,
            summarizer,
            responder,
            audit_log,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Merge one envelope: append its messages to the transcript exactly
    /// once, then apply its delta.
    fn merge(state: &mut SessionState, transcript: &mut Transcript, outcome: &StepOutcome) {
        for message in &outcome.messages {
            transcript.push(message.clone());
        }
        apply_delta(state, &outcome.delta);
    }

    /// Execute one step, chain its task id to the previous one, merge the
    /// envelope, and keep it for the run record.
    async fn execute(
        &self,
        step: &dyn Step,
        state: &mut SessionState,
        transcript: &mut Transcript,
        last_task_id: &mut Option<Uuid>,
        recorded: &mut Vec<RecordedStep>,
    ) -> Result<()> {
        let mut outcome = step.run(state, transcript).await?;
        outcome.metadata.parent_task_id = *last_task_id;
        *last_task_id = Some(outcome.metadata.task_id);

        Self::merge(state, transcript, &outcome);

        recorded.push(RecordedStep {
            step: step.name().to_string(),
            outcome,
        });

        Ok(())
    }

    /// Run the pipeline for one user input. The transcript is shared across
    /// runs of an interactive session; session state is fresh per run.
    pub async fn run(&self, user_input: &str, transcript: &mut Transcript) -> Result<RunReport> {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4();

        transcript.push(Message::user(user_input));

        let mut state = SessionState::new();
        let mut recorded = Vec::new();
        let mut last_task_id = None;

        match route(transcript) {
            RouteDecision::Lookup { subject } => {
                info!(run_id = ?run_id, subject = %subject, "Lookup branch selected");

                // The routing decision flows through the same merge boundary
                apply_delta(
                    &mut state,
                    &StateDelta {
                        subject: Some(subject),
                        ..Default::default()
                    },
                );

                let chain: [&dyn Step; 3] = [&self.planner, &self.fetcher, &self.summarizer];
                for step in chain {
                    self.execute(step, &mut state, transcript, &mut last_task_id, &mut recorded)
                        .await?;
                }
            }
            RouteDecision::Fallback => {
                info!(run_id = ?run_id, "Fallback branch selected");

                self.execute(
                    &self.responder,
                    &mut state,
                    transcript,
                    &mut last_task_id,
                    &mut recorded,
                )
                .await?;
            }
        }

        let reply = if state.final_answer.is_empty() {
            recorded
                .last()
                .and_then(|r| r.outcome.messages.last())
                .map(|m| m.text.clone())
                .unwrap_or_default()
        } else {
            state.final_answer.clone()
        };

        let record = RunRecord {
            run_id,
            user_input: user_input.to_string(),
            steps: recorded,
            state_hash: compute_state_hash(&state),
            final_state: state.clone(),
            created_at: Utc::now(),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };
        self.audit_log.record(record).await?;

        info!(
            run_id = ?run_id,
            status = %state.status,
            "Run complete"
        );

        Ok(RunReport {
            run_id,
            reply,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::llm::{FailingLlm, LanguageModel, MockLlm};
    use crate::models::{PipelineStatus, StepStatus};
    use crate::retry::RetryPolicy;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "static payload"
        }

        async fn fetch(&self, subject: &str) -> Result<Value> {
            Ok(json!({ "symbol": subject, "source": self.name }))
        }
    }

    struct FlakyTool {
        name: &'static str,
        fail_times: u32,
        calls: AtomicU32,
    }

    impl FlakyTool {
        fn new(name: &'static str, fail_times: u32) -> Self {
            Self {
                name,
                fail_times,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "flaky provider"
        }

        async fn fetch(&self, subject: &str) -> Result<Value> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_times {
                return Err(PipelineError::ToolFailed {
                    tool: self.name.to_string(),
                    cause: "connection reset".to_string(),
                });
            }
            Ok(json!({ "symbol": subject, "attempts": attempt }))
        }
    }

    fn build_orchestrator(
        llm: Arc<dyn LanguageModel>,
        registry: ToolRegistry,
    ) -> Orchestrator {
        let retry = RetryPolicy::new(3, Duration::from_millis(5));
        let llm_retry = RetryPolicy::no_retry();

        Orchestrator::new(
            Planner::new(llm.clone(), llm_retry),
            Fetcher::new(Arc::new(registry), retry, false),
            Summarizer::new(llm.clone(), llm_retry),
            FallbackResponder::new(llm, llm_retry),
            AuditLog::new(),
        )
    }

    fn full_registry(alpha_failures: u32) -> (ToolRegistry, Arc<FlakyTool>) {
        let alpha = Arc::new(FlakyTool::new("Alpha Vantage", alpha_failures));
        let mut registry = ToolRegistry::new();
        registry.register(alpha.clone());
        registry.register(Arc::new(StaticTool {
            name: "Yahoo Finance",
        }));
        (registry, alpha)
    }

    #[tokio::test]
    async fn test_full_lookup_run_with_transient_failures() {
        let llm = Arc::new(MockLlm::with_replies(vec![
            "Alpha Vantage, Yahoo Finance",
            "ABCD gained 3% over the last month.",
        ]));
        let (registry, alpha) = full_registry(2);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        let report = orchestrator
            .run("lookup stock: ABCD", &mut transcript)
            .await
            .unwrap();

        assert_eq!(report.state.subject, "ABCD");
        assert_eq!(report.state.status, PipelineStatus::Success);
        assert_eq!(report.reply, "ABCD gained 3% over the last month.");
        assert!(report.state.raw_results.contains_key("Alpha Vantage"));
        assert!(report.state.raw_results.contains_key("Yahoo Finance"));
        assert_eq!(alpha.calls.load(Ordering::SeqCst), 3);

        // One user entry plus exactly one assistant entry per executed step
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.assistant_count(), 3);
    }

    #[tokio::test]
    async fn test_status_ordering_is_monotonic_across_steps() {
        let llm = Arc::new(MockLlm::with_replies(vec![
            "Yahoo Finance",
            "Quiet month for ABCD.",
        ]));
        let (registry, _) = full_registry(0);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        let report = orchestrator
            .run("lookup stock: ABCD", &mut transcript)
            .await
            .unwrap();

        let record = orchestrator
            .audit()
            .get(report.run_id)
            .await
            .unwrap()
            .unwrap();

        let statuses: Vec<_> = record
            .steps
            .iter()
            .filter_map(|s| s.outcome.delta.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                PipelineStatus::Planned,
                PipelineStatus::Fetched,
                PipelineStatus::Success
            ]
        );

        // Task ids chain parent-to-child through the run
        let metas: Vec<_> = record.steps.iter().map(|s| &s.outcome.metadata).collect();
        assert!(metas[0].parent_task_id.is_none());
        assert_eq!(metas[1].parent_task_id, Some(metas[0].task_id));
        assert_eq!(metas[2].parent_task_id, Some(metas[1].task_id));
    }

    #[tokio::test]
    async fn test_fallback_run_touches_nothing() {
        let llm = Arc::new(MockLlm::with_replies(vec!["Hi! What can I do for you?"]));
        let (registry, _) = full_registry(0);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        let report = orchestrator
            .run("hello there", &mut transcript)
            .await
            .unwrap();

        assert_eq!(report.reply, "Hi! What can I do for you?");
        assert!(report.state.subject.is_empty());
        assert_eq!(report.state.status, PipelineStatus::Idle);
        assert!(report.state.raw_results.is_empty());

        // Exactly one assistant entry appended
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.assistant_count(), 1);
    }

    #[tokio::test]
    async fn test_total_fetch_failure_still_summarizes() {
        let llm = Arc::new(MockLlm::with_replies(vec![
            "Alpha Vantage",
            "No market data could be retrieved for ABCD.",
        ]));
        let (registry, _) = full_registry(u32::MAX);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        let report = orchestrator
            .run("lookup stock: ABCD", &mut transcript)
            .await
            .unwrap();

        assert!(!report.state.final_answer.is_empty());
        assert_eq!(report.state.status, PipelineStatus::PartialFailure);

        let record = orchestrator
            .audit()
            .get(report.run_id)
            .await
            .unwrap()
            .unwrap();
        let fetch = record.steps.iter().find(|s| s.step == "fetcher").unwrap();
        assert_eq!(fetch.outcome.status, StepStatus::PartialFailure);
        // The session-level tag advanced to fetched before the terminal tag
        assert_eq!(
            fetch.outcome.delta.status,
            Some(PipelineStatus::Fetched)
        );
    }

    #[tokio::test]
    async fn test_planner_llm_failure_aborts_run() {
        let (registry, _) = full_registry(0);
        let orchestrator = build_orchestrator(Arc::new(FailingLlm), registry);

        let mut transcript = Transcript::new();
        let result = orchestrator.run("lookup stock: ABCD", &mut transcript).await;

        assert!(matches!(result, Err(PipelineError::Planning(_))));
        // Nothing was recorded for the aborted run
        assert!(orchestrator.audit().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcript_persists_across_runs() {
        let llm = Arc::new(MockLlm::with_replies(vec![
            "Good to meet you.",
            "Yahoo Finance",
            "ABCD held steady.",
        ]));
        let (registry, _) = full_registry(0);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        orchestrator.run("hello there", &mut transcript).await.unwrap();
        orchestrator
            .run("lookup stock: ABCD", &mut transcript)
            .await
            .unwrap();

        // 2 user entries, 1 + 3 assistant entries
        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript.assistant_count(), 4);
    }

    #[tokio::test]
    async fn test_audit_record_verifies() {
        let llm = Arc::new(MockLlm::with_replies(vec!["Yahoo Finance", "Flat week."]));
        let (registry, _) = full_registry(0);
        let orchestrator = build_orchestrator(llm, registry);

        let mut transcript = Transcript::new();
        let report = orchestrator
            .run("lookup stock: WXYZ", &mut transcript)
            .await
            .unwrap();

        assert!(orchestrator
            .audit()
            .verify_integrity(report.run_id)
            .await
            .unwrap());
    }

    #[test]
    fn test_apply_delta_is_set_once_for_subject_and_answer() {
        let mut state = SessionState::new();

        apply_delta(
            &mut state,
            &StateDelta {
                subject: Some("ABCD".to_string()),
                final_answer: Some("first".to_string()),
                ..Default::default()
            },
        );
        apply_delta(
            &mut state,
            &StateDelta {
                subject: Some("WXYZ".to_string()),
                final_answer: Some("second".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(state.subject, "ABCD");
        assert_eq!(state.final_answer, "first");
    }

    #[test]
    fn test_apply_delta_results_last_write_wins() {
        let mut state = SessionState::new();

        let mut first = StateDelta::default();
        first
            .raw_results
            .insert("Alpha Vantage".to_string(), json!({ "close": 1 }));
        apply_delta(&mut state, &first);

        let mut second = StateDelta::default();
        second
            .raw_results
            .insert("Alpha Vantage".to_string(), json!({ "close": 2 }));
        apply_delta(&mut state, &second);

        assert_eq!(state.raw_results["Alpha Vantage"], json!({ "close": 2 }));
    }
}
