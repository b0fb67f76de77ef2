//! The review loop
//!
//! Alternates between asking the decision policy for an action and applying
//! it, publishing every transition to an [`EventSink`]. The loop is
//! sequential; it only suspends while the policy decides or while the sink
//! waits for the consumer.

use mailguard_core::types::{preview, PREVIEW_CHARS};
use mailguard_core::{
    Category, ComplianceResult, Error, EventSink, IterationRecord, IterationStatus, Result,
    StreamEvent, Verdict,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ToolName};
use crate::decision::{DecisionContext, DecisionPolicy, TranscriptEntry};
use crate::executor::{ToolExecutor, ToolOutput};
use crate::history::{IterationHistory, StepRecord};

/// Goal used when a submission does not state one
pub const DEFAULT_GOAL: &str =
    "Review this email for compliance issues and rewrite it to be compliant.";

/// Loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rewrites allowed before the run stops with `needs_review`
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Policy calls allowed before the run stops with `needs_review`
    #[serde(default = "default_max_decisions")]
    pub max_decisions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_decisions: default_max_decisions(),
        }
    }
}

impl EngineConfig {
    /// Reject limits that would stop a run before its first decision
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 1 {
            return Err(Error::config("engine.max_iterations must be at least 1"));
        }
        if self.max_decisions < 1 {
            return Err(Error::config("engine.max_decisions must be at least 1"));
        }
        Ok(())
    }
}

fn default_max_iterations() -> u32 {
    5
}

fn default_max_decisions() -> u32 {
    25
}

/// A draft submitted for review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub email: String,
    pub goal: String,
}

impl ReviewRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            goal: DEFAULT_GOAL.to_string(),
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub final_email: String,
    pub verdict: Verdict,
    /// Whether the final draft passes the detector
    pub passed: bool,
    /// Last iteration that ran
    pub iterations: u32,
    pub history: Vec<IterationRecord>,
    pub steps: Vec<StepRecord>,
}

/// A run that ended with an error
///
/// `final_email` is the draft as it was before the failing step.
#[derive(Debug, thiserror::Error)]
#[error("review run failed: {error}")]
pub struct RunFailure {
    #[source]
    pub error: Error,
    pub final_email: String,
    pub steps: Vec<StepRecord>,
}

struct RunState {
    draft: String,
    iteration: u32,
    decisions: u32,
    /// Categories of the latest check; picks the policy for bare lookups
    outstanding: Vec<Category>,
    transcript: Vec<TranscriptEntry>,
    history: IterationHistory,
    steps: Vec<StepRecord>,
}

impl RunState {
    fn new(draft: &str) -> Self {
        Self {
            draft: draft.to_string(),
            iteration: 1,
            decisions: 0,
            outstanding: Vec::new(),
            transcript: Vec::new(),
            history: IterationHistory::new(),
            steps: Vec::new(),
        }
    }
}

/// Drives a decision policy against the tools
pub struct ReviewEngine {
    executor: ToolExecutor,
    policy: Arc<dyn DecisionPolicy>,
    config: EngineConfig,
}

impl ReviewEngine {
    pub fn new(executor: ToolExecutor, policy: Arc<dyn DecisionPolicy>, config: EngineConfig) -> Self {
        Self {
            executor,
            policy,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Review one draft, publishing progress to `sink`
    ///
    /// On success the last events are `complete` and `done`. On failure an
    /// `error` event and `done` are published, unless the sink itself is
    /// what failed.
    pub async fn run<S>(
        &self,
        request: &ReviewRequest,
        sink: &mut S,
    ) -> std::result::Result<RunReport, RunFailure>
    where
        S: EventSink + ?Sized,
    {
        let mut state = RunState::new(&request.email);
        info!(
            policy = self.policy.name(),
            max_iterations = self.config.max_iterations,
            "Starting review run"
        );

        let outcome = match self.drive(request, &mut state, sink).await {
            Ok(done) => sink.emit(StreamEvent::Done).await.map(|_| done),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((verdict, passed)) => {
                let iterations = state.iteration.min(self.config.max_iterations);
                info!(
                    verdict = verdict.as_str(),
                    passed,
                    iterations,
                    decisions = state.decisions,
                    "Review run complete"
                );
                Ok(RunReport {
                    final_email: state.draft,
                    verdict,
                    passed,
                    iterations,
                    history: state.history.records(),
                    steps: state.steps,
                })
            }
            Err(e) => {
                if e.is_transport() {
                    warn!(error = %e, iteration = state.iteration, "Event consumer went away, stopping run");
                } else {
                    error!(error = %e, kind = e.kind(), iteration = state.iteration, "Review run failed");
                    let reported = sink
                        .emit(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    if reported.is_ok() {
                        let _ = sink.emit(StreamEvent::Done).await;
                    }
                }
                Err(RunFailure {
                    error: e,
                    final_email: state.draft,
                    steps: state.steps,
                })
            }
        }
    }

    async fn drive<S>(
        &self,
        request: &ReviewRequest,
        state: &mut RunState,
        sink: &mut S,
    ) -> Result<(Verdict, bool)>
    where
        S: EventSink + ?Sized,
    {
        sink.emit(StreamEvent::Start {
            goal: request.goal.clone(),
        })
        .await?;
        self.begin_iteration(state, sink).await?;

        loop {
            if sink.is_closed() {
                return Err(Error::transport("event consumer disconnected"));
            }
            if state.decisions >= self.config.max_decisions {
                warn!(
                    decisions = state.decisions,
                    iteration = state.iteration,
                    "Decision budget exhausted"
                );
                return self.stop_for_review(state, sink).await;
            }

            let raw = {
                let ctx = DecisionContext {
                    goal: &request.goal,
                    draft: &state.draft,
                    iteration: state.iteration,
                    max_iterations: self.config.max_iterations,
                    transcript: &state.transcript,
                };
                self.policy.decide(&ctx).await?
            };
            state.decisions += 1;

            let action = Action::parse(&raw)?;
            debug!(action = action.kind(), iteration = state.iteration, "Policy chose action");

            state.steps.push(StepRecord {
                iteration: state.iteration,
                action_type: action.kind().to_string(),
                tool_name: match &action {
                    Action::Tool { name, .. } => Some(name.as_str().to_string()),
                    _ => None,
                },
                thought: action.thought().unwrap_or_default().to_string(),
            });
            state.transcript.push(TranscriptEntry::Decision {
                iteration: state.iteration,
                action: action.clone(),
            });

            if let Some(thought) = action.thought() {
                sink.emit(StreamEvent::Thinking {
                    thought: thought.to_string(),
                    iteration: state.iteration,
                })
                .await?;
            }

            match action {
                Action::Tool { name, input, .. } => {
                    self.run_tool(name, &input, state, sink).await?;
                }
                Action::Rewrite { email, preview, .. } => {
                    if let Some(done) = self.apply_rewrite(email, preview, state, sink).await? {
                        return Ok(done);
                    }
                }
                Action::Final { answer, .. } => {
                    return self.finalize(answer, state, sink).await;
                }
            }
        }
    }

    async fn begin_iteration<S>(&self, state: &mut RunState, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        state
            .history
            .record(state.iteration, IterationStatus::Starting, &state.draft);
        sink.emit(StreamEvent::IterationStart {
            iteration: state.iteration,
        })
        .await
    }

    async fn run_tool<S>(
        &self,
        tool: ToolName,
        input: &Value,
        state: &mut RunState,
        sink: &mut S,
    ) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        let iteration = state.iteration;
        sink.emit(StreamEvent::ToolSelected {
            tool_name: tool.as_str().to_string(),
            tool_input: input.clone(),
            iteration,
        })
        .await?;
        sink.emit(StreamEvent::ToolExecuting {
            iteration,
            tool_name: tool.as_str().to_string(),
        })
        .await?;

        match tool {
            ToolName::CheckCompliance => {
                sink.emit(StreamEvent::ComplianceCheckStarted { iteration }).await?
            }
            ToolName::RedactPii => sink.emit(StreamEvent::RedactionStarted { iteration }).await?,
            ToolName::GetPolicy => {}
        }

        let output = self
            .executor
            .execute(tool, input, &state.draft, &state.outstanding)?;

        let summary = match output {
            ToolOutput::Compliance(result) => {
                let status = if result.passed() {
                    IterationStatus::Pass
                } else {
                    IterationStatus::Issues
                };
                state.history.record(iteration, status, &state.draft);
                state.outstanding = result.categories();
                emit_compliance(&result, iteration, sink).await?;
                let summary = result.summary();
                state.transcript.push(TranscriptEntry::Compliance { iteration, result });
                summary
            }
            ToolOutput::Policy(document) => {
                sink.emit(StreamEvent::PolicyLoaded {
                    iteration,
                    category: document.category.clone(),
                    title: document.title.clone(),
                    preview: preview(&document.content, PREVIEW_CHARS),
                })
                .await?;
                let summary = document.title.clone();
                state.transcript.push(TranscriptEntry::Policy {
                    iteration,
                    document,
                });
                summary
            }
            ToolOutput::Redaction(outcome) => {
                state.draft = outcome.redacted.clone();
                let total = outcome.count();
                for (index, item) in outcome.redactions.iter().enumerate() {
                    sink.emit(StreamEvent::RedactionItem {
                        iteration,
                        item: item.clone(),
                        index,
                        total,
                    })
                    .await?;
                }
                sink.emit(StreamEvent::RedactionComplete {
                    iteration,
                    count: total,
                    redacted_text: outcome.redacted.clone(),
                })
                .await?;
                let summary = outcome.summary();
                state
                    .transcript
                    .push(TranscriptEntry::Redaction { iteration, outcome });
                summary
            }
        };

        sink.emit(StreamEvent::ToolResult {
            iteration,
            tool_name: tool.as_str().to_string(),
            summary,
        })
        .await
    }

    /// Returns the run outcome when the rewrite exhausted the iteration budget
    async fn apply_rewrite<S>(
        &self,
        email: String,
        proposed_preview: Option<String>,
        state: &mut RunState,
        sink: &mut S,
    ) -> Result<Option<(Verdict, bool)>>
    where
        S: EventSink + ?Sized,
    {
        let iteration = state.iteration;
        sink.emit(StreamEvent::RewriteStart { iteration }).await?;
        sink.emit(StreamEvent::Rewriting { iteration }).await?;

        let shown = proposed_preview
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| preview(&email, PREVIEW_CHARS));
        state.draft = email;
        state.outstanding.clear();
        state
            .history
            .record(iteration, IterationStatus::Rewrite, &state.draft);

        sink.emit(StreamEvent::RewriteComplete {
            iteration,
            full_text: state.draft.clone(),
            preview: shown,
        })
        .await?;

        state.iteration += 1;
        if state.iteration > self.config.max_iterations {
            warn!(
                max_iterations = self.config.max_iterations,
                "Iteration limit reached before the policy finalized"
            );
            sink.emit(StreamEvent::IterationLimitReached {
                iteration,
                max_iterations: self.config.max_iterations,
            })
            .await?;
            return self.stop_for_review(state, sink).await.map(Some);
        }

        self.begin_iteration(state, sink).await?;
        Ok(None)
    }

    async fn finalize<S>(
        &self,
        answer: String,
        state: &mut RunState,
        sink: &mut S,
    ) -> Result<(Verdict, bool)>
    where
        S: EventSink + ?Sized,
    {
        let iteration = state.iteration;
        sink.emit(StreamEvent::Finalizing { iteration }).await?;

        state.draft = answer;
        let result = self.executor.check(&state.draft);
        let passed = result.passed();
        let (verdict, status) = if passed {
            (Verdict::Pass, IterationStatus::Pass)
        } else {
            (Verdict::Fail, IterationStatus::Fail)
        };
        state.history.record(iteration, status, &state.draft);

        sink.emit(StreamEvent::FinalCheck {
            iteration,
            pass: passed,
            issues_count: result.issues().len(),
        })
        .await?;
        sink.emit(StreamEvent::Complete {
            final_email: state.draft.clone(),
            iteration,
            verdict,
            passed,
        })
        .await?;

        Ok((verdict, passed))
    }

    /// End the run without a final action
    async fn stop_for_review<S>(&self, state: &mut RunState, sink: &mut S) -> Result<(Verdict, bool)>
    where
        S: EventSink + ?Sized,
    {
        let iteration = state.iteration.min(self.config.max_iterations);
        let passed = self.executor.check(&state.draft).passed();

        sink.emit(StreamEvent::Complete {
            final_email: state.draft.clone(),
            iteration,
            verdict: Verdict::NeedsReview,
            passed,
        })
        .await?;

        Ok((Verdict::NeedsReview, passed))
    }
}

async fn emit_compliance<S>(result: &ComplianceResult, iteration: u32, sink: &mut S) -> Result<()>
where
    S: EventSink + ?Sized,
{
    let total = result.issues().len();
    if total > 0 {
        sink.emit(StreamEvent::IssuesFound {
            iteration,
            total_count: total,
        })
        .await?;
        for (index, issue) in result.issues().iter().enumerate() {
            sink.emit(StreamEvent::Issue {
                iteration,
                issue: issue.clone(),
                index,
                total,
            })
            .await?;
        }
    }

    sink.emit(StreamEvent::ComplianceResult {
        iteration,
        pass: result.passed(),
        issues_count: total,
        summary: result.summary(),
    })
    .await?;

    if !result.passed() {
        let categories = result.categories();
        sink.emit(StreamEvent::Feedback {
            iteration,
            text: feedback_text(&categories),
            categories,
        })
        .await?;
    }

    Ok(())
}

/// Remediation hints for failed categories
pub fn feedback_text(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|category| match category {
            Category::Pii => {
                "Remove or redact third-party personal data such as SSNs, card numbers, phone numbers and addresses."
            }
            Category::Marketing => {
                "Drop pressure tactics and urgency, and add clear unsubscribe instructions."
            }
            Category::Legal => {
                "Soften absolute claims and guarantees, and leave disputes to the legal team."
            }
            Category::Confidentiality => {
                "Remove internal-only markers and references to internal tools or projects."
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
