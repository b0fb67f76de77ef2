//! Typed events describing the progress of a review run
//!
//! Every event is serialized as a JSON object whose `type` field carries the
//! variant name; the same name is used as the SSE `event:` field.

use serde::{Deserialize, Serialize};

use crate::stream::SseRecord;
use crate::types::{Category, Issue, Redaction, Verdict};
use crate::{Error, Result};

/// One observable transition of the review loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Run accepted
    Start { goal: String },

    /// A new iteration begins
    IterationStart { iteration: u32 },

    /// The decision policy explained its choice
    Thinking { thought: String, iteration: u32 },

    /// The decision policy asked for a tool
    ToolSelected {
        tool_name: String,
        tool_input: serde_json::Value,
        iteration: u32,
    },

    /// The executor started running the selected tool
    ToolExecuting { iteration: u32, tool_name: String },

    /// The tool returned; `summary` is a short description of its output
    ToolResult {
        iteration: u32,
        tool_name: String,
        summary: String,
    },

    ComplianceCheckStarted { iteration: u32 },

    IssuesFound { iteration: u32, total_count: usize },

    /// One issue of the current check, streamed individually
    Issue {
        iteration: u32,
        issue: Issue,
        index: usize,
        total: usize,
    },

    ComplianceResult {
        iteration: u32,
        pass: bool,
        issues_count: usize,
        summary: String,
    },

    /// Remediation hints for the categories that failed
    Feedback {
        iteration: u32,
        categories: Vec<Category>,
        text: String,
    },

    PolicyLoaded {
        iteration: u32,
        category: String,
        title: String,
        preview: String,
    },

    RedactionStarted { iteration: u32 },

    RedactionItem {
        iteration: u32,
        item: Redaction,
        index: usize,
        total: usize,
    },

    RedactionComplete {
        iteration: u32,
        count: usize,
        redacted_text: String,
    },

    RewriteStart { iteration: u32 },

    Rewriting { iteration: u32 },

    RewriteComplete {
        iteration: u32,
        full_text: String,
        preview: String,
    },

    /// The iteration cap stopped the run before it finalized
    IterationLimitReached { iteration: u32, max_iterations: u32 },

    Finalizing { iteration: u32 },

    FinalCheck {
        iteration: u32,
        pass: bool,
        issues_count: usize,
    },

    /// Terminal outcome with the final draft
    Complete {
        final_email: String,
        iteration: u32,
        verdict: Verdict,
        passed: bool,
    },

    /// Terminal failure
    Error { message: String },

    /// End of stream marker, always last
    Done,
}

impl StreamEvent {
    /// Event name, identical to the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::IterationStart { .. } => "iteration_start",
            Self::Thinking { .. } => "thinking",
            Self::ToolSelected { .. } => "tool_selected",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::ToolResult { .. } => "tool_result",
            Self::ComplianceCheckStarted { .. } => "compliance_check_started",
            Self::IssuesFound { .. } => "issues_found",
            Self::Issue { .. } => "issue",
            Self::ComplianceResult { .. } => "compliance_result",
            Self::Feedback { .. } => "feedback",
            Self::PolicyLoaded { .. } => "policy_loaded",
            Self::RedactionStarted { .. } => "redaction_started",
            Self::RedactionItem { .. } => "redaction_item",
            Self::RedactionComplete { .. } => "redaction_complete",
            Self::RewriteStart { .. } => "rewrite_start",
            Self::Rewriting { .. } => "rewriting",
            Self::RewriteComplete { .. } => "rewrite_complete",
            Self::IterationLimitReached { .. } => "iteration_limit_reached",
            Self::Finalizing { .. } => "finalizing",
            Self::FinalCheck { .. } => "final_check",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Check if this is the end-of-stream marker
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this event reports how the run ended
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Encode as an SSE record
    pub fn to_record(&self) -> Result<SseRecord> {
        Ok(SseRecord::new(Some(self.name()), serde_json::to_string(self)?))
    }

    /// Decode from an SSE record
    ///
    /// The JSON payload is authoritative; a mismatching `event:` field is
    /// rejected.
    pub fn from_record(record: &SseRecord) -> Result<Self> {
        let event: StreamEvent = serde_json::from_str(&record.data)?;
        if let Some(name) = record.event.as_deref() {
            if name != event.name() {
                return Err(Error::stream(format!(
                    "event field '{}' does not match payload type '{}'",
                    name,
                    event.name()
                )));
            }
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[test]
    fn test_tag_matches_name() {
        let events = vec![
            StreamEvent::Start {
                goal: "g".to_string(),
            },
            StreamEvent::IssuesFound {
                iteration: 1,
                total_count: 2,
            },
            StreamEvent::ToolExecuting {
                iteration: 1,
                tool_name: "redact_pii".to_string(),
            },
            StreamEvent::ToolResult {
                iteration: 1,
                tool_name: "redact_pii".to_string(),
                summary: "Redacted 1 item(s)".to_string(),
            },
            StreamEvent::Issue {
                iteration: 1,
                issue: Issue::new(Category::Pii, Severity::Critical, "SSN", "d"),
                index: 0,
                total: 1,
            },
            StreamEvent::Complete {
                final_email: "x".to_string(),
                iteration: 1,
                verdict: Verdict::NeedsReview,
                passed: false,
            },
            StreamEvent::Done,
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn test_record_roundtrip_keeps_payload() {
        let event = StreamEvent::RewriteComplete {
            iteration: 2,
            full_text: "line one\nline two".to_string(),
            preview: "line one".to_string(),
        };
        let record = event.to_record().unwrap();
        assert_eq!(record.event.as_deref(), Some("rewrite_complete"));
        assert_eq!(StreamEvent::from_record(&record).unwrap(), event);
    }

    #[test]
    fn test_mismatched_event_field_rejected() {
        let record = SseRecord::new(Some("start"), r#"{"type":"done"}"#);
        assert!(StreamEvent::from_record(&record).is_err());
    }

    #[test]
    fn test_missing_event_field_accepted() {
        let record = SseRecord::new(None::<&str>, r#"{"type":"rewriting","iteration":3}"#);
        assert_eq!(
            StreamEvent::from_record(&record).unwrap(),
            StreamEvent::Rewriting { iteration: 3 }
        );
    }
}
