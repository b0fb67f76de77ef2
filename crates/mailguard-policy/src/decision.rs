//! Decision policies choose the next action of the review loop

use async_trait::async_trait;
use mailguard_core::{ComplianceResult, Error, PolicyDocument, RedactionOutcome, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::action::Action;

/// What the loop has done so far, oldest first
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    /// An action the policy chose
    Decision { iteration: u32, action: Action },

    /// Result of `check_compliance`
    Compliance {
        iteration: u32,
        result: ComplianceResult,
    },

    /// Result of `get_policy`
    Policy {
        iteration: u32,
        document: PolicyDocument,
    },

    /// Result of `redact_pii`
    Redaction {
        iteration: u32,
        outcome: RedactionOutcome,
    },
}

impl TranscriptEntry {
    pub fn iteration(&self) -> u32 {
        match self {
            Self::Decision { iteration, .. }
            | Self::Compliance { iteration, .. }
            | Self::Policy { iteration, .. }
            | Self::Redaction { iteration, .. } => *iteration,
        }
    }

    /// Check if this entry changed the draft
    pub fn changes_draft(&self) -> bool {
        matches!(
            self,
            Self::Redaction { .. }
                | Self::Decision {
                    action: Action::Rewrite { .. },
                    ..
                }
        )
    }
}

/// Everything a policy sees when asked for the next action
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Task description given with the submission
    pub goal: &'a str,

    /// Current draft
    pub draft: &'a str,

    /// Current iteration, starting at 1
    pub iteration: u32,

    pub max_iterations: u32,

    pub transcript: &'a [TranscriptEntry],
}

impl<'a> DecisionContext<'a> {
    /// Latest compliance result, if the draft has not changed since
    pub fn fresh_check(&self) -> Option<&'a ComplianceResult> {
        for entry in self.transcript.iter().rev() {
            match entry {
                TranscriptEntry::Compliance { result, .. } => return Some(result),
                e if e.changes_draft() => return None,
                _ => {}
            }
        }
        None
    }

    /// Latest compliance result of the current iteration, fresh or not
    pub fn latest_check(&self) -> Option<&'a ComplianceResult> {
        self.transcript.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::Compliance { iteration, result } if *iteration == self.iteration => {
                Some(result)
            }
            _ => None,
        })
    }

    /// Number of rewrites so far
    pub fn rewrites(&self) -> usize {
        self.transcript
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    TranscriptEntry::Decision {
                        action: Action::Rewrite { .. },
                        ..
                    }
                )
            })
            .count()
    }

    /// Check if the policy for `category` was loaded during this run
    pub fn policy_loaded(&self, category: &str) -> bool {
        self.transcript.iter().any(|e| {
            matches!(e, TranscriptEntry::Policy { document, .. } if document.category == category)
        })
    }

    /// Check if the draft was redacted during the current iteration
    pub fn redacted_this_iteration(&self) -> bool {
        self.transcript.iter().any(|e| {
            matches!(e, TranscriptEntry::Redaction { .. }) && e.iteration() == self.iteration
        })
    }
}

/// Chooses the next action
///
/// Returns the raw response; the loop parses and validates it. Errors mean
/// the policy itself failed (transport, exhausted script, ...).
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<String>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Replays a fixed list of responses
///
/// Useful for tests and demos. Running out of script is an error.
#[derive(Debug)]
pub struct ScriptedPolicy {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedPolicy {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// Build a script from typed actions
    pub fn from_actions(actions: &[Action]) -> Result<Self> {
        let raw = actions
            .iter()
            .map(Action::to_raw)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(raw))
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DecisionPolicy for ScriptedPolicy {
    async fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<String> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| Error::decision("script lock poisoned"))?;
        responses
            .pop_front()
            .ok_or_else(|| Error::decision("script exhausted"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailguard_core::{Category, Issue, Severity};

    fn ctx(transcript: &[TranscriptEntry]) -> DecisionContext<'_> {
        DecisionContext {
            goal: "review",
            draft: "draft",
            iteration: 1,
            max_iterations: 5,
            transcript,
        }
    }

    #[tokio::test]
    async fn test_scripted_policy_replays_then_fails() {
        let policy = ScriptedPolicy::new(["first", "second"]);
        let empty: Vec<TranscriptEntry> = Vec::new();

        assert_eq!(policy.decide(&ctx(&empty)).await.unwrap(), "first");
        assert_eq!(policy.remaining(), 1);
        assert_eq!(policy.decide(&ctx(&empty)).await.unwrap(), "second");

        let err = policy.decide(&ctx(&empty)).await.unwrap_err();
        assert_eq!(err.kind(), "decision_policy");
    }

    #[test]
    fn test_fresh_check_invalidated_by_rewrite() {
        let failing = ComplianceResult::from_issues(vec![Issue::new(
            Category::Pii,
            Severity::Critical,
            "SSN",
            "d",
        )]);
        let mut transcript = vec![TranscriptEntry::Compliance {
            iteration: 1,
            result: failing.clone(),
        }];
        assert_eq!(ctx(&transcript).fresh_check(), Some(&failing));

        transcript.push(TranscriptEntry::Decision {
            iteration: 1,
            action: Action::rewrite("new", "fix"),
        });
        assert_eq!(ctx(&transcript).fresh_check(), None);
        assert_eq!(ctx(&transcript).rewrites(), 1);
    }

    #[test]
    fn test_latest_check_survives_redaction() {
        let failing = ComplianceResult::from_issues(vec![Issue::new(
            Category::Pii,
            Severity::Critical,
            "SSN",
            "d",
        )]);
        let transcript = vec![
            TranscriptEntry::Compliance {
                iteration: 1,
                result: failing.clone(),
            },
            TranscriptEntry::Redaction {
                iteration: 1,
                outcome: mailguard_core::RedactionOutcome {
                    original: "a".to_string(),
                    redacted: "b".to_string(),
                    redactions: Vec::new(),
                },
            },
        ];
        assert_eq!(ctx(&transcript).fresh_check(), None);
        assert_eq!(ctx(&transcript).latest_check(), Some(&failing));

        let next_iteration = DecisionContext {
            iteration: 2,
            ..ctx(&transcript)
        };
        assert_eq!(next_iteration.latest_check(), None);
    }

    #[test]
    fn test_policy_loaded() {
        let transcript = vec![TranscriptEntry::Policy {
            iteration: 1,
            document: PolicyDocument::from_markdown("legal", "# Legal"),
        }];
        assert!(ctx(&transcript).policy_loaded("legal"));
        assert!(!ctx(&transcript).policy_loaded("pii"));
    }
}
