//! Actions produced by a decision policy

use mailguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Next step chosen by the decision policy
///
/// Decoded from the policy's raw JSON output. Unknown `type` values,
/// unknown tool names and missing required fields are rejected at parse
/// time, so the loop only ever sees well-formed actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Invoke a tool on the current draft
    Tool {
        /// Tool to run
        name: ToolName,

        /// Tool arguments
        #[serde(default = "empty_input")]
        input: Value,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_summary: Option<String>,
    },

    /// Replace the draft and start a new iteration
    Rewrite {
        /// Complete rewritten email
        email: String,

        /// Short preview; derived from `email` when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_summary: Option<String>,
    },

    /// Finish the run with this email
    Final {
        answer: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought_summary: Option<String>,
    },
}

/// Tools the loop can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CheckCompliance,
    GetPolicy,
    RedactPii,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckCompliance => "check_compliance",
            Self::GetPolicy => "get_policy",
            Self::RedactPii => "redact_pii",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    /// Parse a raw policy response
    ///
    /// Surrounding whitespace and a Markdown code fence are tolerated.
    pub fn parse(raw: &str) -> Result<Self> {
        let json = strip_code_fence(raw);
        if json.is_empty() {
            return Err(Error::action_parse("empty response"));
        }

        let mut action: Action =
            serde_json::from_str(json).map_err(|e| Error::action_parse(e.to_string()))?;

        if let Action::Tool { input, .. } = &mut action {
            if input.is_null() {
                *input = empty_input();
            }
        }

        Ok(action)
    }

    /// Encode as the JSON a policy would return
    pub fn to_raw(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the action type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool",
            Self::Rewrite { .. } => "rewrite",
            Self::Final { .. } => "final",
        }
    }

    /// One-line explanation attached by the policy, if any
    pub fn thought(&self) -> Option<&str> {
        let thought = match self {
            Self::Tool {
                thought_summary, ..
            }
            | Self::Rewrite {
                thought_summary, ..
            }
            | Self::Final {
                thought_summary, ..
            } => thought_summary.as_deref(),
        };
        thought.map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn tool(name: ToolName, input: Value, thought: impl Into<String>) -> Self {
        Self::Tool {
            name,
            input,
            thought_summary: Some(thought.into()),
        }
    }

    pub fn rewrite(email: impl Into<String>, thought: impl Into<String>) -> Self {
        Self::Rewrite {
            email: email.into(),
            preview: None,
            thought_summary: Some(thought.into()),
        }
    }

    pub fn finish(answer: impl Into<String>, thought: impl Into<String>) -> Self {
        Self::Final {
            answer: answer.into(),
            thought_summary: Some(thought.into()),
        }
    }
}

fn empty_input() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Remove a leading ```` ```json ```` fence and its closing fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => "",
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
