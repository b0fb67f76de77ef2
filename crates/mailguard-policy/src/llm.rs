//! Decision policy backed by an OpenAI-compatible chat completions endpoint

use async_trait::async_trait;
use mailguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::decision::{DecisionContext, DecisionPolicy, TranscriptEntry};

const SYSTEM_PROMPT: &str = r#"You review outbound emails for compliance before they leave the company.

Work in small steps:
1. Check the current draft with check_compliance.
2. Load the policy for each flagged category with get_policy.
3. Use redact_pii for personal data that is not the recipient's own.
4. Propose a complete rewritten email, then check it again.
5. Finish once the check passes.

Tools:
- check_compliance: checks the current draft. Input: {}
- get_policy: policy text for "pii", "marketing", "legal" or "confidentiality". Input: {"category": "<name>"}
- redact_pii: masks SSNs, card numbers, phone numbers, external addresses and passwords in the current draft. Input: {}

Reply with exactly one JSON object and nothing else:
{"type": "tool", "thought_summary": "<one sentence>", "name": "<tool>", "input": {...}}
{"type": "rewrite", "thought_summary": "<one sentence>", "email": "<complete rewritten email>"}
{"type": "final", "thought_summary": "<one sentence>", "answer": "<approved email>"}

When rewriting, keep the intent and the recipient's name, remove confidentiality
markers and internal references, soften guarantees, and add an unsubscribe line
to promotional emails."#;

/// Settings for [`LlmPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Asks a language model for the next action
pub struct LlmPolicy {
    config: LlmConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl LlmPolicy {
    /// Create a policy, reading the API key from the configured variable
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key: api_key.into(),
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

/// Build the conversation sent to the model
pub fn build_messages(ctx: &DecisionContext<'_>) -> Result<Vec<Message>> {
    let mut messages = vec![
        Message::new("system", SYSTEM_PROMPT),
        Message::new(
            "user",
            format!("[Iteration {}/{}]", ctx.iteration, ctx.max_iterations),
        ),
    ];

    for entry in ctx.transcript {
        let message = match entry {
            TranscriptEntry::Decision { action, .. } => {
                Message::new("assistant", action.to_raw()?)
            }
            TranscriptEntry::Compliance { result, .. } => Message::new(
                "user",
                format!(
                    "TOOL_RESULT check_compliance:\n{}",
                    serde_json::to_string(&serde_json::json!({
                        "issues": result.issues(),
                        "pass": result.passed(),
                        "summary": result.summary(),
                    }))?
                ),
            ),
            TranscriptEntry::Policy { document, .. } => Message::new(
                "user",
                format!("TOOL_RESULT get_policy:\n{}", document.content),
            ),
            TranscriptEntry::Redaction { outcome, .. } => Message::new(
                "user",
                format!(
                    "TOOL_RESULT redact_pii:\n{}",
                    serde_json::to_string(&serde_json::json!({
                        "redacted_text": outcome.redacted,
                        "redactions": outcome.redactions,
                        "summary": outcome.summary(),
                    }))?
                ),
            ),
        };
        messages.push(message);
    }

    messages.push(Message::new(
        "user",
        format!(
            "TASK: {}\n\nCURRENT EMAIL DRAFT:\n---\n{}\n---\n\nTake the next step.",
            ctx.goal, ctx.draft
        ),
    ));

    Ok(messages)
}

#[async_trait]
impl DecisionPolicy for LlmPolicy {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: build_messages(ctx)?,
            temperature: self.config.temperature,
        };

        debug!(
            model = %self.config.model,
            iteration = ctx.iteration,
            messages = request.messages.len(),
            "Requesting next action"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::decision(format!("model request failed: {}", e)))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Model endpoint returned an error");
            return Err(Error::decision(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::decision(format!("invalid model response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::decision("model response has no choices"))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use mailguard_core::ComplianceResult;

    #[test]
    fn test_messages_replay_transcript() {
        let transcript = vec![
            TranscriptEntry::Decision {
                iteration: 1,
                action: Action::tool(
                    crate::action::ToolName::CheckCompliance,
                    serde_json::json!({}),
                    "check first",
                ),
            },
            TranscriptEntry::Compliance {
                iteration: 1,
                result: ComplianceResult::clean(),
            },
        ];
        let ctx = DecisionContext {
            goal: "Review this email",
            draft: "Hello there",
            iteration: 1,
            max_iterations: 5,
            transcript: &transcript,
        };

        let messages = build_messages(&ctx).unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "[Iteration 1/5]");
        assert_eq!(messages[2].role, "assistant");
        assert!(messages[2].content.contains("check_compliance"));
        assert!(messages[3].content.contains("\"pass\":true"));
        assert!(messages[4].content.contains("Hello there"));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = LlmConfig {
            api_key_env: "MAILGUARD_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = LlmPolicy::new(config).err().unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_endpoint_joins_path() {
        let config = LlmConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..LlmConfig::default()
        };
        let policy = LlmPolicy::with_api_key(config, "k").unwrap();
        assert_eq!(policy.endpoint(), "http://localhost:9000/v1/chat/completions");
    }
}
