//! Mailguard Policy
//!
//! The review loop and its collaborators:
//! - Actions: the validated decisions a policy can make
//! - Decision policies: scripted, rule-based and model-backed
//! - Tool execution against the detector, redactor and policy store
//! - Policy documents, built in or read from a directory
//! - The iterative review engine that streams its progress as events

pub mod action;
pub mod decision;
pub mod engine;
pub mod executor;
pub mod history;
pub mod llm;
pub mod rules;
pub mod store;

pub use action::{Action, ToolName};
pub use decision::{DecisionContext, DecisionPolicy, ScriptedPolicy, TranscriptEntry};
pub use engine::{EngineConfig, ReviewEngine, ReviewRequest, RunFailure, RunReport, DEFAULT_GOAL};
pub use executor::{ToolExecutor, ToolOutput};
pub use history::{IterationHistory, StepRecord};
pub use llm::{LlmConfig, LlmPolicy};
pub use rules::{RuleBasedPolicy, RuleRewriter};
pub use store::{BuiltinPolicyStore, DirectoryPolicyStore, PolicyStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::action::{Action, ToolName};
    pub use crate::decision::{DecisionPolicy, ScriptedPolicy};
    pub use crate::engine::{EngineConfig, ReviewEngine, ReviewRequest, RunReport};
    pub use crate::rules::RuleBasedPolicy;
    pub use crate::store::{BuiltinPolicyStore, PolicyStore};
}
