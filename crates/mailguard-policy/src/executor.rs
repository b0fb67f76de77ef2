//! Tool execution for the review loop
//!
//! Tools are pure with respect to the run: they read the current draft and
//! return a result. Replacing the draft is up to the loop.

use mailguard_classifiers::{ComplianceChecker, Redactor};
use mailguard_core::{Category, ComplianceResult, Error, PolicyDocument, RedactionOutcome, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::action::ToolName;
use crate::store::PolicyStore;

/// Category used when a policy lookup names none and nothing is outstanding
pub const FALLBACK_CATEGORY: &str = "general";

/// Result of one tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Compliance(ComplianceResult),
    Policy(PolicyDocument),
    Redaction(RedactionOutcome),
}

/// Runs the detector, the redactor and policy lookups
#[derive(Clone)]
pub struct ToolExecutor {
    checker: Arc<ComplianceChecker>,
    redactor: Arc<Redactor>,
    store: Arc<dyn PolicyStore>,
}

impl ToolExecutor {
    pub fn new(
        checker: Arc<ComplianceChecker>,
        redactor: Arc<Redactor>,
        store: Arc<dyn PolicyStore>,
    ) -> Self {
        Self {
            checker,
            redactor,
            store,
        }
    }

    /// Execute a tool against the current draft
    ///
    /// `outstanding` lists the categories of the latest failing or warning
    /// check; it picks the policy when the input names none.
    pub fn execute(
        &self,
        tool: ToolName,
        input: &Value,
        draft: &str,
        outstanding: &[Category],
    ) -> Result<ToolOutput> {
        match tool {
            ToolName::CheckCompliance => Ok(ToolOutput::Compliance(self.check(draft))),
            ToolName::GetPolicy => {
                let category = resolve_category(input, outstanding)?;
                Ok(ToolOutput::Policy(self.get_policy(&category)))
            }
            ToolName::RedactPii => Ok(ToolOutput::Redaction(self.redact(draft))),
        }
    }

    pub fn check(&self, draft: &str) -> ComplianceResult {
        let result = self.checker.check(draft);
        if !result.passed() {
            warn!(
                issues = result.issues().len(),
                categories = ?result.categories(),
                "Draft failed compliance check"
            );
        } else {
            debug!(issues = result.issues().len(), "Draft passed compliance check");
        }
        result
    }

    pub fn get_policy(&self, category: &str) -> PolicyDocument {
        let document = self.store.get_policy(category);
        debug!(category = %category, title = %document.title, "Policy loaded");
        document
    }

    pub fn redact(&self, draft: &str) -> RedactionOutcome {
        let outcome = self.redactor.redact(draft);
        if outcome.count() > 0 {
            info!(redactions = outcome.count(), "Redacted sensitive values from draft");
        }
        outcome
    }
}

/// Pick the category for a policy lookup
///
/// `input.category` wins; otherwise the first outstanding category;
/// otherwise the fallback, which resolves to the "not found" document.
pub fn resolve_category(input: &Value, outstanding: &[Category]) -> Result<String> {
    match input.get("category") {
        Some(Value::String(category)) if !category.trim().is_empty() => {
            Ok(category.trim().to_lowercase())
        }
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(outstanding
            .first()
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())),
        Some(other) => Err(Error::tool(
            ToolName::GetPolicy.as_str(),
            format!("category must be a string, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BuiltinPolicyStore;
    use serde_json::json;

    fn executor() -> ToolExecutor {
        ToolExecutor::new(
            Arc::new(ComplianceChecker::with_defaults().unwrap()),
            Arc::new(Redactor::with_defaults().unwrap()),
            Arc::new(BuiltinPolicyStore::new()),
        )
    }

    #[test]
    fn test_category_resolution() {
        let outstanding = [Category::Marketing, Category::Legal];
        assert_eq!(resolve_category(&json!({"category": "Legal"}), &outstanding).unwrap(), "legal");
        assert_eq!(resolve_category(&json!({}), &outstanding).unwrap(), "marketing");
        assert_eq!(resolve_category(&json!({"category": ""}), &[]).unwrap(), "general");
        assert_eq!(resolve_category(&json!({"category": null}), &[]).unwrap(), "general");
    }

    #[test]
    fn test_non_string_category_is_tool_error() {
        let err = resolve_category(&json!({"category": 7}), &[]).unwrap_err();
        assert_eq!(err.kind(), "tool_execution");
    }

    #[test]
    fn test_execute_dispatch() {
        let exec = executor();
        let draft = "Call 555-123-4567";

        match exec.execute(ToolName::CheckCompliance, &json!({}), draft, &[]).unwrap() {
            ToolOutput::Compliance(result) => assert_eq!(result.issues().len(), 1),
            other => panic!("unexpected output {:?}", other),
        }

        match exec.execute(ToolName::RedactPii, &json!({}), draft, &[]).unwrap() {
            ToolOutput::Redaction(outcome) => assert_eq!(outcome.redacted, "Call 555-***-****"),
            other => panic!("unexpected output {:?}", other),
        }

        match exec.execute(ToolName::GetPolicy, &json!({}), draft, &[]).unwrap() {
            ToolOutput::Policy(doc) => assert_eq!(doc.category, "general"),
            other => panic!("unexpected output {:?}", other),
        }
    }
}
