//! Core types for Mailguard

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of characters kept in a draft preview
pub const PREVIEW_CHARS: usize = 100;

/// Compliance rule family an issue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pii,
    Marketing,
    Legal,
    Confidentiality,
}

impl Category {
    /// All categories in detector evaluation order
    pub const EVALUATION_ORDER: [Category; 4] = [
        Category::Pii,
        Category::Marketing,
        Category::Confidentiality,
        Category::Legal,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Marketing => "marketing",
            Self::Legal => "legal",
            Self::Confidentiality => "confidentiality",
        }
    }

    /// Parse a category name, ignoring case and surrounding whitespace
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pii" => Some(Self::Pii),
            "marketing" => Some(Self::Marketing),
            "legal" => Some(Self::Legal),
            "confidentiality" => Some(Self::Confidentiality),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity. Only `Critical` fails a compliance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// One detected compliance problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Issue {
    /// Create a new issue
    pub fn new(
        category: Category,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Check whether this issue fails the check on its own
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Outcome of a single detector pass
///
/// `pass` is derived from the issue severities at construction and cannot be
/// set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceResult {
    issues: Vec<Issue>,
    pass: bool,
}

impl ComplianceResult {
    /// Build a result from an ordered issue list
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let pass = !issues.iter().any(Issue::is_critical);
        Self { issues, pass }
    }

    /// A passing result with no issues
    pub fn clean() -> Self {
        Self::from_issues(Vec::new())
    }

    /// Issues in detector evaluation order
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Whether no issue is critical
    pub fn passed(&self) -> bool {
        self.pass
    }

    /// Distinct categories with at least one issue, in evaluation order
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = Vec::new();
        for issue in &self.issues {
            if !seen.contains(&issue.category) {
                seen.push(issue.category);
            }
        }
        seen
    }

    /// Check whether any issue falls in the given category
    pub fn has_category(&self, category: Category) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        match self.issues.len() {
            0 => "Email passed compliance check".to_string(),
            n if self.pass => format!("Passed with {} warning(s)", n),
            n => format!("Found {} compliance issue(s)", n),
        }
    }
}

/// Kind of sensitive value masked by the redactor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionKind {
    Ssn,
    CreditCard,
    Phone,
    Email,
    Password,
}

impl RedactionKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Password => "password",
        }
    }
}

/// A single substitution made by the redactor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    #[serde(rename = "type")]
    pub kind: RedactionKind,

    /// The text that was replaced
    #[serde(rename = "original")]
    pub original_span: String,

    /// The text it was replaced with
    pub replacement: String,
}

/// Output of the `redact_pii` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionOutcome {
    pub original: String,
    pub redacted: String,
    pub redactions: Vec<Redaction>,
}

impl RedactionOutcome {
    /// Number of substitutions made
    pub fn count(&self) -> usize {
        self.redactions.len()
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        if self.redactions.is_empty() {
            "No PII found to redact".to_string()
        } else {
            format!("Redacted {} PII item(s)", self.redactions.len())
        }
    }
}

/// Policy guidance for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub category: String,
    pub title: String,
    pub content: String,
}

impl PolicyDocument {
    /// Create a document, deriving the title from the first `# ` heading
    pub fn from_markdown(category: impl Into<String>, content: impl Into<String>) -> Self {
        let category = category.into();
        let content = content.into();
        let title = content
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| category.to_uppercase());

        Self {
            category,
            title,
            content,
        }
    }
}

/// Per-iteration status as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    Starting,
    Issues,
    Pass,
    Rewrite,
    Fail,
}

/// Latest known status of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub status: IterationStatus,
    pub preview: String,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Finalized and the final check passed
    Pass,
    /// Finalized but the final check still reports critical issues
    Fail,
    /// The iteration cap was hit before the policy finalized
    NeedsReview,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NeedsReview => "needs_review",
        }
    }
}

/// Truncate text to at most `max_chars` characters on a char boundary
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn issue(severity: Severity) -> Issue {
        Issue::new(Category::Pii, severity, "t", "d")
    }

    #[test]
    fn test_pass_derived_from_severity() {
        assert!(ComplianceResult::clean().passed());
        assert!(ComplianceResult::from_issues(vec![issue(Severity::Warning)]).passed());
        assert!(!ComplianceResult::from_issues(vec![
            issue(Severity::Warning),
            issue(Severity::Critical)
        ])
        .passed());
    }

    #[test]
    fn test_categories_are_distinct_and_ordered() {
        let result = ComplianceResult::from_issues(vec![
            Issue::new(Category::Pii, Severity::Critical, "a", "a"),
            Issue::new(Category::Pii, Severity::Warning, "b", "b"),
            Issue::new(Category::Legal, Severity::Warning, "c", "c"),
        ]);
        assert_eq!(result.categories(), vec![Category::Pii, Category::Legal]);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn test_policy_title_from_heading() {
        let doc = PolicyDocument::from_markdown("pii", "intro\n# PII Policy\nbody");
        assert_eq!(doc.title, "PII Policy");

        let doc = PolicyDocument::from_markdown("legal", "no heading");
        assert_eq!(doc.title, "LEGAL");
    }

    #[test]
    fn test_redaction_wire_names() {
        let r = Redaction {
            kind: RedactionKind::CreditCard,
            original_span: "4111".to_string(),
            replacement: "****".to_string(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "credit_card");
        assert_eq!(json["original"], "4111");
    }

    fn severity() -> impl Strategy<Value = Severity> {
        prop_oneof![Just(Severity::Warning), Just(Severity::Critical)]
    }

    proptest! {
        #[test]
        fn prop_pass_iff_no_critical(severities in proptest::collection::vec(severity(), 0..20)) {
            let issues: Vec<Issue> = severities.iter().map(|s| issue(*s)).collect();
            let any_critical = issues.iter().any(Issue::is_critical);

            let result = ComplianceResult::from_issues(issues);
            prop_assert_eq!(result.passed(), !any_critical);
            prop_assert_eq!(result.issues().len(), severities.len());
        }
    }
}
