//! Rule-based compliance detector

use mailguard_core::{Category, ComplianceResult, Error, Issue, RedactionKind, Result, Severity};
use regex::Regex;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::patterns::KeywordMatcher;
use crate::pii::PiiPatterns;

/// Scans an email body and reports compliance issues
///
/// Categories are evaluated in a fixed order: PII, marketing,
/// confidentiality, legal. Within PII the kinds are reported as SSN, credit
/// card, phone, email. The check is pure and deterministic.
///
/// Keyword categories stop at their first hit, so a draft with several
/// promotional phrases yields a single marketing warning. Confidentiality
/// can report up to three warnings: a marker, project codenames and an
/// internal system name.
#[derive(Debug)]
pub struct ComplianceChecker {
    pii: PiiPatterns,
    marketing: KeywordMatcher,
    confidentiality: KeywordMatcher,
    internal_systems: KeywordMatcher,
    codename: Regex,
    codename_exclusions: Vec<String>,
    legal: KeywordMatcher,
    allowed_email_domains: Vec<String>,
}

impl ComplianceChecker {
    /// Build a checker from a configuration
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            pii: PiiPatterns::new()?,
            marketing: KeywordMatcher::new("marketing", &config.marketing_keywords)?,
            confidentiality: KeywordMatcher::new(
                "confidentiality",
                &config.confidentiality_markers,
            )?,
            internal_systems: KeywordMatcher::new("internal systems", &config.internal_systems)?,
            codename: Regex::new(r"\b(?:Project|Operation)\s+([A-Z][a-z]+)\b")
                .map_err(|e| Error::classifier(format!("Invalid codename pattern: {}", e)))?,
            codename_exclusions: config
                .codename_exclusions
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            legal: KeywordMatcher::new("legal", &config.legal_keywords)?,
            allowed_email_domains: config.allowed_email_domains.clone(),
        })
    }

    /// Build a checker with the default keyword tables
    pub fn with_defaults() -> Result<Self> {
        Self::new(&DetectorConfig::default())
    }

    /// Check an email body
    pub fn check(&self, text: &str) -> ComplianceResult {
        let mut issues = Vec::new();

        self.check_pii(text, &mut issues);

        // Keyword tables are lower-cased; scan the lower-cased text once.
        let lowered = text.to_lowercase();

        if let Some(hit) = self.marketing.first_match(&lowered) {
            issues.push(Issue::new(
                Category::Marketing,
                Severity::Warning,
                "Promotional language",
                format!(
                    "Promotional phrase '{}' may breach marketing guidelines",
                    hit.keyword
                ),
            ));
        }

        if let Some(hit) = self.confidentiality.first_match(&lowered) {
            issues.push(Issue::new(
                Category::Confidentiality,
                Severity::Warning,
                "Confidentiality marker",
                format!(
                    "Marker '{}' suggests internal material in an outbound email",
                    hit.keyword
                ),
            ));
        }

        let codenames = self.codenames(text);
        if !codenames.is_empty() {
            issues.push(Issue::new(
                Category::Confidentiality,
                Severity::Warning,
                "Project codename",
                format!(
                    "Possible internal project codename: {}",
                    codenames.join(", ")
                ),
            ));
        }

        if let Some(hit) = self.internal_systems.first_match(&lowered) {
            issues.push(Issue::new(
                Category::Confidentiality,
                Severity::Warning,
                "Internal system reference",
                format!("Reference to internal system '{}'", hit.keyword),
            ));
        }

        if let Some(hit) = self.legal.first_match(&lowered) {
            issues.push(Issue::new(
                Category::Legal,
                Severity::Warning,
                "Legal language",
                format!("Legal term '{}' should be reviewed before sending", hit.keyword),
            ));
        }

        let result = ComplianceResult::from_issues(issues);
        debug!(
            issues = result.issues().len(),
            pass = result.passed(),
            "Compliance check finished"
        );
        result
    }

    /// Capitalised names following "Project" or "Operation", minus generic words
    fn codenames<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.codename
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !self.codename_exclusions.contains(&name.to_lowercase()))
            .collect()
    }

    fn check_pii(&self, text: &str, issues: &mut Vec<Issue>) {
        let found = self
            .pii
            .find_all(text, |addr| crate::pii::is_allowed_email(addr, &self.allowed_email_domains));

        for kind in PiiPatterns::PRECEDENCE {
            let count = found.iter().filter(|m| m.kind == kind).count();
            if count == 0 {
                continue;
            }
            issues.push(pii_issue(kind, count));
        }
    }
}

fn pii_issue(kind: RedactionKind, count: usize) -> Issue {
    let (severity, title, what) = match kind {
        RedactionKind::Ssn => (Severity::Critical, "Social Security number", "SSN pattern"),
        RedactionKind::CreditCard => (
            Severity::Critical,
            "Credit card number",
            "credit card number",
        ),
        RedactionKind::Phone => (Severity::Warning, "Phone number", "phone number"),
        RedactionKind::Email => (Severity::Warning, "External email address", "email address"),
        RedactionKind::Password => (Severity::Critical, "Password", "password"),
    };

    Issue::new(
        Category::Pii,
        severity,
        title,
        format!("Found {} {}(s) in the email body", count, what),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> ComplianceChecker {
        ComplianceChecker::with_defaults().unwrap()
    }

    #[test]
    fn test_ssn_and_card_fail() {
        let result = checker().check("My SSN is 321-54-9876 and my card is 4111-2222-3333-4444.");
        assert!(!result.passed());
        assert_eq!(result.issues().len(), 2);
        assert!(result
            .issues()
            .iter()
            .all(|i| i.category == Category::Pii && i.severity == Severity::Critical));
        assert_eq!(result.issues()[0].title, "Social Security number");
        assert_eq!(result.issues()[1].title, "Credit card number");
    }

    #[test]
    fn test_marketing_only_passes_with_warning() {
        let result = checker().check("Act now! This offer is guaranteed.");
        assert!(result.passed());
        assert_eq!(result.issues().len(), 1);
        let issue = &result.issues()[0];
        assert_eq!(issue.category, Category::Marketing);
        assert_eq!(issue.severity, Severity::Warning);
        assert!(issue.description.contains("act now"));
    }

    #[test]
    fn test_clean_email() {
        let result = checker().check("Hi team, the report is attached. Thanks, Sam");
        assert!(result.passed());
        assert!(result.issues().is_empty());
    }

    #[test]
    fn test_evaluation_order() {
        let text = "CONFIDENTIAL: call 555-123-4567, our attorney says act now";
        let result = checker().check(text);
        let categories: Vec<Category> = result.issues().iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Pii,
                Category::Marketing,
                Category::Confidentiality,
                Category::Legal
            ]
        );
        assert!(result.passed());
    }

    #[test]
    fn test_one_issue_per_pii_kind() {
        let result = checker().check("SSNs 111-22-3333 and 444-55-6666");
        assert_eq!(result.issues().len(), 1);
        assert!(result.issues()[0].description.contains("2"));
    }

    #[test]
    fn test_allowed_domain_not_flagged() {
        let config = DetectorConfig {
            allowed_email_domains: vec!["company.com".to_string()],
            ..DetectorConfig::default()
        };
        let checker = ComplianceChecker::new(&config).unwrap();
        assert!(checker.check("Reply to sales@company.com").issues().is_empty());
        assert_eq!(checker.check("Reply to bob@gmail.com").issues().len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let c = checker();
        let text = "Limited time: email jane@gmail.com, SSN 321-54-9876";
        assert_eq!(c.check(text), c.check(text));
    }

    #[test]
    fn test_internal_system_reference_warns() {
        let result = checker().check("Details are in the Jira ticket I opened.");
        assert!(result.passed());
        assert_eq!(result.issues().len(), 1);
        assert_eq!(result.issues()[0].category, Category::Confidentiality);
        assert_eq!(result.issues()[0].title, "Internal system reference");
        assert!(result.issues()[0].description.contains("jira"));
    }

    #[test]
    fn test_project_codenames() {
        let result = checker().check("Project Falcon ships after the Project Update call.");
        assert_eq!(result.issues().len(), 1);
        assert_eq!(result.issues()[0].title, "Project codename");
        assert_eq!(
            result.issues()[0].description,
            "Possible internal project codename: Falcon"
        );

        assert!(checker().check("Here is the Project Status.").issues().is_empty());
    }

    #[test]
    fn test_configured_internal_systems() {
        let config = DetectorConfig {
            internal_systems: vec!["Notion".to_string()],
            ..DetectorConfig::default()
        };
        let checker = ComplianceChecker::new(&config).unwrap();
        assert_eq!(checker.check("It's on our Notion page").issues().len(), 1);
        assert!(checker.check("See the Jira board").issues().is_empty());
    }
}
