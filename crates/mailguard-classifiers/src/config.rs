//! Configuration for the compliance detector and the redactor

use mailguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keyword tables and allow-lists used by the detector
///
/// Every field has a default, so an empty YAML mapping is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Promotional phrases flagged as marketing warnings
    #[serde(default = "default_marketing_keywords")]
    pub marketing_keywords: Vec<String>,

    /// Markers that must not leave the organisation
    #[serde(default = "default_confidentiality_markers")]
    pub confidentiality_markers: Vec<String>,

    /// Internal tools whose names should not appear in outbound email
    #[serde(default = "default_internal_systems")]
    pub internal_systems: Vec<String>,

    /// Words that may follow "Project" or "Operation" without being a codename
    #[serde(default = "default_codename_exclusions")]
    pub codename_exclusions: Vec<String>,

    /// Terms that suggest the email needs legal review
    #[serde(default = "default_legal_keywords")]
    pub legal_keywords: Vec<String>,

    /// Email domains that are neither flagged nor redacted
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            marketing_keywords: default_marketing_keywords(),
            confidentiality_markers: default_confidentiality_markers(),
            internal_systems: default_internal_systems(),
            codename_exclusions: default_codename_exclusions(),
            legal_keywords: default_legal_keywords(),
            allowed_email_domains: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid detector config: {}", e)))
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Check if an address is on the allow-list
    pub fn is_allowed_email(&self, address: &str) -> bool {
        crate::pii::is_allowed_email(address, &self.allowed_email_domains)
    }
}

fn default_marketing_keywords() -> Vec<String> {
    to_strings(&[
        "guaranteed",
        "free money",
        "act now",
        "limited time",
        "winner",
        "congratulations",
        "buy now",
        "free trial",
        "special price",
    ])
}

fn default_confidentiality_markers() -> Vec<String> {
    to_strings(&[
        "confidential",
        "internal only",
        "do not share",
        "proprietary",
        "do not distribute",
        "not for external",
    ])
}

fn default_internal_systems() -> Vec<String> {
    to_strings(&[
        "jira",
        "confluence",
        "slack channel",
        "internal wiki",
        "sharepoint",
        "intranet",
    ])
}

fn default_codename_exclusions() -> Vec<String> {
    to_strings(&[
        "update", "status", "report", "plan", "summary", "overview", "meeting", "review",
        "proposal", "timeline", "progress",
    ])
}

fn default_legal_keywords() -> Vec<String> {
    to_strings(&["lawsuit", "attorney", "legal action", "sue", "liability"])
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = DetectorConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, DetectorConfig::default());
        assert!(config.marketing_keywords.contains(&"act now".to_string()));
        assert!(config.allowed_email_domains.is_empty());
        assert!(config.internal_systems.contains(&"jira".to_string()));
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
legal_keywords: ["subpoena"]
allowed_email_domains: ["company.com"]
"#;
        let config = DetectorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.legal_keywords, vec!["subpoena".to_string()]);
        assert!(config.is_allowed_email("ops@company.com"));
        assert_eq!(
            config.confidentiality_markers,
            DetectorConfig::default().confidentiality_markers
        );
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = DetectorConfig::from_yaml_str("legal_keywords: 12").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
