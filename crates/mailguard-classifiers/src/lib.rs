//! Mailguard Classifiers
//!
//! Deterministic, pattern-based checks for outbound email.
//!
//! - [`ComplianceChecker`] reports PII, marketing, confidentiality and legal
//!   issues with their severities
//! - [`Redactor`] masks SSNs, card numbers, phone numbers, external email
//!   addresses and passwords
//!
//! Both are pure: the same input always yields the same output.

pub mod compliance;
pub mod config;
pub mod patterns;
pub mod pii;
pub mod redaction;

pub use compliance::ComplianceChecker;
pub use config::DetectorConfig;
pub use patterns::{KeywordHit, KeywordMatcher};
pub use pii::{PiiMatch, PiiPatterns};
pub use redaction::Redactor;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::compliance::ComplianceChecker;
    pub use crate::config::DetectorConfig;
    pub use crate::redaction::Redactor;
}
