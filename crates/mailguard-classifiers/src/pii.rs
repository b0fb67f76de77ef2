//! PII patterns shared by the detector and the redactor

use mailguard_core::{Error, RedactionKind, Result};
use regex::Regex;
use std::ops::Range;

/// Compiled PII patterns
#[derive(Debug, Clone)]
pub struct PiiPatterns {
    pub(crate) ssn: Regex,
    pub(crate) credit_card: Regex,
    pub(crate) phone: Regex,
    pub(crate) email: Regex,
}

/// A PII occurrence located in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiMatch {
    pub kind: RedactionKind,
    pub span: Range<usize>,
}

impl PiiPatterns {
    /// Detection precedence; earlier kinds claim overlapping spans first
    pub const PRECEDENCE: [RedactionKind; 4] = [
        RedactionKind::Ssn,
        RedactionKind::CreditCard,
        RedactionKind::Phone,
        RedactionKind::Email,
    ];

    /// Compile the PII patterns
    pub fn new() -> Result<Self> {
        Ok(Self {
            ssn: compile("SSN", r"\b\d{3}[-. ]?\d{2}[-. ]?\d{4}\b")?,
            // last group captured so the mask can keep it
            credit_card: compile("credit card", r"\b(?:\d{4}[- ]?){3}(\d{4})\b")?,
            // group 1 is the area code
            phone: compile(
                "phone",
                r"(?:\+?1[-. ]?)?\(?\b(\d{3})\)?[-. ]?\d{3}[-. ]?\d{4}\b",
            )?,
            email: compile(
                "email",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            )?,
        })
    }

    /// Pattern for a kind; passwords are handled by the redactor alone
    pub fn pattern(&self, kind: RedactionKind) -> Option<&Regex> {
        match kind {
            RedactionKind::Ssn => Some(&self.ssn),
            RedactionKind::CreditCard => Some(&self.credit_card),
            RedactionKind::Phone => Some(&self.phone),
            RedactionKind::Email => Some(&self.email),
            RedactionKind::Password => None,
        }
    }

    /// Locate PII in precedence order
    ///
    /// A match overlapping a span already claimed by an earlier kind is
    /// dropped, so one stretch of digits is attributed to one kind only.
    /// `keep_email` filters addresses that are allowed to stay.
    pub fn find_all(&self, text: &str, keep_email: impl Fn(&str) -> bool) -> Vec<PiiMatch> {
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut found = Vec::new();

        for kind in Self::PRECEDENCE {
            let Some(regex) = self.pattern(kind) else {
                continue;
            };

            let mut spans = Vec::new();
            for m in regex.find_iter(text) {
                if kind == RedactionKind::Email && keep_email(m.as_str()) {
                    continue;
                }
                let span = m.range();
                if claimed.iter().any(|c| overlaps(c, &span)) {
                    continue;
                }
                spans.push(span);
            }

            for span in spans {
                claimed.push(span.clone());
                found.push(PiiMatch { kind, span });
            }
        }

        found
    }
}

/// Check if an address belongs to one of the allowed domains
pub fn is_allowed_email(address: &str, allowed_domains: &[String]) -> bool {
    let Some((_, domain)) = address.rsplit_once('@') else {
        return false;
    };
    allowed_domains
        .iter()
        .any(|allowed| domain.eq_ignore_ascii_case(allowed.trim_start_matches('@')))
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn compile(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::classifier(format!("Failed to compile {} regex: {}", name, e)))
}
