//! PII redaction

use mailguard_core::{Redaction, RedactionKind, RedactionOutcome, Result};
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::DetectorConfig;
use crate::pii::{is_allowed_email, PiiPatterns};

pub const SSN_PLACEHOLDER: &str = "[SSN REDACTED]";
pub const EMAIL_PLACEHOLDER: &str = "[EMAIL REDACTED]";
pub const PASSWORD_PLACEHOLDER: &str = "[PASSWORD REDACTED]";

const CARD_MASK_PREFIX: &str = "****-****-****-";

/// Masks sensitive values in an email body
///
/// Passes run in a fixed order (SSN, credit card, phone, email, password),
/// each over the output of the previous one. Masks never re-match, so
/// redacting an already redacted text changes nothing.
#[derive(Debug, Clone)]
pub struct Redactor {
    pii: PiiPatterns,
    password: Regex,
    allowed_email_domains: Vec<String>,
}

impl Redactor {
    /// Build a redactor sharing the detector's allow-list
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let password = Regex::new(r"(?i)\b(password|passwd|pwd)(\s*[:=]\s*)([^\s\[]\S*)")
            .map_err(|e| {
                mailguard_core::Error::classifier(format!(
                    "Failed to compile password regex: {}",
                    e
                ))
            })?;

        Ok(Self {
            pii: PiiPatterns::new()?,
            password,
            allowed_email_domains: config.allowed_email_domains.clone(),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(&DetectorConfig::default())
    }

    /// Redact a text, recording every substitution in the order made
    pub fn redact(&self, text: &str) -> RedactionOutcome {
        let mut redactions = Vec::new();

        let redacted = replace(&self.pii.ssn, text, RedactionKind::Ssn, &mut redactions, |_| {
            Some(SSN_PLACEHOLDER.to_string())
        });

        let redacted = replace(
            &self.pii.credit_card,
            &redacted,
            RedactionKind::CreditCard,
            &mut redactions,
            |caps| {
                let whole = caps.get(0)?;
                // The digits kept by an earlier mask are not a new card.
                if redacted[..whole.start()].ends_with(CARD_MASK_PREFIX) {
                    return None;
                }
                caps.get(1)
                    .map(|last| format!("{}{}", CARD_MASK_PREFIX, last.as_str()))
            },
        );

        let redacted = replace(
            &self.pii.phone,
            &redacted,
            RedactionKind::Phone,
            &mut redactions,
            mask_phone,
        );

        let redacted = replace(
            &self.pii.email,
            &redacted,
            RedactionKind::Email,
            &mut redactions,
            |caps| {
                let address = caps.get(0)?.as_str();
                if is_allowed_email(address, &self.allowed_email_domains) {
                    None
                } else {
                    Some(EMAIL_PLACEHOLDER.to_string())
                }
            },
        );

        let redacted = replace(
            &self.password,
            &redacted,
            RedactionKind::Password,
            &mut redactions,
            |caps| {
                let key = caps.get(1)?.as_str();
                let separator = caps.get(2)?.as_str();
                Some(format!("{}{}{}", key, separator, PASSWORD_PLACEHOLDER))
            },
        );

        debug!(count = redactions.len(), "Redaction finished");

        RedactionOutcome {
            original: text.to_string(),
            redacted,
            redactions,
        }
    }
}

/// Run one redaction pass
///
/// `mask` returns `None` to leave a match untouched.
fn replace<F>(
    regex: &Regex,
    text: &str,
    kind: RedactionKind,
    redactions: &mut Vec<Redaction>,
    mut mask: F,
) -> String
where
    F: FnMut(&Captures<'_>) -> Option<String>,
{
    regex
        .replace_all(text, |caps: &Captures<'_>| {
            let original = caps.get(0).map_or("", |m| m.as_str());
            match mask(caps) {
                Some(replacement) => {
                    redactions.push(Redaction {
                        kind,
                        original_span: original.to_string(),
                        replacement: replacement.clone(),
                    });
                    replacement
                }
                None => original.to_string(),
            }
        })
        .into_owned()
}

/// Keep the country code and area code, star out the remaining digits
fn mask_phone(caps: &Captures<'_>) -> Option<String> {
    let whole = caps.get(0)?;
    let area = caps.get(1)?;
    let (head, tail) = whole.as_str().split_at(area.end() - whole.start());

    let masked: String = tail
        .chars()
        .map(|c| if c.is_ascii_digit() { '*' } else { c })
        .collect();
    Some(format!("{}{}", head, masked))
}
