//! Deterministic rule-based decision policy

use async_trait::async_trait;
use mailguard_core::{Category, Error, Result};
use regex::{Captures, Regex};
use serde_json::json;

use crate::action::{Action, ToolName};
use crate::decision::{DecisionContext, DecisionPolicy};

/// Footer appended to promotional emails that lack one
pub const UNSUBSCRIBE_FOOTER: &str = "To unsubscribe from these emails, reply with UNSUBSCRIBE.";

const REPLACEMENTS: &[(Category, &str, &str)] = &[
    (Category::Marketing, "guaranteed", "expected"),
    (Category::Marketing, "guarantee", "aim"),
    (Category::Marketing, "free money", "savings"),
    (Category::Marketing, "act now", "at your convenience"),
    (Category::Marketing, "buy now", "learn more"),
    (Category::Marketing, "limited time", "current"),
    (Category::Marketing, "winner", "valued customer"),
    (Category::Marketing, "congratulations", "hello"),
    (Category::Marketing, "free trial", "trial"),
    (Category::Marketing, "special price", "current price"),
    (Category::Legal, "legal action", "further discussion"),
    (Category::Legal, "lawsuit", "formal dispute"),
    (Category::Legal, "attorney", "representative"),
    (Category::Legal, "sue", "follow up with"),
    (Category::Legal, "liability", "responsibility"),
];

const CONFIDENTIALITY_MARKERS: &[&str] = &[
    "confidential",
    "internal only",
    "do not share",
    "proprietary",
    "do not distribute",
    "not for external use",
    "not for external distribution",
    "not for external",
];

struct Replacement {
    category: Category,
    pattern: Regex,
    replacement: &'static str,
}

/// Softens flagged wording and strips confidentiality markers
pub struct RuleRewriter {
    replacements: Vec<Replacement>,
    markers: Regex,
    extra_spaces: Regex,
    extra_blank_lines: Regex,
}

impl RuleRewriter {
    pub fn new() -> Result<Self> {
        let replacements = REPLACEMENTS
            .iter()
            .map(|(category, phrase, replacement)| {
                Ok(Replacement {
                    category: *category,
                    pattern: compile(&format!(r"(?i)\b{}\b", regex::escape(phrase)))?,
                    replacement: *replacement,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let markers = CONFIDENTIALITY_MARKERS
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            replacements,
            markers: compile(&format!(r"(?i)\b(?:{})\b[ \t]*[:!.\-]*[ \t]*", markers))?,
            extra_spaces: compile(r"[ \t]{2,}")?,
            extra_blank_lines: compile(r"\n{3,}")?,
        })
    }

    /// Rewrite `text` for the outstanding categories
    ///
    /// Returns the input unchanged when no rule applies.
    pub fn rewrite(&self, text: &str, outstanding: &[Category]) -> String {
        let mut out = text.to_string();

        for rule in &self.replacements {
            if !outstanding.contains(&rule.category) {
                continue;
            }
            out = rule
                .pattern
                .replace_all(&out, |caps: &Captures<'_>| {
                    match_case(caps.get(0).map_or("", |m| m.as_str()), rule.replacement)
                })
                .into_owned();
        }

        if outstanding.contains(&Category::Confidentiality) && self.markers.is_match(&out) {
            out = self.markers.replace_all(&out, "").into_owned();
            out = self.extra_spaces.replace_all(&out, " ").into_owned();
            out = self.extra_blank_lines.replace_all(&out, "\n\n").into_owned();
            out = out
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n")
                .trim_start()
                .to_string();
        }

        if outstanding.contains(&Category::Marketing)
            && !out.to_lowercase().contains("unsubscribe")
        {
            out = format!("{}\n\n{}", out.trim_end(), UNSUBSCRIBE_FOOTER);
        }

        out
    }
}

/// Carry the casing of `original` over to `replacement`
fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }

    let starts_upper = original.chars().next().map_or(false, char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }

    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::config(format!("invalid rewrite rule: {}", e)))
}

/// Deterministic default policy
///
/// Checks the draft and finalizes as soon as a check passes. A failing
/// check loads the policy for each flagged category once, redacts PII,
/// then rewrites flagged wording before checking again.
pub struct RuleBasedPolicy {
    rewriter: RuleRewriter,
}

impl RuleBasedPolicy {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rewriter: RuleRewriter::new()?,
        })
    }

    fn next_action(&self, ctx: &DecisionContext<'_>) -> Action {
        let Some(check) = ctx.fresh_check() else {
            // Redaction invalidated the failing check; soften the rest of it
            // before checking again.
            if ctx.redacted_this_iteration() {
                if let Some(failed) = ctx.latest_check().filter(|c| !c.passed()) {
                    if let Some(action) = self.rewrite(ctx.draft, &failed.categories()) {
                        return action;
                    }
                }
            }
            return Action::tool(
                ToolName::CheckCompliance,
                json!({}),
                "Checking the current draft against the compliance rules",
            );
        };

        if check.passed() {
            let thought = if check.issues().is_empty() {
                "The draft has no compliance issues"
            } else {
                "The draft passes; only warnings remain"
            };
            return Action::finish(ctx.draft, thought);
        }

        let categories = check.categories();
        if let Some(category) = categories.iter().find(|c| !ctx.policy_loaded(c.as_str())) {
            return Action::tool(
                ToolName::GetPolicy,
                json!({ "category": category.as_str() }),
                format!("Loading the {} policy before fixing the draft", category),
            );
        }

        if check.has_category(Category::Pii) && !ctx.redacted_this_iteration() {
            return Action::tool(
                ToolName::RedactPii,
                json!({}),
                "Redacting personal data found in the draft",
            );
        }

        self.rewrite(ctx.draft, &categories)
            .unwrap_or_else(|| Action::finish(ctx.draft, "No further automatic fixes apply"))
    }

    fn rewrite(&self, draft: &str, categories: &[Category]) -> Option<Action> {
        let rewritten = self.rewriter.rewrite(draft, categories);
        if rewritten == draft {
            return None;
        }
        let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
        Some(Action::rewrite(
            rewritten,
            format!("Rewriting flagged wording ({})", names.join(", ")),
        ))
    }
}

#[async_trait]
impl DecisionPolicy for RuleBasedPolicy {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> Result<String> {
        self.next_action(ctx).to_raw()
    }

    fn name(&self) -> &str {
        "rules"
    }
}
