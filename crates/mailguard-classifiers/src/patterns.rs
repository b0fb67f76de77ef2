//! Keyword matching using the Aho-Corasick algorithm

use aho_corasick::AhoCorasick;
use mailguard_core::{Error, Result};

/// A keyword located in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub keyword: String,
    pub start: usize,
    pub end: usize,
}

/// Case-insensitive whole-word keyword matcher
///
/// Keywords are stored lower-cased. A hit only counts when it is not glued
/// to a letter or digit on either side, so "sue" never fires inside "issue".
pub struct KeywordMatcher {
    name: String,
    automaton: Option<AhoCorasick>,
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// Build a matcher from a keyword table
    pub fn new<I, S>(name: impl Into<String>, keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let automaton = if keywords.is_empty() {
            None
        } else {
            let ac = AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&keywords)
                .map_err(|e| {
                    Error::classifier(format!("Failed to build '{}' keyword matcher: {}", name, e))
                })?;
            Some(ac)
        };

        Ok(Self {
            name,
            automaton,
            keywords,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Earliest whole-word hit in `text`
    ///
    /// Ties on the start position go to the keyword listed first.
    pub fn first_match(&self, text: &str) -> Option<KeywordHit> {
        let automaton = self.automaton.as_ref()?;

        automaton
            .find_overlapping_iter(text)
            .filter(|m| is_whole_word(text, m.start(), m.end()))
            .min_by_key(|m| (m.start(), m.pattern().as_usize()))
            .map(|m| KeywordHit {
                keyword: self.keywords[m.pattern().as_usize()].clone(),
                start: m.start(),
                end: m.end(),
            })
    }

    /// Check if any keyword occurs as a whole word
    pub fn is_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }
}

impl std::fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("name", &self.name)
            .field("keywords", &self.keywords)
            .finish()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !is_word_char(c));
    let after_ok = text[end..].chars().next().map_or(true, |c| !is_word_char(c));
    before_ok && after_ok
}
