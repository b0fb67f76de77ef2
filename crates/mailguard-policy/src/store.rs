//! Policy documents looked up by category

use mailguard_core::{Category, PolicyDocument};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Source of policy guidance
///
/// Lookups never fail: an unknown category yields a well-formed
/// "not found" document so callers can treat every answer the same way.
pub trait PolicyStore: Send + Sync {
    fn get_policy(&self, category: &str) -> PolicyDocument;
}

/// Documents compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPolicyStore;

impl BuiltinPolicyStore {
    pub fn new() -> Self {
        Self
    }

    /// Markdown source for a known category
    pub fn content(category: Category) -> &'static str {
        match category {
            Category::Pii => include_str!("../policies/pii.md"),
            Category::Marketing => include_str!("../policies/marketing.md"),
            Category::Legal => include_str!("../policies/legal.md"),
            Category::Confidentiality => include_str!("../policies/confidentiality.md"),
        }
    }
}

impl PolicyStore for BuiltinPolicyStore {
    fn get_policy(&self, category: &str) -> PolicyDocument {
        match Category::parse(category) {
            Some(known) => PolicyDocument::from_markdown(known.as_str(), Self::content(known)),
            None => not_found(category),
        }
    }
}

/// Documents read from `<dir>/<category>.md`, falling back to the built-ins
#[derive(Debug, Clone)]
pub struct DirectoryPolicyStore {
    dir: PathBuf,
    fallback: BuiltinPolicyStore,
}

impl DirectoryPolicyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback: BuiltinPolicyStore,
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl PolicyStore for DirectoryPolicyStore {
    fn get_policy(&self, category: &str) -> PolicyDocument {
        // Only known categories map to files; this also keeps arbitrary
        // input from turning into a path.
        let Some(known) = Category::parse(category) else {
            return not_found(category);
        };

        let path = self.dir.join(format!("{}.md", known.as_str()));
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(path = %path.display(), "Loaded policy document from disk");
                PolicyDocument::from_markdown(known.as_str(), content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.fallback.get_policy(category),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read policy document, using built-in");
                self.fallback.get_policy(category)
            }
        }
    }
}

/// Stub returned for categories without guidance
pub fn not_found(category: &str) -> PolicyDocument {
    let category = category.trim().to_lowercase();
    let valid: Vec<&str> = Category::EVALUATION_ORDER.iter().map(|c| c.as_str()).collect();
    let content = format!(
        "# Policy Not Found\n\nNo policy document exists for '{}'. Known categories: {}.",
        category,
        valid.join(", ")
    );
    PolicyDocument::from_markdown(category, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_documents() {
        let store = BuiltinPolicyStore::new();
        for category in Category::EVALUATION_ORDER {
            let doc = store.get_policy(category.as_str());
            assert_eq!(doc.category, category.as_str());
            assert!(!doc.title.is_empty());
            assert!(!doc.content.is_empty());
        }
        assert_eq!(store.get_policy("  Marketing ").title, "Marketing Communications Policy");
    }

    #[test]
    fn test_unknown_category_is_stub() {
        let doc = BuiltinPolicyStore::new().get_policy("general");
        assert_eq!(doc.category, "general");
        assert_eq!(doc.title, "Policy Not Found");
        assert!(doc.content.contains("pii"));
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("legal.md"), "# House Legal Rules\n\nAsk legal first.").unwrap();

        let store = DirectoryPolicyStore::new(dir.path());
        let legal = store.get_policy("legal");
        assert_eq!(legal.title, "House Legal Rules");
        assert!(legal.content.contains("Ask legal first."));

        // Missing file falls back to the built-in document.
        let pii = store.get_policy("pii");
        assert_eq!(pii.content, BuiltinPolicyStore::content(Category::Pii));
    }

    #[test]
    fn test_directory_ignores_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("general.md"), "# General").unwrap();

        let doc = DirectoryPolicyStore::new(dir.path()).get_policy("general");
        assert_eq!(doc.title, "Policy Not Found");
    }
}
