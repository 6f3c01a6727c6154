//! Dedup registry — three exclusion sets over normalized
//! question text. Hard rejection on session/lifetime matches; the prompt
//! hint set is advisory only, handed to the LLM as a "don't repeat these".

use std::collections::HashSet;

/// Lowercases and collapses internal whitespace, matching the
/// normalization idiom (`split_whitespace().join(" ")`).
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Accept,
    RejectSessionDuplicate,
    RejectLifetimeDuplicate,
}

#[derive(Clone)]
pub struct DedupRegistry {
    session_texts: HashSet<String>,
    lifetime_correct_texts: HashSet<String>,
}

impl DedupRegistry {
    pub fn new(session_texts: HashSet<String>, lifetime_correct_texts: HashSet<String>) -> Self {
        Self {
            session_texts,
            lifetime_correct_texts,
        }
    }

    /// Checks `content` against the session and lifetime-correct sets. Does
    /// not mutate state — callers register acceptance explicitly via
    /// `register_session_item`.
    pub fn check(&self, content: &str) -> DedupVerdict {
        let normalized = normalize_text(content);
        if self.session_texts.contains(&normalized) {
            return DedupVerdict::RejectSessionDuplicate;
        }
        if self.lifetime_correct_texts.contains(&normalized) {
            return DedupVerdict::RejectLifetimeDuplicate;
        }
        DedupVerdict::Accept
    }

    /// Marks `content` as shown in this session, including the current
    /// unanswered item, so a subsequent regeneration within the same turn
    /// cannot repeat it.
    pub fn register_session_item(&mut self, content: &str) {
        self.session_texts.insert(normalize_text(content));
    }

    /// Advisory hint list for the LLM prompt: union of session and
    /// lifetime-correct sets.
    pub fn prompt_hints(&self) -> Vec<String> {
        self.session_texts
            .iter()
            .chain(self.lifetime_correct_texts.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        assert_eq!(normalize_text("  What   IS\t2+2?  "), "what is 2+2?");
    }

    #[test]
    fn rejects_session_duplicate() {
        let mut session = HashSet::new();
        session.insert(normalize_text("What is 2+2?"));
        let registry = DedupRegistry::new(session, HashSet::new());
        assert_eq!(registry.check("what is 2+2?"), DedupVerdict::RejectSessionDuplicate);
    }

    #[test]
    fn rejects_lifetime_duplicate() {
        let mut lifetime = HashSet::new();
        lifetime.insert(normalize_text("What is 3+3?"));
        let registry = DedupRegistry::new(HashSet::new(), lifetime);
        assert_eq!(registry.check("What is 3+3?"), DedupVerdict::RejectLifetimeDuplicate);
    }

    #[test]
    fn accepts_novel_question() {
        let registry = DedupRegistry::new(HashSet::new(), HashSet::new());
        assert_eq!(registry.check("What is 5+5?"), DedupVerdict::Accept);
    }

    #[test]
    fn registering_current_item_blocks_its_own_regeneration() {
        let mut registry = DedupRegistry::new(HashSet::new(), HashSet::new());
        registry.register_session_item("What is 5+5?");
        assert_eq!(registry.check("what is 5+5?"), DedupVerdict::RejectSessionDuplicate);
    }

    #[test]
    fn prompt_hints_are_union_of_both_sets() {
        let mut session = HashSet::new();
        session.insert("a".to_string());
        let mut lifetime = HashSet::new();
        lifetime.insert("b".to_string());
        let registry = DedupRegistry::new(session, lifetime);
        let mut hints = registry.prompt_hints();
        hints.sort();
        assert_eq!(hints, vec!["a".to_string(), "b".to_string()]);
    }
}
