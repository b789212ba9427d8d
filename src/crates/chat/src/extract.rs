//! Pattern extraction of durable facts from user messages.
//!
//! The rules are deliberately shallow: a stated preference and the user's
//! name. Anything smarter (entity extraction, a dedicated model) can feed
//! the same [`ExtractedFact`] shape without touching the service.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static PREFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)I (like|prefer|love|hate|dislike) (.+)").unwrap());
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)My name is (.+)").unwrap());

/// Importance assigned to stated preferences
const PREFERENCE_IMPORTANCE: i64 = 7;

/// Importance assigned to the user's name
const NAME_IMPORTANCE: i64 = 10;

/// A fact worth keeping beyond the current exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    /// Memory key; stable across restatements so the slot is overwritten
    pub key: String,
    pub value: String,
    pub importance: i64,
}

/// Scan one user message for facts to promote into long-term memory.
pub fn extract_facts(content: &str) -> Vec<ExtractedFact> {
    let mut facts = Vec::new();

    if let Some(captures) = PREFERENCE_RE.captures(content) {
        let preference = format!("{} {}", &captures[1], &captures[2]);
        facts.push(ExtractedFact {
            key: format!("preference_{}", fingerprint(&preference)),
            value: format!("User preference: {preference}"),
            importance: PREFERENCE_IMPORTANCE,
        });
    }

    if let Some(captures) = NAME_RE.captures(content) {
        facts.push(ExtractedFact {
            key: "user_name".to_string(),
            value: format!("User's name: {}", &captures[1]),
            importance: NAME_IMPORTANCE,
        });
    }

    facts
}

/// Short stable digest so a restated preference lands on the same slot
fn fingerprint(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_extraction() {
        let facts = extract_facts("I like black coffee");

        assert_eq!(facts.len(), 1);
        assert!(facts[0].key.starts_with("preference_"));
        assert_eq!(facts[0].value, "User preference: like black coffee");
        assert_eq!(facts[0].importance, 7);
    }

    #[test]
    fn test_name_extraction_runs_to_end_of_line() {
        let facts = extract_facts("My name is Ada Lovelace, by the way");

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "user_name");
        assert_eq!(facts[0].value, "User's name: Ada Lovelace, by the way");
        assert_eq!(facts[0].importance, 10);
    }

    #[test]
    fn test_both_rules_fire_across_lines() {
        let facts = extract_facts("My name is Ada.\nI love Rust");

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].value, "User preference: love Rust");
        assert_eq!(facts[1].value, "User's name: Ada.");
    }

    #[test]
    fn test_restated_preference_keeps_its_slot() {
        let first = extract_facts("I prefer window seats");
        let second = extract_facts("honestly I prefer window seats");
        let other = extract_facts("I prefer aisle seats");

        assert_eq!(first[0].key, second[0].key);
        assert_ne!(first[0].key, other[0].key);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let facts = extract_facts("i HATE early meetings");

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "User preference: HATE early meetings");
    }

    #[test]
    fn test_plain_message_yields_nothing() {
        assert!(extract_facts("What's the weather tomorrow?").is_empty());
    }
}
