//! Lexical relevance scoring for memory retrieval
//!
//! Retrieval ranks candidates by word overlap between the query and the
//! memory's `key + value` text. This is a cheap heuristic, not a semantic
//! match: synonyms score zero and stopword-heavy queries score high. It is
//! good enough to surface obviously related memories without an embedding
//! round-trip.

use std::collections::HashSet;

/// Weight of lexical relevance in the combined ranking score
pub const RELEVANCE_WEIGHT: f64 = 0.7;

/// Weight of the stored importance score in the combined ranking score
pub const IMPORTANCE_WEIGHT: f64 = 0.3;

/// Words shorter than this never count as a relevance match
const MIN_MATCH_WORD_LEN: usize = 4;

/// Unique lowercase words of `text`
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect()
}

/// Whether any query word of at least four characters appears as a
/// substring of the memory text, case-insensitively.
///
/// Substring (not whole-word) matching lets "databases" match a memory
/// mentioning "database". Short words are ignored so that articles and
/// pronouns do not mark everything relevant.
pub fn is_relevant(query: &str, memory_text: &str) -> bool {
    let haystack = memory_text.to_lowercase();
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .any(|word| word.chars().count() >= MIN_MATCH_WORD_LEN && haystack.contains(&word))
}

/// Jaccard similarity between the word sets of the query and the memory text
pub fn relevance(query: &str, memory_text: &str) -> f64 {
    let query_words = word_set(query);
    let memory_words = word_set(memory_text);

    let intersection = query_words.intersection(&memory_words).count();
    let union = query_words.union(&memory_words).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Combined ranking score: weighted lexical relevance plus weighted importance
pub fn rank(relevance: f64, importance_score: i64) -> f64 {
    RELEVANCE_WEIGHT * relevance + IMPORTANCE_WEIGHT * importance_score as f64
}
