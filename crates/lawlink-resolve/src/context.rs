//! Retrieval context for downstream generation.

use lawlink_core::MatchResult;

const CONTEXT_HEADER: &str = "\nRelevant Legal Context:\n";

/// Join the descriptions of the first `top_k` matched results.
///
/// Unmatched results are skipped. Input order (document order) is kept
/// rather than re-sorting by score. An empty string means "no context".
pub fn build_context<'a>(results: impl IntoIterator<Item = &'a MatchResult>, top_k: usize) -> String {
    results
        .into_iter()
        .filter(|r| r.is_match())
        .take(top_k)
        .map(|r| r.description.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prompt section wrapping a context passage; empty when there is no context.
pub fn legal_context_section(passage: &str) -> String {
    if passage.is_empty() {
        String::new()
    } else {
        format!("{CONTEXT_HEADER}{passage}")
    }
}
