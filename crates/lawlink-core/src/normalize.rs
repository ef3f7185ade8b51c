//! Reference normalisation for catalog lookups.
//!
//! Converts a raw citation span as it appears in a document (e.g.,
//! "  Article 21 ", "SECTION 302") into the canonical key used by the
//! catalog, so that exact lookups are case- and padding-insensitive.
//!
//! # Rules
//!
//! - Leading and trailing whitespace is removed (Unicode whitespace).
//! - The remainder is lowercased (Unicode-aware, so "ÄRTIKEL" folds too).
//! - Interior spacing is kept as-is: "section  302" and "section 302" are
//!   different keys and are left to the fuzzy tier.

/// Normalise a raw reference into a catalog key.
///
/// Input: raw span like "  Article 21 ", "IPC Section 302"
/// Output: "article 21", "ipc section 302"
///
/// Whitespace-only input yields an empty key, which callers treat as
/// unmatchable.
pub fn normalize_reference(raw: &str) -> String {
    raw.trim().to_lowercase()
}
