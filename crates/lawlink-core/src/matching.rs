//! Resolution outcomes handed back to the API and generation layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Description used when no tier matched.
pub const NO_DESCRIPTION: &str = "No description available.";

/// Which matching strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Fuzzy,
    Semantic,
    None,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Semantic => "semantic",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving one raw reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The reference exactly as supplied by the caller.
    pub query: String,
    pub matched_key: Option<String>,
    pub tier: MatchTier,
    /// Confidence in [0, 1]: 1.0 for exact, 0.0 for none.
    pub score: f32,
    pub description: String,
}

impl MatchResult {
    pub fn exact(query: &str, key: &str, description: &str) -> Self {
        Self::matched(query, key, MatchTier::Exact, 1.0, description)
    }

    pub fn fuzzy(query: &str, key: &str, similarity: f32, description: &str) -> Self {
        Self::matched(query, key, MatchTier::Fuzzy, similarity, description)
    }

    pub fn semantic(query: &str, key: &str, similarity: f32, description: &str) -> Self {
        Self::matched(query, key, MatchTier::Semantic, similarity, description)
    }

    pub fn none(query: &str) -> Self {
        Self {
            query: query.to_string(),
            matched_key: None,
            tier: MatchTier::None,
            score: 0.0,
            description: NO_DESCRIPTION.to_string(),
        }
    }

    fn matched(query: &str, key: &str, tier: MatchTier, score: f32, description: &str) -> Self {
        Self {
            query: query.to_string(),
            matched_key: Some(key.to_string()),
            tier,
            score: score.clamp(0.0, 1.0),
            description: description.to_string(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.tier != MatchTier::None
    }

    /// Human-readable tier label, e.g. `"fuzzy (section 420)"` or
    /// `"semantic (article 21, score=0.83)"`.
    pub fn match_type(&self) -> String {
        match (self.tier, self.matched_key.as_deref()) {
            (MatchTier::Fuzzy, Some(key)) => format!("fuzzy ({key})"),
            (MatchTier::Semantic, Some(key)) => {
                format!("semantic ({key}, score={:.2})", self.score)
            }
            (tier, _) => tier.as_str().to_string(),
        }
    }

    /// The `{description, match_type}` pair exposed over the API.
    pub fn law_info(&self) -> LawInfo {
        LawInfo {
            description: self.description.clone(),
            match_type: self.match_type(),
        }
    }
}

/// Serialized form of a [`MatchResult`] keyed by the raw reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawInfo {
    pub description: String,
    pub match_type: String,
}
