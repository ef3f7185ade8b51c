//! Tiered resolver: exact, then fuzzy, then semantic.
//!
//! Cheap deterministic tiers run first; the semantic tier only runs when
//! both miss. Every call returns a [`MatchResult`]: semantic failures
//! (backend down, build failed, timeouts) degrade to tier `none`.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use lawlink_ai::{IndexManager, Neighbor};
use lawlink_core::{CatalogSnapshot, MatchResult, ResolverConfig, normalize_reference};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::fuzzy::best_match;

/// Resolves raw references against a catalog snapshot.
pub struct Resolver {
    config: ResolverConfig,
    index: Arc<IndexManager>,
}

impl Resolver {
    pub fn new(config: ResolverConfig, index: Arc<IndexManager>) -> Self {
        Self { config, index }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Resolve one reference.
    pub async fn resolve(&self, raw: &str, snapshot: &Arc<CatalogSnapshot>) -> MatchResult {
        let key = normalize_reference(raw);
        if key.is_empty() {
            return MatchResult::none(raw);
        }

        if let Some(description) = snapshot.description(&key) {
            return MatchResult::exact(raw, &key, description);
        }

        if let Some(m) = best_match(&key, snapshot.keys(), self.config.fuzzy_cutoff) {
            if let Some(description) = snapshot.description(&m.key) {
                return MatchResult::fuzzy(raw, &m.key, m.similarity, description);
            }
        }

        if let Some(n) = self.semantic_match(&key, snapshot).await {
            if n.similarity > self.config.semantic_threshold {
                if let Some(description) = snapshot.description(&n.key) {
                    return MatchResult::semantic(raw, &n.key, n.similarity, description);
                }
            } else {
                debug!(
                    key = %key,
                    nearest = %n.key,
                    similarity = n.similarity,
                    "semantic neighbour below threshold"
                );
            }
        }

        MatchResult::none(raw)
    }

    /// Resolve a batch of references concurrently.
    ///
    /// Duplicate raw strings are resolved once; results keep the order of
    /// first occurrence.
    pub async fn resolve_all<S: AsRef<str>>(
        &self,
        refs: &[S],
        snapshot: &Arc<CatalogSnapshot>,
    ) -> ResolvedBatch {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = refs
            .iter()
            .map(AsRef::as_ref)
            .filter(|r| seen.insert(*r))
            .collect();

        let results: Vec<MatchResult> = futures::stream::iter(unique)
            .map(|raw| self.resolve(raw, snapshot))
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        debug!(
            version = snapshot.version(),
            references = results.len(),
            matched = results.iter().filter(|r| r.is_match()).count(),
            "resolved batch"
        );
        ResolvedBatch { results }
    }

    async fn semantic_match(&self, key: &str, snapshot: &Arc<CatalogSnapshot>) -> Option<Neighbor> {
        let index = self.index.index_for(snapshot).await?;
        if index.is_empty() {
            return None;
        }

        let backend = self.index.backend();
        let encoded = tokio::time::timeout(self.config.query_timeout(), backend.encode(key)).await;
        let query = match encoded {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                debug!(key, error = %e, "query encoding failed; skipping semantic tier");
                return None;
            }
            Err(_) => {
                debug!(key, "query encoding timed out; skipping semantic tier");
                return None;
            }
        };
        index.search(&query)
    }
}

/// Results of [`Resolver::resolve_all`], keyed by raw reference.
///
/// Serializes as a JSON object `{raw: {description, match_type}}` in
/// first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedBatch {
    results: Vec<MatchResult>,
}

impl ResolvedBatch {
    pub fn get(&self, raw: &str) -> Option<&MatchResult> {
        self.results.iter().find(|r| r.query == raw)
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn matched(&self) -> usize {
        self.results.iter().filter(|r| r.is_match()).count()
    }

    pub fn into_results(self) -> Vec<MatchResult> {
        self.results
    }
}

/// Collects results as given; later duplicates of a raw reference are dropped.
impl FromIterator<MatchResult> for ResolvedBatch {
    fn from_iter<I: IntoIterator<Item = MatchResult>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let results = iter
            .into_iter()
            .filter(|r| seen.insert(r.query.clone()))
            .collect();
        Self { results }
    }
}

impl<'a> IntoIterator for &'a ResolvedBatch {
    type Item = &'a MatchResult;
    type IntoIter = std::slice::Iter<'a, MatchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl Serialize for ResolvedBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for r in &self.results {
            map.serialize_entry(&r.query, &r.law_info())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lawlink_ai::HashingEmbedder;
    use lawlink_core::{IndexConfig, LawRecord, MatchTier, NO_DESCRIPTION};

    fn resolver() -> Resolver {
        resolver_with(ResolverConfig::default())
    }

    fn resolver_with(config: ResolverConfig) -> Resolver {
        let index = IndexManager::new(Arc::new(HashingEmbedder::new(128)), IndexConfig::default());
        Resolver::new(config, Arc::new(index))
    }

    fn catalog() -> Arc<CatalogSnapshot> {
        Arc::new(CatalogSnapshot::from_records(
            1,
            vec![
                LawRecord::new("Article 21", "Protection of life and liberty."),
                LawRecord::new("Section 420", "Cheating."),
            ],
        ))
    }

    #[tokio::test]
    async fn blank_reference_skips_every_tier() {
        let r = resolver();
        let result = r.resolve("   ", &catalog()).await;
        assert_eq!(result.tier, MatchTier::None);
        assert_eq!(result.query, "   ");
        assert_eq!(r.index().builds_started(), 0);
    }

    #[tokio::test]
    async fn exact_and_fuzzy_never_touch_the_index() {
        let r = resolver();
        let snap = catalog();
        assert_eq!(r.resolve("ARTICLE 21", &snap).await.tier, MatchTier::Exact);
        assert_eq!(r.resolve("Section 42O", &snap).await.tier, MatchTier::Fuzzy);
        assert_eq!(r.index().builds_started(), 0);
    }

    #[tokio::test]
    async fn unmatched_reference_is_none_with_sentinel() {
        // Cosine never exceeds 1.0, so the semantic tier cannot accept.
        let r = resolver_with(ResolverConfig {
            semantic_threshold: 1.0,
            ..ResolverConfig::default()
        });
        let result = r.resolve("Order XXXIX Rule 1", &catalog()).await;
        assert_eq!(result.tier, MatchTier::None);
        assert_eq!(result.description, NO_DESCRIPTION);
        assert_eq!(result.score, 0.0);
        assert_eq!(r.index().builds_started(), 1);
    }

    #[tokio::test]
    async fn batch_dedupes_and_keeps_order() {
        let r = resolver();
        let refs = ["Section 420", "Article 21", "Section 420", "  "];
        let batch = r.resolve_all(&refs, &catalog()).await;
        let queries: Vec<&str> = batch.iter().map(|m| m.query.as_str()).collect();
        assert_eq!(queries, vec!["Section 420", "Article 21", "  "]);
        assert_eq!(batch.matched(), 2);
        assert_eq!(batch.get("Article 21").unwrap().tier, MatchTier::Exact);
    }

    #[tokio::test]
    async fn batch_serializes_as_keyed_law_info() {
        let r = resolver();
        let batch = r.resolve_all(&["Article 21", "Section 42O"], &catalog()).await;
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["Article 21"]["match_type"], "exact");
        assert_eq!(json["Section 42O"]["match_type"], "fuzzy (section 420)");
        assert_eq!(json["Section 42O"]["description"], "Cheating.");
    }
}
