use std::sync::Arc;

use lawlink_ai::{EmbeddingBackend, IndexManager, IndexState};
use lawlink_core::{EngineConfig, MatchResult};
use lawlink_store::CatalogStore;
use tracing::info;

use crate::context::{build_context, legal_context_section};
use crate::resolver::{ResolvedBatch, Resolver};

/// Engine facade: a live catalog plus a resolver over its snapshots.
///
/// Every call pins the catalog snapshot current at entry, so a catalog
/// update mid-batch never mixes versions within one response.
pub struct LawLink {
    store: Arc<CatalogStore>,
    resolver: Resolver,
}

impl LawLink {
    pub fn new(store: Arc<CatalogStore>, backend: Arc<dyn EmbeddingBackend>, config: EngineConfig) -> Self {
        let index = Arc::new(IndexManager::new(backend, config.index));
        Self {
            store,
            resolver: Resolver::new(config.resolver, index),
        }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn index_state(&self) -> IndexState {
        self.resolver.index().state()
    }

    pub async fn resolve(&self, raw: &str) -> MatchResult {
        let snapshot = self.store.snapshot();
        self.resolver.resolve(raw, &snapshot).await
    }

    /// Resolve a batch; serializes as `{raw: {description, match_type}}`.
    pub async fn law_info<S: AsRef<str>>(&self, refs: &[S]) -> ResolvedBatch {
        let snapshot = self.store.snapshot();
        self.resolver.resolve_all(refs, &snapshot).await
    }

    /// Resolve a batch and render the "Relevant Legal Context" prompt
    /// section; empty when nothing matched.
    pub async fn context_text<S: AsRef<str>>(&self, refs: &[S], top_k: Option<usize>) -> String {
        let batch = self.law_info(refs).await;
        let top_k = top_k.unwrap_or(self.resolver.config().context_top_k);
        legal_context_section(&build_context(&batch, top_k))
    }

    /// Build the semantic index for the current catalog ahead of the first query.
    pub async fn warm(&self) -> IndexState {
        let snapshot = self.store.snapshot();
        let index = self.resolver.index().index_for(&snapshot).await;
        let state = self.index_state();
        info!(
            version = snapshot.version(),
            entries = index.as_ref().map_or(0, |i| i.len()),
            state = ?state,
            "semantic index warmed"
        );
        state
    }
}
