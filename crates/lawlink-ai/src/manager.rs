//! Lazily-built, versioned embedding index with single-flight rebuilds.
//!
//! The manager publishes at most one "ready" index: the newest version it
//! has built. A query for a catalog version with no built index starts a
//! build, and every concurrent query for the same version awaits that same
//! build instead of starting its own. Builds run on their own tokio task,
//! outside any lock, so readers of the previous index are never blocked. A
//! finished build is published by swapping an `Arc`; a query that already
//! holds the old index keeps using it until it completes.
//!
//! Indexes for the last `RETAINED_VERSIONS` built versions are kept, so a
//! query pinned to an older snapshot reuses its index instead of
//! re-embedding the catalog. An older build finishing late is kept for its
//! version but never published over a newer one.
//!
//! A build that fails or exceeds the time budget marks its version as
//! failed. Queries for a failed version get no semantic coverage and do not
//! retry; the next catalog version, or [`IndexManager::reset`], retries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lawlink_core::{CatalogSnapshot, IndexConfig};
use tracing::{debug, info, warn};

use crate::backend::EmbeddingBackend;
use crate::index::{EmbeddingIndex, Neighbor};

/// Observable lifecycle of the managed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No index has been built yet.
    Empty,
    /// A build for this catalog version is in flight.
    Building(u64),
    /// A complete index for this version is published.
    Ready(u64),
    /// The most recent build, for this version, failed or timed out.
    Failed(u64),
}

/// Built versions kept for snapshots that are still pinned by callers.
const RETAINED_VERSIONS: usize = 4;

type BuildOutcome = Option<Arc<EmbeddingIndex>>;
type BuildHandle = Shared<BoxFuture<'static, BuildOutcome>>;

#[derive(Default)]
struct Inner {
    /// Finished indexes by version; the last entry is the published one.
    built: BTreeMap<u64, Arc<EmbeddingIndex>>,
    failed: BTreeSet<u64>,
    in_flight: HashMap<u64, BuildHandle>,
    builds_started: u64,
}

impl Inner {
    fn ready(&self) -> Option<&Arc<EmbeddingIndex>> {
        self.built.last_key_value().map(|(_, index)| index)
    }

    /// Record a finished build. Never replaces a ready index with an older one.
    fn finish(&mut self, version: u64, outcome: &BuildOutcome) {
        self.in_flight.remove(&version);
        match outcome {
            Some(index) => {
                if self.built.last_key_value().is_some_and(|(&v, _)| v > version) {
                    debug!(version, "built index superseded by a newer one; kept but not published");
                }
                self.failed.remove(&version);
                self.built.insert(version, Arc::clone(index));
                while self.built.len() > RETAINED_VERSIONS {
                    self.built.pop_first();
                }
            }
            None => {
                self.failed.insert(version);
                while self.failed.len() > RETAINED_VERSIONS {
                    self.failed.pop_first();
                }
            }
        }
    }
}

/// Owner of the semantic index; share it between resolvers with an `Arc`.
pub struct IndexManager {
    backend: Arc<dyn EmbeddingBackend>,
    config: IndexConfig,
    inner: Arc<Mutex<Inner>>,
}

impl IndexManager {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: IndexConfig) -> Self {
        Self {
            backend,
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// The backend used for builds; resolvers encode queries with the same one.
    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state. An in-flight build takes precedence, then a
    /// failure newer than the ready index.
    pub fn state(&self) -> IndexState {
        let inner = self.lock();
        if let Some(&version) = inner.in_flight.keys().max() {
            return IndexState::Building(version);
        }
        let ready = inner.ready().map(|r| r.version());
        match (ready, inner.failed.last().copied()) {
            (Some(r), Some(f)) if f > r => IndexState::Failed(f),
            (Some(r), _) => IndexState::Ready(r),
            (None, Some(f)) => IndexState::Failed(f),
            (None, None) => IndexState::Empty,
        }
    }

    /// The published index, if any, whatever its version.
    pub fn current(&self) -> Option<Arc<EmbeddingIndex>> {
        self.lock().ready().cloned()
    }

    /// Number of builds started over the manager's lifetime.
    pub fn builds_started(&self) -> u64 {
        self.lock().builds_started
    }

    /// Forget recorded failures so the next query for those versions retries.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let Some(&latest) = inner.failed.last() {
            info!(
                latest,
                versions = inner.failed.len(),
                "cleared failed embedding indexes; next query will rebuild"
            );
            inner.failed.clear();
        }
    }

    /// The index for exactly `snapshot`'s version, building it if needed.
    ///
    /// Returns `None` when the version's build failed or timed out.
    pub async fn index_for(&self, snapshot: &Arc<CatalogSnapshot>) -> Option<Arc<EmbeddingIndex>> {
        let version = snapshot.version();
        let build = {
            let mut inner = self.lock();
            if let Some(index) = inner.built.get(&version) {
                return Some(Arc::clone(index));
            }
            if inner.failed.contains(&version) {
                debug!(version, "embedding index unavailable for this catalog version");
                return None;
            }
            match inner.in_flight.get(&version) {
                Some(build) => build.clone(),
                None => {
                    let build = self.spawn_build(Arc::clone(snapshot));
                    inner.in_flight.insert(version, build.clone());
                    inner.builds_started += 1;
                    build
                }
            }
        };
        build.await
    }

    /// Nearest catalog key to `query` within `snapshot`'s index.
    pub async fn search(&self, query: &[f32], snapshot: &Arc<CatalogSnapshot>) -> Option<Neighbor> {
        self.index_for(snapshot).await?.search(query)
    }

    fn spawn_build(&self, snapshot: Arc<CatalogSnapshot>) -> BuildHandle {
        let version = snapshot.version();
        let backend = Arc::clone(&self.backend);
        let inner = Arc::clone(&self.inner);
        let timeout = self.config.build_timeout();
        let batch_size = self.config.batch_size;

        info!(version, records = snapshot.len(), backend = backend.name(), "building embedding index");
        let task_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let start = Instant::now();
            let built = tokio::time::timeout(
                timeout,
                EmbeddingIndex::build(&snapshot, backend.as_ref(), batch_size),
            )
            .await;
            let outcome = match built {
                Ok(Ok(index)) => Some(Arc::new(index)),
                Ok(Err(e)) => {
                    warn!(version, error = %e, "embedding index build failed; semantic matching disabled for this catalog version");
                    None
                }
                Err(_) => {
                    warn!(
                        version,
                        timeout_ms = timeout.as_millis() as u64,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "embedding index build timed out; semantic matching disabled for this catalog version"
                    );
                    None
                }
            };
            task_inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finish(version, &outcome);
            outcome
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(version, error = %e, "embedding index build task aborted");
                    let outcome = None;
                    inner
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .finish(version, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmbedError;
    use crate::HashingEmbedder;
    use async_trait::async_trait;
    use lawlink_core::LawRecord;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hashing backend that counts calls and can be slowed down or switched off.
    struct CountingBackend {
        inner: HashingEmbedder,
        batch_calls: AtomicUsize,
        delay: Duration,
        available: AtomicBool,
    }

    impl CountingBackend {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: HashingEmbedder::new(64),
                batch_calls: AtomicUsize::new(0),
                delay,
                available: AtomicBool::new(true),
            })
        }

        fn calls(&self) -> usize {
            self.batch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if !self.available.load(Ordering::SeqCst) {
                return Err(EmbedError::Unavailable {
                    backend: "counting".into(),
                    reason: "switched off".into(),
                });
            }
            self.inner.encode_batch(texts).await
        }
    }

    fn snapshot(version: u64, laws: &[(&str, &str)]) -> Arc<CatalogSnapshot> {
        Arc::new(CatalogSnapshot::from_records(
            version,
            laws.iter().map(|(k, d)| LawRecord::new(k, d)),
        ))
    }

    fn manager(backend: Arc<CountingBackend>, build_timeout_ms: u64) -> Arc<IndexManager> {
        let config = IndexConfig {
            build_timeout_ms,
            batch_size: 256,
        };
        Arc::new(IndexManager::new(backend, config))
    }

    #[tokio::test]
    async fn lazy_build_then_reuse() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let snap = snapshot(1, &[("article 21", "Life.")]);

        assert_eq!(mgr.state(), IndexState::Empty);
        assert_eq!(backend.calls(), 0);

        let first = mgr.index_for(&snap).await.unwrap();
        assert_eq!(first.version(), 1);
        assert_eq!(mgr.state(), IndexState::Ready(1));

        let second = mgr.index_for(&snap).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.calls(), 1);
        assert_eq!(mgr.builds_started(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cold_queries_share_one_build() {
        let backend = CountingBackend::new(Duration::from_millis(100));
        let mgr = manager(backend.clone(), 5_000);
        let snap = snapshot(1, &[("article 21", "Life."), ("section 420", "Cheating.")]);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                let snap = Arc::clone(&snap);
                tokio::spawn(async move { mgr.index_for(&snap).await })
            })
            .collect();

        let mut indexes = Vec::new();
        for t in tasks {
            indexes.push(t.await.unwrap().unwrap());
        }

        assert_eq!(backend.calls(), 1, "expected exactly one backend build");
        assert_eq!(mgr.builds_started(), 1);
        assert!(indexes.iter().all(|i| Arc::ptr_eq(i, &indexes[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_reports_building_while_in_flight() {
        let backend = CountingBackend::new(Duration::from_millis(200));
        let mgr = manager(backend, 5_000);
        let snap = snapshot(4, &[("article 21", "Life.")]);

        let waiter = {
            let mgr = Arc::clone(&mgr);
            let snap = Arc::clone(&snap);
            tokio::spawn(async move { mgr.index_for(&snap).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mgr.state(), IndexState::Building(4));
        assert!(waiter.await.unwrap().is_some());
        assert_eq!(mgr.state(), IndexState::Ready(4));
    }

    #[tokio::test]
    async fn new_version_rebuilds_and_old_index_stays_intact() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let v1 = snapshot(1, &[("article 21", "Life.")]);
        let v2 = snapshot(2, &[("article 21", "Life."), ("section 420", "Cheating.")]);

        let old = mgr.index_for(&v1).await.unwrap();
        let new = mgr.index_for(&v2).await.unwrap();

        assert_eq!(old.version(), 1);
        assert_eq!(old.len(), 1);
        assert_eq!(new.version(), 2);
        assert_eq!(new.len(), 2);
        assert_eq!(mgr.state(), IndexState::Ready(2));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn older_build_is_not_published_over_newer() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let v1 = snapshot(1, &[("article 21", "Life.")]);
        let v2 = snapshot(2, &[("section 420", "Cheating.")]);

        mgr.index_for(&v2).await.unwrap();
        let stale = mgr.index_for(&v1).await.unwrap();

        assert_eq!(stale.version(), 1);
        assert_eq!(mgr.current().unwrap().version(), 2);
        assert_eq!(mgr.state(), IndexState::Ready(2));

        // The late v1 build is kept for queries still pinned to v1.
        let again = mgr.index_for(&v1).await.unwrap();
        assert!(Arc::ptr_eq(&stale, &again));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn older_version_is_built_once() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let v1 = snapshot(1, &[("article 21", "Life.")]);
        let v2 = snapshot(2, &[("article 21", "Life."), ("section 420", "Cheating.")]);

        mgr.index_for(&v1).await.unwrap();
        mgr.index_for(&v2).await.unwrap();
        for _ in 0..5 {
            let idx = mgr.index_for(&v1).await.unwrap();
            assert_eq!(idx.version(), 1);
            assert_eq!(idx.len(), 1);
        }

        assert_eq!(mgr.builds_started(), 2);
        assert_eq!(backend.calls(), 2);
        assert_eq!(mgr.state(), IndexState::Ready(2));
    }

    #[tokio::test]
    async fn oldest_versions_are_evicted() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let snaps: Vec<_> = (1..=RETAINED_VERSIONS as u64 + 1)
            .map(|v| snapshot(v, &[("article 21", "Life.")]))
            .collect();

        for snap in &snaps {
            mgr.index_for(snap).await.unwrap();
        }
        let started = mgr.builds_started();

        // Every retained version is served from memory; the oldest rebuilds.
        for snap in &snaps[1..] {
            mgr.index_for(snap).await.unwrap();
        }
        assert_eq!(mgr.builds_started(), started);
        mgr.index_for(&snaps[0]).await.unwrap();
        assert_eq!(mgr.builds_started(), started + 1);
        assert_eq!(mgr.current().unwrap().version(), RETAINED_VERSIONS as u64 + 1);
    }

    #[tokio::test]
    async fn failure_is_sticky_until_reset() {
        let backend = CountingBackend::new(Duration::ZERO);
        backend.available.store(false, Ordering::SeqCst);
        let mgr = manager(backend.clone(), 5_000);
        let snap = snapshot(1, &[("article 21", "Life.")]);

        assert!(mgr.index_for(&snap).await.is_none());
        assert_eq!(mgr.state(), IndexState::Failed(1));

        // No retry on subsequent queries for the same version.
        assert!(mgr.index_for(&snap).await.is_none());
        assert_eq!(backend.calls(), 1);

        backend.available.store(true, Ordering::SeqCst);
        mgr.reset();
        assert!(mgr.index_for(&snap).await.is_some());
        assert_eq!(mgr.state(), IndexState::Ready(1));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_remembered_per_version() {
        let backend = CountingBackend::new(Duration::ZERO);
        backend.available.store(false, Ordering::SeqCst);
        let mgr = manager(backend.clone(), 5_000);
        let v1 = snapshot(1, &[("article 21", "Life.")]);
        let v2 = snapshot(2, &[("section 420", "Cheating.")]);

        assert!(mgr.index_for(&v1).await.is_none());
        assert!(mgr.index_for(&v2).await.is_none());
        assert_eq!(mgr.state(), IndexState::Failed(2));

        // v1 still counts as failed after v2 failed too.
        assert!(mgr.index_for(&v1).await.is_none());
        assert_eq!(mgr.builds_started(), 2);
        assert_eq!(backend.calls(), 2);

        backend.available.store(true, Ordering::SeqCst);
        mgr.reset();
        assert!(mgr.index_for(&v1).await.is_some());
        assert!(mgr.index_for(&v2).await.is_some());
        assert_eq!(mgr.state(), IndexState::Ready(2));
        assert_eq!(mgr.builds_started(), 4);
    }

    #[tokio::test]
    async fn failure_retried_on_version_bump() {
        let backend = CountingBackend::new(Duration::ZERO);
        backend.available.store(false, Ordering::SeqCst);
        let mgr = manager(backend.clone(), 5_000);

        assert!(mgr.index_for(&snapshot(1, &[("a", "b")])).await.is_none());
        backend.available.store(true, Ordering::SeqCst);
        assert!(mgr.index_for(&snapshot(2, &[("a", "b")])).await.is_some());
        assert_eq!(mgr.state(), IndexState::Ready(2));
    }

    #[tokio::test]
    async fn build_timeout_marks_failed() {
        let backend = CountingBackend::new(Duration::from_millis(500));
        let mgr = manager(backend.clone(), 20);
        let snap = snapshot(3, &[("article 21", "Life.")]);

        assert!(mgr.index_for(&snap).await.is_none());
        assert_eq!(mgr.state(), IndexState::Failed(3));
        assert!(mgr.index_for(&snap).await.is_none());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_index() {
        let backend = CountingBackend::new(Duration::ZERO);
        let mgr = manager(backend.clone(), 5_000);
        let snap = snapshot(1, &[]);

        let idx = mgr.index_for(&snap).await.unwrap();
        assert!(idx.is_empty());
        assert!(mgr.search(&[1.0; 64], &snap).await.is_none());
        assert_eq!(backend.calls(), 0);
    }
}
