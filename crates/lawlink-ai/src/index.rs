//! Flat cosine-similarity index over one catalog snapshot.

use std::time::Instant;

use lawlink_core::CatalogSnapshot;
use tracing::{debug, info};

use crate::backend::{EmbedError, EmbeddingBackend};

/// Nearest catalog key to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub key: String,
    pub similarity: f32,
}

/// Immutable embedding index tagged with the catalog version it was built from.
///
/// `keys[i]` and `vectors[i]` describe the same record. Vectors are stored
/// L2-normalized, so a search is one dot product per record.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    version: u64,
    keys: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl EmbeddingIndex {
    /// An index with no entries; every search returns `None`.
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            keys: Vec::new(),
            vectors: Vec::new(),
            dim: 0,
        }
    }

    /// Assemble an index from parallel key/vector arrays.
    pub fn from_parts(
        version: u64,
        keys: Vec<String>,
        mut vectors: Vec<Vec<f32>>,
    ) -> Result<Self, EmbedError> {
        if keys.len() != vectors.len() {
            return Err(EmbedError::CountMismatch {
                expected: keys.len(),
                actual: vectors.len(),
            });
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        for v in &mut vectors {
            if v.len() != dim {
                return Err(EmbedError::DimensionMismatch {
                    expected: dim,
                    actual: v.len(),
                });
            }
            normalize(v);
        }
        Ok(Self {
            version,
            keys,
            vectors,
            dim,
        })
    }

    /// Embed every record of `snapshot` (key and description together) and
    /// build the index, calling the backend in chunks of `batch_size`.
    pub async fn build(
        snapshot: &CatalogSnapshot,
        backend: &dyn EmbeddingBackend,
        batch_size: usize,
    ) -> Result<Self, EmbedError> {
        let start = Instant::now();
        let version = snapshot.version();
        if snapshot.is_empty() {
            return Ok(Self::empty(version));
        }

        let keys: Vec<String> = snapshot.keys().map(str::to_string).collect();
        let texts: Vec<String> = snapshot.records().map(|r| r.embedding_text()).collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            let embedded = backend.encode_batch(chunk).await?;
            if embedded.len() != chunk.len() {
                return Err(EmbedError::CountMismatch {
                    expected: chunk.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
            debug!(version, done = vectors.len(), total = texts.len(), "embedded chunk");
        }

        let index = Self::from_parts(version, keys, vectors)?;
        info!(
            version,
            records = index.len(),
            dim = index.dim,
            backend = backend.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built embedding index"
        );
        Ok(index)
    }

    /// Catalog version this index represents.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Embedding dimensionality (0 for an empty index).
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Single nearest neighbour by cosine similarity.
    ///
    /// Returns `None` for an empty index, a zero query, or a query of the
    /// wrong dimension. Equal similarities keep the earlier (lexicographically
    /// smaller) key.
    pub fn search(&self, query: &[f32]) -> Option<Neighbor> {
        if self.is_empty() || query.len() != self.dim {
            return None;
        }
        let q_norm = l2_norm(query);
        if q_norm <= f32::EPSILON {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, v) in self.vectors.iter().enumerate() {
            let sim = dot(query, v) / q_norm;
            if best.is_none_or(|(_, b)| sim > b) {
                best = Some((i, sim));
            }
        }

        best.map(|(i, similarity)| Neighbor {
            key: self.keys[i].clone(),
            similarity: similarity.clamp(-1.0, 1.0),
        })
    }
}

/// Cosine similarity of two vectors; 0.0 if either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = l2_norm(a) * l2_norm(b);
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / denom
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
