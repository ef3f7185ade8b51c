//! Feature-hashing embedding backend.
//!
//! Generates fixed-dimension vectors by hashing word unigrams and character
//! trigrams into buckets, weighted by term frequency. Far weaker than a
//! sentence-transformer, but deterministic and always available, which makes
//! it the offline default and the backend used in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::backend::{EmbedError, EmbeddingBackend};

/// Deterministic hashed term-frequency embeddings.
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// FNV-1a bucket for a term.
    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dim as u64) as usize
    }

    fn terms(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut terms: Vec<String> = words.iter().map(|w| format!("w:{w}")).collect();
        for w in &words {
            let chars: Vec<char> = format!("#{w}#").chars().collect();
            for tri in chars.windows(3) {
                terms.push(format!("c:{}", tri.iter().collect::<String>()));
            }
        }
        terms
    }

    /// Embed one text into an L2-normalized vector (all zeros for empty text).
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut tf: BTreeMap<String, f32> = BTreeMap::new();
        for term in Self::terms(text) {
            *tf.entry(term).or_default() += 1.0;
        }

        let mut v = vec![0.0f32; self.dim];
        for (term, count) in &tf {
            // Whole words carry more signal than trigrams.
            let weight = if term.starts_with("w:") { 2.0 } else { 1.0 };
            v[self.bucket(term)] += weight * (1.0 + count.ln());
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine_similarity;

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(64);
        let v = e.embed("");
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn unit_norm() {
        let v = HashingEmbedder::default().embed("Punishment for murder");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[test]
    fn deterministic_and_case_insensitive() {
        let e = HashingEmbedder::default();
        assert_eq!(e.embed("Article 21"), e.embed("article 21"));
    }

    #[test]
    fn overlapping_texts_are_closer() {
        let e = HashingEmbedder::default();
        let query = e.embed("punishment for murder");
        let murder = e.embed("ipc section 302 Punishment for murder.");
        let cheating = e.embed("section 420 Cheating and dishonestly inducing delivery.");
        assert!(cosine_similarity(&query, &murder) > cosine_similarity(&query, &cheating));
    }

    #[tokio::test]
    async fn encode_batch_preserves_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["a b".to_string(), "c d".to_string()];
        let out = e.encode_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], e.embed("c d"));
        assert_eq!(e.encode("a b").await.unwrap(), out[0]);
    }
}
