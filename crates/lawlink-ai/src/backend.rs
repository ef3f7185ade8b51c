//! The seam between the resolver and whatever produces embeddings.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("inference failed: {0}")]
    Inference(#[from] anyhow::Error),

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("inconsistent embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Text embedding backend.
///
/// Backends may be slow (model inference, network) or unavailable; callers
/// must treat every error as "no semantic coverage" rather than a fault.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbedError::CountMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}
