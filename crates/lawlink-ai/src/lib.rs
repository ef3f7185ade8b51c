//! Embedding layer: pluggable backends, the per-version embedding index, and
//! the manager that builds it lazily and at most once per catalog version.

mod backend;
pub use backend::{EmbedError, EmbeddingBackend};

mod hashing;
pub use hashing::HashingEmbedder;

mod index;
pub use index::{EmbeddingIndex, Neighbor, cosine_similarity};

mod manager;
pub use manager::{IndexManager, IndexState};

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::{Embedder, OnnxBackend};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpBackend;
