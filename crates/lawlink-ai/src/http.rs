//! HTTP embedding backend for a text-embeddings inference server.
//!
//! Speaks the `POST /embed` protocol: request `{"inputs": [...]}`, response a
//! JSON array with one vector per input.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::backend::{EmbedError, EmbeddingBackend};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
}

/// Remote embedding backend.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// `base_url` should be like `http://localhost:8080` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn embed_url(&self) -> String {
        format!("{}/embed", self.base_url)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = self.embed_url();
        debug!(url = %url, count = texts.len(), "requesting embeddings");

        let body = EmbedRequest {
            inputs: texts,
            normalize: true,
        };
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let vectors: Vec<Vec<f32>> = resp.json().await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}
