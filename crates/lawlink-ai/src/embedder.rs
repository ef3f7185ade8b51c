//! ONNX Runtime embedding pipeline for sentence-transformers models.
//!
//! Implements mean-pooled embeddings using all-MiniLM-L6-v2 (384 dimensions).
//! The model directory must contain `model.onnx` and `tokenizer.json`.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::backend::{EmbedError, EmbeddingBackend};

/// Sentence embedding generator using ONNX Runtime.
///
/// Produces L2-normalized embeddings suitable for cosine similarity search.
/// Inference needs `&mut self`; share it through [`OnnxBackend`].
pub struct Embedder {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        // MiniLM was trained with 256-token inputs; law descriptions rarely exceed it.
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 256,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            session,
            tokenizer,
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed a batch of texts, returning one normalized vector per input.
    pub fn embed_batch(&mut self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let batch_size = texts.len();

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        // Flat [batch_size, seq_len] inputs.
        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * seq_len;
            let ids = encoding.get_ids().iter();
            let mask = encoding.get_attention_mask().iter();
            let types = encoding.get_type_ids().iter();
            for (j, ((&id, &m), &t)) in ids.zip(mask).zip(types).enumerate() {
                input_ids[offset + j] = id as i64;
                attention_mask[offset + j] = m as i64;
                token_type_ids[offset + j] = t as i64;
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_tensor,
        ])?;

        // Token embeddings: [batch_size, seq_len, dim].
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == batch_size && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [{batch_size}, {seq_len}, {}]",
            self.dim
        );
        let actual_seq_len = dims[1] as usize;

        Ok((0..batch_size)
            .map(|i| {
                mean_pool(
                    &output_data,
                    &attention_mask[i * seq_len..(i + 1) * seq_len],
                    i,
                    actual_seq_len,
                    self.dim,
                )
            })
            .collect())
    }
}

/// Attention-masked mean of one sequence's token embeddings, L2-normalized.
fn mean_pool(data: &[f32], mask: &[i64], row: usize, seq_len: usize, dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut tokens = 0.0f32;
    for (j, &m) in mask.iter().take(seq_len).enumerate() {
        if m > 0 {
            let offset = (row * seq_len + j) * dim;
            for (d, p) in pooled.iter_mut().enumerate() {
                *p += data[offset + d];
            }
            tokens += 1.0;
        }
    }
    if tokens > 0.0 {
        for p in &mut pooled {
            *p /= tokens;
        }
    }
    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for p in &mut pooled {
            *p /= norm;
        }
    }
    pooled
}

/// Try to infer the embedding dimension from the ONNX model output type.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

/// [`EmbeddingBackend`] over a local ONNX model.
///
/// Inference is CPU-bound and blocking, so it runs on tokio's blocking pool.
/// The session is serialised behind a mutex.
#[derive(Clone)]
pub struct OnnxBackend {
    embedder: Arc<Mutex<Embedder>>,
    dim: usize,
}

impl OnnxBackend {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let embedder = Embedder::load(model_dir)?;
        let dim = embedder.dim();
        Ok(Self {
            embedder: Arc::new(Mutex::new(embedder)),
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let embedder = Arc::clone(&self.embedder);
        let texts = texts.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            let mut embedder = embedder.lock().unwrap_or_else(PoisonError::into_inner);
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        })
        .await
        .map_err(|e| EmbedError::Unavailable {
            backend: "onnx".into(),
            reason: e.to_string(),
        })?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine_similarity;
    use std::path::PathBuf;

    fn model_dir() -> Option<PathBuf> {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("all-MiniLM-L6-v2");
        if dir.join("model.onnx").exists() {
            Some(dir)
        } else {
            eprintln!(
                "skipping: model not found. Download from HuggingFace:\n  \
                 curl -L -o models/all-MiniLM-L6-v2/model.onnx \
                 https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx"
            );
            None
        }
    }

    #[test]
    fn mean_pool_ignores_padding() {
        // One row, three positions, dim 2; the last position is padding.
        let data = [1.0, 0.0, 3.0, 0.0, 100.0, 100.0];
        let v = mean_pool(&data, &[1, 1, 0], 0, 3, 2);
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn load_missing_dir_errors() {
        assert!(Embedder::load(Path::new("/nonexistent/model")).is_err());
    }

    #[tokio::test]
    async fn legal_texts_rank_sensibly() {
        let Some(dir) = model_dir() else { return };
        let backend = OnnxBackend::load(&dir).unwrap();
        assert_eq!(backend.dim(), 384);

        let vecs = backend
            .encode_batch(&[
                "ipc section 302 Punishment for murder.".to_string(),
                "section 420 Cheating and dishonestly inducing delivery of property.".to_string(),
            ])
            .await
            .unwrap();
        let query = backend.encode("murder punishment clause").await.unwrap();

        let norm: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
        assert!(cosine_similarity(&query, &vecs[0]) > cosine_similarity(&query, &vecs[1]));
    }

    #[tokio::test]
    async fn empty_batch() {
        let Some(dir) = model_dir() else { return };
        let backend = OnnxBackend::load(&dir).unwrap();
        assert!(backend.encode_batch(&[]).await.unwrap().is_empty());
    }
}
