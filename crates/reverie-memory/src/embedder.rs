// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapters.
//!
//! [`OnnxEmbedder`] runs a sentence-transformer ONNX model on CPU.
//! [`LazyEmbedder`] defers building the real embedder until the first
//! non-blank text arrives, builds it exactly once even under concurrent
//! callers, and then shares it read-only.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use reverie_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    ReverieError,
};

use crate::model_manager::ModelManager;

/// ONNX-based embedding adapter (all-MiniLM-L6-v2 by default).
///
/// All inference runs on CPU with a single intra-op thread.
pub struct OnnxEmbedder {
    /// ONNX Runtime session (not Sync, wrapped in Mutex).
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    dimensions: usize,
}

// Safety: Session is only reached through the Mutex. The tokenizer is
// read-only after construction.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Load the model and tokenizer from disk.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        dimensions: usize,
    ) -> Result<Self, ReverieError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            ReverieError::embedding(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| ReverieError::embedding(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ReverieError::embedding(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| ReverieError::embedding(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                ReverieError::embedding(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    /// Embed one text. Blank text yields an empty vector without inference.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ReverieError::embedding(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();

        let tensor = |name: &str, data: Vec<i64>| {
            Array2::from_shape_vec((1, seq_len), data).map_err(|e| {
                ReverieError::embedding(format!("failed to shape {name} tensor: {e}"))
            })
        };
        let input_ids_array = tensor("input_ids", input_ids)?;
        let attention_mask_array = tensor("attention_mask", attention_mask.clone())?;
        let token_type_ids_array = tensor("token_type_ids", token_type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ReverieError::Internal(format!("ONNX session lock poisoned: {e}")))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array).map_err(|e| {
            ReverieError::embedding(format!("failed to create input_ids tensor view: {e}"))
        })?;
        let attention_mask_tensor =
            TensorRef::from_array_view(&attention_mask_array).map_err(|e| {
                ReverieError::embedding(format!("failed to create attention_mask tensor view: {e}"))
            })?;
        let token_type_ids_tensor =
            TensorRef::from_array_view(&token_type_ids_array).map_err(|e| {
                ReverieError::embedding(format!("failed to create token_type_ids tensor view: {e}"))
            })?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| ReverieError::embedding(format!("ONNX inference failed: {e}")))?;

        // Output shape: [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ReverieError::embedding(format!("failed to extract output tensor: {e}")))?;
        let hidden_size = shape[shape.len() - 1] as usize;
        if hidden_size != self.dimensions {
            return Err(ReverieError::embedding(format!(
                "model produced {hidden_size}-dim output, expected {}",
                self.dimensions
            )));
        }

        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);
        Ok(l2_normalize(&pooled))
    }
}

/// Attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (token, _) in attention_mask
        .iter()
        .enumerate()
        .take(seq_len)
        .filter(|(_, m)| **m > 0)
    {
        let row = &embeddings[token * hidden_size..(token + 1) * hidden_size];
        for (acc, value) in sum.iter_mut().zip(row) {
            *acc += value;
        }
        count += 1.0;
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|v| *v /= count);
    }
    sum
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        match self.session.lock() {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("session lock poisoned: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        let embeddings = input
            .texts
            .iter()
            .map(|text| self.embed_text(text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Builds the real embedder on first use.
#[async_trait]
pub trait EmbedderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn EmbeddingAdapter>, ReverieError>;
}

/// Factory that downloads (if needed) and loads the ONNX model.
pub struct OnnxFactory {
    manager: ModelManager,
    dimensions: usize,
}

impl OnnxFactory {
    pub fn new(manager: ModelManager, dimensions: usize) -> Self {
        Self {
            manager,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbedderFactory for OnnxFactory {
    async fn create(&self) -> Result<Arc<dyn EmbeddingAdapter>, ReverieError> {
        let model_path: PathBuf = self.manager.ensure_model().await?;
        let tokenizer_path = self.manager.tokenizer_path();
        let dimensions = self.dimensions;

        let embedder = tokio::task::spawn_blocking(move || {
            OnnxEmbedder::load(&model_path, &tokenizer_path, dimensions)
        })
        .await
        .map_err(|e| ReverieError::Internal(format!("embedder load task failed: {e}")))??;

        info!(dimensions, "ONNX embedder loaded");
        Ok(Arc::new(embedder))
    }
}

/// Lazily-initialized, shared embedding handle.
///
/// Blank texts map to empty vectors and never trigger initialization.
/// Every non-empty output is checked against the configured dimension.
pub struct LazyEmbedder {
    factory: Box<dyn EmbedderFactory>,
    dimensions: usize,
    inner: OnceCell<Arc<dyn EmbeddingAdapter>>,
}

impl LazyEmbedder {
    pub fn new(factory: impl EmbedderFactory + 'static, dimensions: usize) -> Self {
        Self {
            factory: Box::new(factory),
            dimensions,
            inner: OnceCell::new(),
        }
    }

    /// Lazy ONNX embedder rooted at `data_dir`.
    pub fn onnx(data_dir: impl Into<PathBuf>, model_name: &str, dimensions: usize) -> Self {
        Self::new(
            OnnxFactory::new(ModelManager::new(data_dir.into(), model_name), dimensions),
            dimensions,
        )
    }

    /// Whether the underlying embedder has been built.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized()
    }

    async fn handle(&self) -> Result<&Arc<dyn EmbeddingAdapter>, ReverieError> {
        self.inner
            .get_or_try_init(|| async {
                debug!("initializing embedder");
                self.factory.create().await
            })
            .await
    }
}

#[async_trait]
impl PluginAdapter for LazyEmbedder {
    fn name(&self) -> &str {
        "lazy-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        match self.inner.get() {
            Some(inner) => inner.health_check().await,
            None => Ok(HealthStatus::Degraded("model not loaded yet".into())),
        }
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        match self.inner.get() {
            Some(inner) => inner.shutdown().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for LazyEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        let pending: Vec<(usize, String)> = input
            .texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, text.clone()))
            .collect();

        let mut embeddings = vec![Vec::new(); input.texts.len()];
        if pending.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings,
                dimensions: self.dimensions,
            });
        }

        let inner = self.handle().await?;
        let output = inner
            .embed(EmbeddingInput {
                texts: pending.iter().map(|(_, text)| text.clone()).collect(),
            })
            .await?;
        if output.embeddings.len() != pending.len() {
            return Err(ReverieError::embedding(format!(
                "embedder returned {} vectors for {} texts",
                output.embeddings.len(),
                pending.len()
            )));
        }

        for ((slot, _), vector) in pending.into_iter().zip(output.embeddings) {
            if vector.len() != self.dimensions {
                return Err(ReverieError::embedding(format!(
                    "embedder returned {}-dim vector, expected {}",
                    vector.len(),
                    self.dimensions
                )));
            }
            embeddings[slot] = vector;
        }

        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
