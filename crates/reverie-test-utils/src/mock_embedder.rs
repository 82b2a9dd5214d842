// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter for tests.
//!
//! Texts are embedded as L2-normalized hashed bags of words, so texts that
//! share words are similar and identical texts are identical vectors.
//! Specific texts can be pinned to hand-picked vectors, and failures can be
//! injected per text or globally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use reverie_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    ReverieError,
};

pub struct MockEmbedder {
    dimensions: usize,
    overrides: HashMap<String, Vec<f32>>,
    fail_on: Vec<String>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            overrides: HashMap::new(),
            fail_on: Vec::new(),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Pin `text` (exact match) to `vector`.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.into(), vector);
        self
    }

    /// Fail any batch containing a text that includes `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on.push(needle.into());
        self
    }

    /// Toggle failure of every call.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `embed` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        if let Some(needle) = self.fail_on.iter().find(|n| text.contains(n.as_str())) {
            return Err(ReverieError::embedding(format!(
                "mock embedder refused text containing {needle:?}"
            )));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if let Some(vector) = self.overrides.get(text) {
            return Ok(vector.clone());
        }
        Ok(hashed_bag_of_words(text, self.dimensions))
    }
}

fn hashed_bag_of_words(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    if dimensions == 0 {
        return vector;
    }

    let lower = text.to_lowercase();
    let mut any = false;
    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let slot = (fnv1a(word) % dimensions as u64) as usize;
        vector[slot] += 1.0;
        any = true;
    }
    if !any {
        vector[0] = 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    vector.iter().map(|v| v / norm).collect()
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        if self.offline.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("offline".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ReverieError::embedding("mock embedder is offline"));
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::cosine_similarity;

    #[tokio::test]
    async fn identical_texts_embed_identically() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed_one("User likes green tea").await.unwrap();
        let b = embedder.embed_one("user LIKES green tea!").await.unwrap();
        assert_eq!(a.len(), 16);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn blank_text_embeds_empty() {
        let embedder = MockEmbedder::new(16);
        assert!(embedder.embed_one("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pinned_vectors_and_injected_failures() {
        let embedder = MockEmbedder::new(3)
            .with_vector("pinned", vec![0.0, 1.0, 0.0])
            .failing_on("poison");

        assert_eq!(embedder.embed_one("pinned").await.unwrap(), vec![0.0, 1.0, 0.0]);
        assert!(embedder.embed_one("some poison text").await.is_err());

        embedder.set_offline(true);
        assert!(embedder.embed_one("pinned").await.is_err());
        assert_eq!(embedder.call_count(), 3);
    }
}
