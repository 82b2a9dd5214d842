// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Converts text into fixed-dimension vectors for semantic search.
///
/// Implementations must be safe to call concurrently. A blank input text
/// yields an empty vector in the corresponding output slot.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Generates one embedding per input text.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ReverieError>;

    /// Dimension of every non-empty vector this adapter produces.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ReverieError> {
        let output = self
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ReverieError::embedding("adapter returned no embeddings"))
    }
}
