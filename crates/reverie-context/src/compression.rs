// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-focused compression of oversized retrieval context.

use std::sync::Arc;

use reverie_core::{PromptMessage, ProviderAdapter, ProviderRequest};
use tracing::{debug, info, warn};

/// System prompt for the compression call.
const COMPRESSION_PROMPT: &str = r#"You compress retrieved context for a downstream assistant.

From the CONTEXT, keep only the sentences that help answer the QUERY.
- Copy kept sentences verbatim. Do not paraphrase.
- Do not add facts, explanations, or commentary.
- Keep the original order and any section headings that still have content.
- If nothing is relevant, return an empty response."#;

/// Upper bound on compression output tokens.
const COMPRESSION_MAX_TOKENS: u32 = 2048;

/// Shrinks context blocks that exceed a character threshold.
///
/// Fail-open: any provider failure or empty answer returns the input unchanged.
pub struct ContextCompressor {
    provider: Arc<dyn ProviderAdapter>,
    model: String,
    threshold_chars: usize,
}

impl ContextCompressor {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        model: impl Into<String>,
        threshold_chars: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            threshold_chars,
        }
    }

    /// Whether `context` is long enough to be compressed.
    pub fn should_compress(&self, context: &str) -> bool {
        context.chars().count() > self.threshold_chars
    }

    /// Compress `context` down to what is relevant to `query`.
    pub async fn compress(&self, query: &str, context: &str) -> String {
        if !self.should_compress(context) {
            return context.to_string();
        }

        let original_chars = context.chars().count();
        let request = ProviderRequest {
            model: self.model.clone(),
            system_prompt: Some(COMPRESSION_PROMPT.to_string()),
            messages: vec![PromptMessage::user(format!(
                "QUERY:\n{query}\n\nCONTEXT:\n{context}"
            ))],
            max_tokens: COMPRESSION_MAX_TOKENS,
            temperature: Some(0.0),
            response_schema: None,
        };

        match self.provider.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let compressed = response.content.trim().to_string();
                info!(
                    original_chars,
                    compressed_chars = compressed.chars().count(),
                    model = %self.model,
                    "context compressed"
                );
                compressed
            }
            Ok(_) => {
                debug!("compression returned empty output, keeping original context");
                context.to_string()
            }
            Err(e) => {
                warn!(error = %e, "context compression failed, using uncompressed context");
                context.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_test_utils::{MockProvider, MockReply};
    use tracing_test::traced_test;

    fn long_context() -> String {
        "Relevant sentence about Rust. Irrelevant filler text. ".repeat(200)
    }

    #[tokio::test]
    async fn short_context_skips_provider() {
        let provider = Arc::new(MockProvider::new());
        let compressor = ContextCompressor::new(provider.clone(), "m", 8000);

        let out = compressor.compress("rust?", "tiny").await;
        assert_eq!(out, "tiny");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn long_context_is_compressed_at_zero_temperature() {
        let provider = Arc::new(MockProvider::with_replies(vec![MockReply::Text(
            "Relevant sentence about Rust.".into(),
        )]));
        let compressor = ContextCompressor::new(provider.clone(), "m", 8000);

        let out = compressor.compress("rust?", &long_context()).await;
        assert_eq!(out, "Relevant sentence about Rust.");

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.0));
    }

    #[traced_test]
    #[tokio::test]
    async fn provider_failure_returns_original() {
        let provider = Arc::new(MockProvider::with_replies(vec![MockReply::Error(
            "overloaded".into(),
        )]));
        let compressor = ContextCompressor::new(provider, "m", 8000);
        let context = long_context();

        assert_eq!(compressor.compress("rust?", &context).await, context);
        assert!(logs_contain("context compression failed"));
    }

    #[tokio::test]
    async fn empty_answer_returns_original() {
        let provider = Arc::new(MockProvider::with_replies(vec![MockReply::Text("  ".into())]));
        let compressor = ContextCompressor::new(provider, "m", 8000);
        let context = long_context();
        assert_eq!(compressor.compress("rust?", &context).await, context);
    }
}
