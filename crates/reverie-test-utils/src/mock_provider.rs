// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured replies,
//! enabling fast, CI-runnable tests without external API calls. Every
//! request is recorded so tests can assert on prompts, schemas and call
//! counts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use reverie_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderRequest, ProviderResponse,
    ReverieError, TokenUsage,
};

/// One queued outcome for [`MockProvider::complete`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain text content with no structured payload.
    Text(String),
    /// A structured payload; `content` carries the same JSON as text.
    Structured(serde_json::Value),
    /// The call fails with a provider error carrying this message.
    Error(String),
}

/// A mock LLM provider that replays queued replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty,
/// a default "mock response" text is returned.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a new mock provider with an empty reply queue.
    pub fn new() -> Self {
        Self::with_replies(Vec::new())
    }

    /// Create a mock provider pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a reply to the end of the queue.
    pub async fn push_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in call order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("mock response".to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request.model.clone();
        self.requests.lock().await.push(request);

        let (content, structured) = match self.next_reply().await {
            MockReply::Text(text) => (text, None),
            MockReply::Structured(value) => (value.to_string(), Some(value)),
            MockReply::Error(message) => return Err(ReverieError::provider(message)),
        };

        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content,
            structured,
            model,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}
