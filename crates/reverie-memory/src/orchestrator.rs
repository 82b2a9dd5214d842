// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-path and background entry points.
//!
//! [`MemoryOrchestrator::build_context`] runs in the foreground before a
//! model call. [`MemoryOrchestrator::spawn_reflection`] schedules turn
//! persistence and the memory pipeline after the response is complete.

use std::sync::Arc;

use reverie_config::{MemoryConfig, ReverieConfig};
use reverie_context::{ContextAssembler, ContextCompressor, PromptMessages};
use reverie_core::{
    EmbeddingAdapter, PromptMessage, ProviderAdapter, ReverieError, Role,
    VectorLiteral, to_safe_vector_literal,
};
use reverie_storage::{Database, NewTurn, record_exchange, recent_turns};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::{MemoryPipeline, ReflectionRecord};
use crate::retriever::HybridRetriever;
use crate::types::ContextBlock;

/// Handle to a scheduled reflection.
///
/// Dropping it detaches the task; it is never aborted.
pub struct ReflectionTask {
    handle: JoinHandle<Option<ReflectionRecord>>,
}

impl ReflectionTask {
    /// Wait for the reflection to finish. `None` if it did not reach the
    /// pipeline or the task panicked.
    pub async fn join(self) -> Option<ReflectionRecord> {
        match self.handle.await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "reflection task panicked");
                None
            }
        }
    }
}

pub struct MemoryOrchestrator {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
    retriever: HybridRetriever,
    assembler: ContextAssembler,
    pipeline: MemoryPipeline,
    config: MemoryConfig,
}

impl MemoryOrchestrator {
    pub fn new(
        config: &ReverieConfig,
        db: Database,
        embedder: Arc<dyn EmbeddingAdapter>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Result<Self, ReverieError> {
        let compressor = ContextCompressor::new(
            provider.clone(),
            config.context.compression_model.clone(),
            config.context.compression_threshold_chars,
        );
        Ok(Self {
            retriever: HybridRetriever::new(db.clone(), embedder.clone(), &config.retrieval),
            assembler: ContextAssembler::new(&config.context, Some(compressor))?,
            pipeline: MemoryPipeline::new(db.clone(), embedder.clone(), provider, &config.memory),
            config: config.memory.clone(),
            db,
            embedder,
        })
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn pipeline(&self) -> &MemoryPipeline {
        &self.pipeline
    }

    /// Retrieve context for `turn` without assembling a prompt.
    pub async fn recall(&self, session_id: &str, turn: &str) -> ContextBlock {
        self.retriever.retrieve(session_id, turn).await
    }

    /// Build the prompt for the next model call.
    ///
    /// Retrieved context (compressed if oversized) leads, followed by the
    /// session's recent history and the current turn, all within the
    /// model's input budget. When retrieval fell back to recent turns, the
    /// history carries them and no separate context block is added. Never
    /// fails; degraded steps are logged.
    pub async fn build_context(&self, session_id: &str, turn: &str) -> PromptMessages {
        let block = self.recall(session_id, turn).await;

        let (history, context) =
            match recent_turns(&self.db, session_id, self.config.recent_turns).await {
                Ok(turns) => {
                    let history: Vec<PromptMessage> = turns
                        .into_iter()
                        .map(|t| PromptMessage::new(t.role, t.content))
                        .collect();
                    // Fallback excerpts are the tail of this history already.
                    let context = if block.fallback {
                        String::new()
                    } else {
                        block.render()
                    };
                    (history, context)
                }
                Err(e) => {
                    warn!(error = %e, "could not load session history");
                    (Vec::new(), block.render())
                }
            };

        self.assembler.assemble(&context, &history, turn).await
    }

    /// Persist an exchange, then run the memory pipeline over it.
    ///
    /// Turn rows, their embeddings, and the session upsert commit in one
    /// transaction. A turn whose embedding fails is stored without one.
    /// Returns `None` if persistence failed or memory is disabled.
    pub async fn record_and_reflect(
        &self,
        session_id: &str,
        user_turn: &str,
        assistant_turn: &str,
    ) -> Option<ReflectionRecord> {
        let (user_vector, assistant_vector) = self.embed_pair(user_turn, assistant_turn).await;
        let turns = vec![
            NewTurn::new(Role::User, user_turn, user_vector),
            NewTurn::new(Role::Assistant, assistant_turn, assistant_vector),
        ];

        let stored = match record_exchange(&self.db, session_id, turns).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(session_id, error = %e, "failed to persist exchange");
                return None;
            }
        };

        if !self.config.enabled {
            debug!("memory disabled, skipping reflection");
            return None;
        }
        Some(self.pipeline.run(session_id, stored).await)
    }

    /// Schedule [`Self::record_and_reflect`] as a detached task.
    ///
    /// Returns `None` without scheduling anything if `cancel` has already
    /// fired. Once spawned, the task runs to completion regardless of
    /// later cancellation.
    pub fn spawn_reflection(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        session_id: &str,
        user_turn: &str,
        assistant_turn: &str,
    ) -> Option<ReflectionTask> {
        if cancel.is_cancelled() {
            info!(session_id, "request cancelled, reflection not scheduled");
            return None;
        }

        let this = Arc::clone(self);
        let session_id = session_id.to_string();
        let user_turn = user_turn.to_string();
        let assistant_turn = assistant_turn.to_string();
        let handle = tokio::spawn(async move {
            this.record_and_reflect(&session_id, &user_turn, &assistant_turn)
                .await
        });
        Some(ReflectionTask { handle })
    }

    async fn embed_pair(
        &self,
        user_turn: &str,
        assistant_turn: &str,
    ) -> (Option<VectorLiteral>, Option<VectorLiteral>) {
        tokio::join!(self.embed_turn(user_turn), self.embed_turn(assistant_turn))
    }

    async fn embed_turn(&self, content: &str) -> Option<VectorLiteral> {
        let vector = match self.embedder.embed_one(content).await {
            Ok(vector) if !vector.is_empty() => vector,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "turn embedding failed, storing turn without vector");
                return None;
            }
        };
        match to_safe_vector_literal(&vector) {
            Ok(literal) => Some(literal),
            Err(e) => {
                warn!(error = %e, "rejecting turn embedding");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_storage::queries::memories::count_memories;
    use reverie_test_utils::{MockEmbedder, MockProvider, MockReply};
    use serde_json::json;
    use tracing_test::traced_test;

    const DIMS: usize = 16;

    struct Setup {
        db: Database,
        provider: Arc<MockProvider>,
        embedder: Arc<MockEmbedder>,
        orchestrator: Arc<MemoryOrchestrator>,
    }

    async fn setup(replies: Vec<MockReply>) -> Setup {
        let db = Database::open_in_memory(DIMS).await.unwrap();
        let provider = Arc::new(MockProvider::with_replies(replies));
        let embedder = Arc::new(MockEmbedder::new(DIMS));
        let orchestrator = MemoryOrchestrator::new(
            &ReverieConfig::default(),
            db.clone(),
            embedder.clone(),
            provider.clone(),
        )
        .unwrap();
        Setup {
            db,
            provider,
            embedder,
            orchestrator: Arc::new(orchestrator),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn embedding_failure_is_logged_and_recovered() {
        let s = setup(vec![]).await;
        s.embedder.set_offline(true);

        let block = s.orchestrator.recall("s1", "anything at all").await;

        assert!(block.fallback);
        assert!(block.excerpts.is_empty());
        assert!(logs_contain("query embedding failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn unembedded_turns_are_still_recorded() {
        let s = setup(vec![MockReply::Structured(json!({ "facts": [] }))]).await;
        s.embedder.set_offline(true);

        let record = s
            .orchestrator
            .record_and_reflect("s1", "hello", "hi")
            .await
            .unwrap();

        assert_eq!(record.turns.len(), 2);
        assert!(logs_contain("turn embedding failed"));
        let history = recent_turns(&s.db, "s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn disabled_memory_records_turns_only() {
        let db = Database::open_in_memory(DIMS).await.unwrap();
        let provider = Arc::new(MockProvider::new());
        let mut config = ReverieConfig::default();
        config.memory.enabled = false;
        let orchestrator =
            MemoryOrchestrator::new(&config, db.clone(), Arc::new(MockEmbedder::new(DIMS)), provider.clone())
                .unwrap();

        let record = orchestrator.record_and_reflect("s1", "I like tea", "Noted.").await;

        assert!(record.is_none());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(recent_turns(&db, "s1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn cancelled_token_skips_scheduling() {
        let s = setup(vec![]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(s.orchestrator.spawn_reflection(&cancel, "s1", "a", "b").is_none());
        assert!(logs_contain("reflection not scheduled"));
        assert!(recent_turns(&s.db, "s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn build_context_ends_with_current_turn() {
        let s = setup(vec![MockReply::Structured(json!({
            "facts": ["The user lives in Lisbon"]
        }))])
        .await;
        s.orchestrator
            .record_and_reflect("s1", "I live in Lisbon", "Lovely city!")
            .await
            .unwrap();
        assert_eq!(count_memories(&s.db).await.unwrap(), 1);

        let prompt = s
            .orchestrator
            .build_context("s1", "The user lives in Lisbon")
            .await;

        let first = &prompt.messages[0];
        assert_eq!(first.role, Role::System);
        assert!(first.content.contains("## Relevant Memories"));
        let last = prompt.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "The user lives in Lisbon");
        // system block, two history turns, current turn
        assert_eq!(prompt.messages.len(), 4);
        assert!(prompt.token_count > 0);
    }
}
