// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use reverie_core::{Memory, ReverieError, VectorLiteral, to_safe_vector_literal};
use reverie_storage::queries::memories::{insert_memory, insert_memory_embedding, update_memory};
use tracing::{debug, warn};

use super::{MemoryPipeline, ReflectionRecord, UpdateMemory};

impl MemoryPipeline {
    /// Stage 4: apply updates in place, then insert each final fact.
    ///
    /// Every item is written independently; one failure never stops the
    /// rest of the batch.
    pub(super) async fn save(&self, record: &mut ReflectionRecord) {
        for update in record.updates.clone() {
            match self.apply_update(&update).await {
                Ok(true) => record.applied_updates.push(update.memory_id),
                Ok(false) => warn!(memory_id = %update.memory_id, "memory to update no longer exists"),
                Err(e) => warn!(memory_id = %update.memory_id, error = %e, "memory update failed"),
            }
        }

        for fact in record.final_facts.clone() {
            let memory = new_memory(&record.session_id, &fact);
            if let Err(e) = insert_memory(&self.db, &memory).await {
                warn!(error = %e, "failed to save memory");
                record.failed_facts.push(fact);
                continue;
            }

            if let Err(e) = self.write_embedding(&memory).await {
                warn!(memory_id = %memory.id, error = %e, "memory saved without embedding");
                record.unembedded.push(memory.id.clone());
            }
            debug!(memory_id = %memory.id, "memory saved");
            record.saved.push(memory);
        }
    }

    async fn embed_literal(&self, text: &str) -> Result<VectorLiteral, ReverieError> {
        let vector = self.embedder.embed_one(text).await?;
        Ok(to_safe_vector_literal(&vector)?)
    }

    async fn write_embedding(&self, memory: &Memory) -> Result<(), ReverieError> {
        let literal = self.embed_literal(&memory.content).await?;
        insert_memory_embedding(&self.db, &memory.id, &memory.session_id, &literal).await
    }

    async fn apply_update(&self, update: &UpdateMemory) -> Result<bool, ReverieError> {
        let literal = match self.embed_literal(&update.new_content).await {
            Ok(literal) => Some(literal),
            Err(e) => {
                warn!(memory_id = %update.memory_id, error = %e, "keeping old embedding for updated memory");
                None
            }
        };
        update_memory(&self.db, &update.memory_id, &update.new_content, literal.as_ref()).await
    }
}

fn new_memory(session_id: &str, content: &str) -> Memory {
    let now = reverie_core::now_timestamp();
    Memory {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        content: content.to_string(),
        category: None,
        confidence: 1.0,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{DIMS, fixture, fixture_with, remember};
    use reverie_storage::queries::memories::{count_memories, get_memory, has_embedding};
    use reverie_test_utils::MockEmbedder;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn saves_each_fact_with_embedding() {
        let f = fixture(vec![]).await;
        let mut record = ReflectionRecord::new("s1", vec![]);
        record.final_facts = vec!["The user has a cat".into(), "The user likes jazz".into()];
        f.pipeline.save(&mut record).await;

        assert_eq!(record.saved.len(), 2);
        assert_eq!(count_memories(&f.db).await.unwrap(), 2);
        for memory in &record.saved {
            assert!(has_embedding(&f.db, &memory.id).await.unwrap());
            assert_eq!(memory.confidence, 1.0);
            assert!(memory.category.is_none());
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn one_embedding_failure_does_not_stop_the_batch() {
        let f = fixture_with(MockEmbedder::new(DIMS).failing_on("poison"), vec![]).await;
        let mut record = ReflectionRecord::new("s1", vec![]);
        record.final_facts = vec![
            "The user has a cat".into(),
            "The user mentioned poison ivy".into(),
            "The user likes jazz".into(),
        ];
        f.pipeline.save(&mut record).await;

        assert_eq!(record.saved.len(), 3);
        assert_eq!(record.unembedded.len(), 1);
        let poisoned = &record.unembedded[0];
        assert!(!has_embedding(&f.db, poisoned).await.unwrap());
        let embedded = record.saved.iter().filter(|m| &m.id != poisoned);
        for memory in embedded {
            assert!(has_embedding(&f.db, &memory.id).await.unwrap());
        }
        assert!(logs_contain("memory saved without embedding"));
    }

    #[tokio::test]
    async fn failed_insert_is_skipped() {
        let f = fixture(vec![]).await;
        // The session does not exist, so the foreign key rejects the insert.
        let mut record = ReflectionRecord::new("missing-session", vec![]);
        record.final_facts = vec!["The user has a cat".into()];
        f.pipeline.save(&mut record).await;

        assert!(record.saved.is_empty());
        assert_eq!(record.failed_facts, vec!["The user has a cat"]);
    }

    #[tokio::test]
    async fn updates_are_applied_in_place() {
        let f = fixture(vec![]).await;
        remember(&f, "m1", "The user prefers dark mode").await;

        let mut record = ReflectionRecord::new("s1", vec![]);
        record.updates = vec![
            UpdateMemory {
                memory_id: "m1".into(),
                new_content: "The user prefers light mode".into(),
                reasoning: String::new(),
            },
            UpdateMemory {
                memory_id: "gone".into(),
                new_content: "x".into(),
                reasoning: String::new(),
            },
        ];
        f.pipeline.save(&mut record).await;

        assert_eq!(record.applied_updates, vec!["m1"]);
        let m1 = get_memory(&f.db, "m1").await.unwrap().unwrap();
        assert_eq!(m1.content, "The user prefers light mode");
        assert_eq!(count_memories(&f.db).await.unwrap(), 1);
    }
}
