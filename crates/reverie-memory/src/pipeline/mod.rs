// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-turn memory formation.
//!
//! Four stages run strictly in order over one [`ReflectionRecord`]:
//!
//! 1. **Extract**: ask the extraction model for durable facts
//! 2. **Validate**: drop facts already stored for this session
//! 3. **Consolidate**: reconcile facts with similar existing memories
//! 4. **Save**: apply in-place updates and persist the remaining facts
//!
//! No stage returns an error. Degraded stages are recorded on the record and
//! logged; the pipeline always runs to completion.

mod consolidate;
mod extract;
mod save;
mod validate;

use std::sync::Arc;

use reverie_config::MemoryConfig;
use reverie_core::{EmbeddingAdapter, Memory, ProviderAdapter, Turn};
use reverie_storage::Database;
use tracing::info;

pub use consolidate::{Conflict, ConsolidationPlan};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Extract,
    Validate,
    Consolidate,
    Save,
}

/// Rewrite an existing memory in place.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMemory {
    pub memory_id: String,
    pub new_content: String,
    pub reasoning: String,
}

/// Accumulated state of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ReflectionRecord {
    pub session_id: String,
    pub turns: Vec<Turn>,
    /// Extract output.
    pub extracted: Vec<String>,
    /// Validate output.
    pub validated: Vec<String>,
    /// Consolidate output: updates to apply, facts to insert.
    pub updates: Vec<UpdateMemory>,
    pub final_facts: Vec<String>,
    /// Save output.
    pub applied_updates: Vec<String>,
    pub saved: Vec<Memory>,
    /// Saved memories whose embedding could not be written.
    pub unembedded: Vec<String>,
    /// Facts that could not be saved at all.
    pub failed_facts: Vec<String>,
    /// Stages that fell back to a narrower result.
    pub degraded: Vec<Stage>,
}

impl ReflectionRecord {
    pub fn new(session_id: &str, turns: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.to_string(),
            turns,
            ..Self::default()
        }
    }

    fn degrade(&mut self, stage: Stage) {
        if !self.degraded.contains(&stage) {
            self.degraded.push(stage);
        }
    }
}

pub struct MemoryPipeline {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    config: MemoryConfig,
}

impl MemoryPipeline {
    pub fn new(
        db: Database,
        embedder: Arc<dyn EmbeddingAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            provider,
            config: config.clone(),
        }
    }

    /// Run all four stages over `turns`.
    pub async fn run(&self, session_id: &str, turns: Vec<Turn>) -> ReflectionRecord {
        let mut record = ReflectionRecord::new(session_id, turns);

        self.extract(&mut record).await;
        self.validate(&mut record).await;
        self.consolidate(&mut record).await;
        self.save(&mut record).await;

        info!(
            session_id,
            extracted = record.extracted.len(),
            saved = record.saved.len(),
            updated = record.applied_updates.len(),
            degraded = ?record.degraded,
            "reflection complete"
        );
        record
    }
}
