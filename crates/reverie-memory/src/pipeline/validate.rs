// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use reverie_storage::queries::memories::recent_memories;
use tracing::{debug, warn};

use super::{MemoryPipeline, ReflectionRecord, Stage};

impl MemoryPipeline {
    /// Stage 2: drop exact duplicates of this session's recent memories and
    /// of earlier facts in the same batch.
    pub(super) async fn validate(&self, record: &mut ReflectionRecord) {
        if record.extracted.is_empty() {
            return;
        }

        let mut seen: HashSet<String> = match recent_memories(
            &self.db,
            Some(&record.session_id),
            self.config.dedupe_window,
        )
        .await
        {
            Ok(memories) => memories
                .into_iter()
                .map(|m| m.content.trim().to_string())
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not load session memories, skipping dedupe against store");
                record.degrade(Stage::Validate);
                HashSet::new()
            }
        };

        let validated: Vec<String> = record
            .extracted
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| seen.insert(f.clone()))
            .collect();

        debug!(
            kept = validated.len(),
            dropped = record.extracted.len() - validated.len(),
            "validation complete"
        );
        record.validated = validated;
    }
}
