// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use reverie_core::{PromptMessage, ProviderRequest, ResponseSchema, to_safe_vector_literal};
use reverie_storage::{SearchHit, SearchTable, search_by_vector};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{MemoryPipeline, ReflectionRecord, Stage, UpdateMemory};
use crate::structured::{StructuredOutcome, extract_json_object, request_structured};

const CONSOLIDATION_PROMPT: &str = r#"You maintain a user's long-term memory.

You get EXISTING memories (each with an id) and NEW facts. For each new fact decide:
- If it contradicts or refines an existing memory, report a conflict: the existing memory's id, the corrected content that should replace it, and a short reason.
- If it is new information, keep it in finalFacts.
- If it only repeats an existing memory, drop it.

Never invent facts and never reference ids that are not listed."#;

const CONSOLIDATION_MAX_TOKENS: u32 = 1024;

/// One existing memory to rewrite.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub old_memory_id: String,
    pub new_content: String,
    #[serde(default)]
    pub reasoning: String,
}

/// The consolidation model's answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationPlan {
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub final_facts: Vec<String>,
}

fn consolidation_schema() -> ResponseSchema {
    ResponseSchema {
        name: "memory_consolidation".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "conflicts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "oldMemoryId": { "type": "string" },
                            "newContent": { "type": "string" },
                            "reasoning": { "type": "string" }
                        },
                        "required": ["oldMemoryId", "newContent", "reasoning"]
                    }
                },
                "finalFacts": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["conflicts", "finalFacts"]
        }),
    }
}

impl MemoryPipeline {
    /// Stage 3: reconcile validated facts with similar stored memories.
    ///
    /// Any failure passes the validated facts through unchanged.
    pub(super) async fn consolidate(&self, record: &mut ReflectionRecord) {
        if record.validated.is_empty() {
            return;
        }

        let candidates = match self.similar_memories(&record.validated).await {
            Ok(candidates) => candidates,
            Err(reason) => {
                warn!(%reason, "consolidation skipped, keeping all facts");
                record.degrade(Stage::Consolidate);
                record.final_facts = record.validated.clone();
                return;
            }
        };
        if candidates.is_empty() {
            debug!("no similar memories, nothing to consolidate");
            record.final_facts = record.validated.clone();
            return;
        }

        let plan = match self.request_plan(&candidates, &record.validated).await {
            Some(plan) => plan,
            None => {
                record.degrade(Stage::Consolidate);
                record.final_facts = record.validated.clone();
                return;
            }
        };

        let (updates, final_facts) = resolve_plan(plan, &candidates);
        debug!(
            candidates = candidates.len(),
            updates = updates.len(),
            final_facts = final_facts.len(),
            "consolidation complete"
        );
        record.updates = updates;
        record.final_facts = final_facts;
    }

    async fn similar_memories(&self, facts: &[String]) -> Result<Vec<SearchHit>, String> {
        let vector = self
            .embedder
            .embed_one(&facts.join("\n"))
            .await
            .map_err(|e| format!("fact batch embedding failed: {e}"))?;
        let literal = to_safe_vector_literal(&vector)
            .map_err(|e| format!("fact batch embedding rejected: {e}"))?;
        let hits = search_by_vector(
            &self.db,
            SearchTable::Memories,
            &literal,
            None,
            self.config.consolidation_limit,
        )
        .await
        .map_err(|e| format!("similar memory search failed: {e}"))?;
        Ok(hits
            .into_iter()
            .filter(|h| h.score >= self.config.consolidation_threshold)
            .collect())
    }

    async fn request_plan(
        &self,
        candidates: &[SearchHit],
        facts: &[String],
    ) -> Option<ConsolidationPlan> {
        let existing = candidates
            .iter()
            .map(|c| format!("[{}] {}", c.id, c.content))
            .collect::<Vec<_>>()
            .join("\n");
        let new = facts
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n");

        let request = ProviderRequest {
            model: self.config.extraction_model.clone(),
            system_prompt: Some(CONSOLIDATION_PROMPT.to_string()),
            messages: vec![PromptMessage::user(format!(
                "EXISTING:\n{existing}\n\nNEW:\n{new}"
            ))],
            max_tokens: CONSOLIDATION_MAX_TOKENS,
            temperature: Some(0.0),
            response_schema: Some(consolidation_schema()),
        };

        match request_structured::<ConsolidationPlan>(self.provider.as_ref(), request).await {
            StructuredOutcome::Structured(plan) => Some(plan),
            StructuredOutcome::RawText(text) => {
                let plan = extract_json_object(&text)
                    .and_then(|value| serde_json::from_value::<ConsolidationPlan>(value).ok());
                if plan.is_none() {
                    warn!("consolidation output unparseable, keeping all facts");
                }
                plan
            }
            StructuredOutcome::Failed(e) => {
                warn!(error = %e, "consolidation call failed, keeping all facts");
                None
            }
        }
    }
}

/// Turn a plan into update commands and facts to insert.
///
/// Conflicts naming an id outside `candidates`, or with blank content, are
/// skipped. Final facts that duplicate an update's content or an existing
/// candidate are dropped.
fn resolve_plan(plan: ConsolidationPlan, candidates: &[SearchHit]) -> (Vec<UpdateMemory>, Vec<String>) {
    let known_ids: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut taken: HashSet<String> = candidates.iter().map(|c| c.content.trim().to_string()).collect();
    let mut updated: HashSet<String> = HashSet::new();

    let mut updates = Vec::new();
    for conflict in plan.conflicts {
        let content = conflict.new_content.trim();
        if !known_ids.contains(conflict.old_memory_id.as_str()) {
            warn!(memory_id = %conflict.old_memory_id, "conflict names unknown memory, skipping");
            continue;
        }
        if content.is_empty() || !updated.insert(conflict.old_memory_id.clone()) {
            continue;
        }
        taken.insert(content.to_string());
        updates.push(UpdateMemory {
            memory_id: conflict.old_memory_id,
            new_content: content.to_string(),
            reasoning: conflict.reasoning,
        });
    }

    let final_facts = plan
        .final_facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty() && taken.insert(f.clone()))
        .collect();

    (updates, final_facts)
}
