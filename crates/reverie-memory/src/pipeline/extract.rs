// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use reverie_core::{PromptMessage, ProviderRequest, ResponseSchema, Role, Turn};
use reverie_storage::queries::memories::recent_memories;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{MemoryPipeline, ReflectionRecord, Stage};
use crate::structured::{StructuredOutcome, extract_json_array, request_structured};

const EXTRACTION_PROMPT: &str = r#"You extract durable facts about the user from a conversation so they can be remembered in future conversations.

Rules:
- Each fact is one standalone sentence about the user (e.g. "The user's dog is named Max").
- Only include what the user stated or clearly confirmed: preferences, personal details, projects, decisions, instructions.
- Skip greetings, small talk, questions, and anything the assistant merely suggested.
- Do not repeat anything listed under KNOWN MEMORIES.
- If there is nothing worth remembering, return an empty list."#;

const FALLBACK_PROMPT: &str = r#"List durable facts about the user from this conversation, one standalone sentence each, skipping anything under KNOWN MEMORIES.
Reply with a JSON array of strings and nothing else. Reply [] if there is nothing to remember."#;

const EXTRACTION_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
struct ExtractedFacts {
    facts: Vec<String>,
}

fn extraction_schema() -> ResponseSchema {
    ResponseSchema {
        name: "extracted_facts".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "facts": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["facts"],
            "additionalProperties": false
        }),
    }
}

fn render_conversation(turns: &[Turn]) -> String {
    turns
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .map(|t| {
            let speaker = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{speaker}: {}", t.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_known(known: &[String]) -> String {
    if known.is_empty() {
        return "(none)".to_string();
    }
    known
        .iter()
        .map(|m| format!("- {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean(facts: Vec<String>) -> Vec<String> {
    facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

impl MemoryPipeline {
    /// Stage 1: extract candidate facts from the record's turns.
    pub(super) async fn extract(&self, record: &mut ReflectionRecord) {
        let conversation = render_conversation(&record.turns);
        if conversation.is_empty() {
            debug!("no turn content, skipping extraction");
            return;
        }

        let known: Vec<String> =
            match recent_memories(&self.db, None, self.config.negative_context_limit).await {
                Ok(memories) => memories.into_iter().map(|m| m.content).collect(),
                Err(e) => {
                    warn!(error = %e, "could not load known memories for extraction");
                    Vec::new()
                }
            };

        let body = format!(
            "KNOWN MEMORIES:\n{}\n\nCONVERSATION:\n{conversation}",
            render_known(&known)
        );
        let request = ProviderRequest {
            model: self.config.extraction_model.clone(),
            system_prompt: Some(EXTRACTION_PROMPT.to_string()),
            messages: vec![PromptMessage::user(body.clone())],
            max_tokens: EXTRACTION_MAX_TOKENS,
            temperature: Some(0.0),
            response_schema: Some(extraction_schema()),
        };

        let facts = match request_structured::<ExtractedFacts>(self.provider.as_ref(), request).await
        {
            StructuredOutcome::Structured(parsed) => parsed.facts,
            StructuredOutcome::RawText(text) => match extract_json_array(&text) {
                Some(facts) => {
                    debug!("recovered facts from unstructured extraction output");
                    facts
                }
                None => {
                    warn!("extraction output was not structured, retrying as free text");
                    record.degrade(Stage::Extract);
                    self.extract_free_text(body).await
                }
            },
            StructuredOutcome::Failed(e) => {
                warn!(error = %e, "structured extraction failed, retrying as free text");
                record.degrade(Stage::Extract);
                self.extract_free_text(body).await
            }
        };

        record.extracted = clean(facts);
        debug!(facts = record.extracted.len(), "extraction complete");
    }

    async fn extract_free_text(&self, body: String) -> Vec<String> {
        let request = ProviderRequest {
            model: self.config.extraction_model.clone(),
            system_prompt: Some(FALLBACK_PROMPT.to_string()),
            messages: vec![PromptMessage::user(body)],
            max_tokens: EXTRACTION_MAX_TOKENS,
            temperature: Some(0.0),
            response_schema: None,
        };
        match self.provider.complete(request).await {
            Ok(response) => extract_json_array(&response.content).unwrap_or_else(|| {
                warn!("free-text extraction returned no usable list");
                Vec::new()
            }),
            Err(e) => {
                warn!(error = %e, "free-text extraction failed, extracting nothing");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{fixture, remember, turns};
    use reverie_test_utils::MockReply;

    #[tokio::test]
    async fn empty_turns_make_no_call() {
        let f = fixture(vec![]).await;
        let mut record = ReflectionRecord::new("s1", turns("  ", ""));
        f.pipeline.extract(&mut record).await;

        assert!(record.extracted.is_empty());
        assert_eq!(f.provider.call_count(), 0);
        assert!(record.degraded.is_empty());

        let mut none = ReflectionRecord::new("s1", vec![]);
        f.pipeline.extract(&mut none).await;
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn structured_facts_are_cleaned() {
        let f = fixture(vec![MockReply::Structured(json!({
            "facts": ["  The user has a dog named Max ", ""]
        }))])
        .await;
        let mut record = ReflectionRecord::new("s1", turns("My dog is Max", "Nice name!"));
        f.pipeline.extract(&mut record).await;

        assert_eq!(record.extracted, vec!["The user has a dog named Max"]);
        let requests = f.provider.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].response_schema.is_some());
        assert!(requests[0].messages[0].content.contains("User: My dog is Max"));
    }

    #[tokio::test]
    async fn known_memories_are_sent_as_negative_context() {
        let f = fixture(vec![MockReply::Structured(json!({ "facts": [] }))]).await;
        remember(&f, "m1", "The user lives in Oslo").await;

        let mut record = ReflectionRecord::new("s1", turns("hello", "hi"));
        f.pipeline.extract(&mut record).await;

        let requests = f.provider.requests().await;
        assert!(requests[0].messages[0].content.contains("- The user lives in Oslo"));
        assert!(record.extracted.is_empty());
    }

    #[tokio::test]
    async fn failure_falls_back_to_one_free_text_call() {
        let f = fixture(vec![
            MockReply::Error("schema unsupported".into()),
            MockReply::Text("```json\n[\"The user prefers tea\"]\n```".into()),
        ])
        .await;
        let mut record = ReflectionRecord::new("s1", turns("I prefer tea", "Noted"));
        f.pipeline.extract(&mut record).await;

        assert_eq!(record.extracted, vec!["The user prefers tea"]);
        assert_eq!(f.provider.call_count(), 2);
        assert!(f.provider.requests().await[1].response_schema.is_none());
        assert_eq!(record.degraded, vec![Stage::Extract]);
    }

    #[tokio::test]
    async fn raw_list_output_needs_no_second_call() {
        let f = fixture(vec![MockReply::Text("- The user plays chess".into())]).await;
        let mut record = ReflectionRecord::new("s1", turns("I play chess", "Cool"));
        f.pipeline.extract(&mut record).await;

        assert_eq!(record.extracted, vec!["The user plays chess"]);
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn total_failure_yields_no_facts() {
        let f = fixture(vec![
            MockReply::Error("down".into()),
            MockReply::Error("still down".into()),
        ])
        .await;
        let mut record = ReflectionRecord::new("s1", turns("I play chess", "Cool"));
        f.pipeline.extract(&mut record).await;

        assert!(record.extracted.is_empty());
        assert_eq!(f.provider.call_count(), 2);
    }
}
