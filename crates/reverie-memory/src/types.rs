// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval result types.

use reverie_core::Role;

/// What a retrieval result points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalKind {
    /// A turn from another session (or this session's recent turns on fallback).
    Message,
    /// A distilled long-term memory.
    Memory,
}

/// A scored retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub kind: RetrievalKind,
    pub id: String,
    pub session_id: String,
    /// Set for messages only.
    pub role: Option<Role>,
    pub content: String,
    /// Fused score (memories: cosine similarity).
    pub score: f64,
    pub semantic_score: f64,
    pub keyword_score: f64,
}

/// Everything retrieval found for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    pub memories: Vec<RetrievalResult>,
    pub excerpts: Vec<RetrievalResult>,
    /// `excerpts` are the session's own recent turns because semantic
    /// search was unavailable.
    pub fallback: bool,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty() && self.excerpts.is_empty()
    }

    /// Markdown rendering used as the prompt's context message.
    ///
    /// Memories come first as a bullet list, then message excerpts in rank
    /// order. An empty block renders as an empty string.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if !self.memories.is_empty() {
            let mut text = String::from("## Relevant Memories\n");
            for memory in &self.memories {
                text.push_str(&format!("- {}\n", memory.content));
            }
            sections.push(text);
        }

        if !self.excerpts.is_empty() {
            let mut text = if self.fallback {
                String::from("## Recent Conversation\n")
            } else {
                String::from("## Related Conversation Excerpts\n")
            };
            for excerpt in &self.excerpts {
                let role = excerpt.role.map(|r| r.as_str()).unwrap_or("unknown");
                text.push_str(&format!("- [{role}] {}\n", excerpt.content));
            }
            sections.push(text);
        }

        sections.join("\n")
    }
}
