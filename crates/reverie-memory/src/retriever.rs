// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retriever over past conversation turns and long-term memories.
//!
//! Message search combines cosine similarity over turn embeddings with FTS5
//! keyword rank. Each side is filtered by its own tier threshold, then the
//! survivors are fused as `w_s * semantic + w_k * keyword` with a missing
//! side contributing 0. Memory search is semantic-only with a stricter
//! threshold. Both searches run concurrently.
//!
//! Retrieval never fails: if the query cannot be embedded, the session's own
//! most recent turns are returned instead; if keyword search fails, message
//! search continues on semantic results alone.

use std::collections::HashMap;
use std::sync::Arc;

use reverie_config::RetrievalConfig;
use reverie_core::{EmbeddingAdapter, ReverieError, VectorLiteral, to_safe_vector_literal};
use reverie_storage::{
    Database, SearchHit, SearchTable, recent_turns, search_by_keywords, search_by_vector,
};
use tracing::{debug, warn};

use crate::classifier::{QueryComplexityClassifier, QueryProfile};
use crate::types::{ContextBlock, RetrievalKind, RetrievalResult};

/// Each side fetches this many times `max_results` before thresholding.
const CANDIDATE_MULTIPLIER: usize = 4;

/// Words that never become keyword search terms.
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "but", "can", "could", "did", "does", "doing", "for", "from", "had", "has", "have", "her",
    "here", "him", "his", "how", "into", "its", "just", "like", "more", "most", "not", "now",
    "off", "once", "only", "other", "our", "out", "over", "own", "same", "she", "should", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "too", "under", "until", "very", "was", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
];

pub struct HybridRetriever {
    db: Database,
    embedder: Arc<dyn EmbeddingAdapter>,
    classifier: QueryComplexityClassifier,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(db: Database, embedder: Arc<dyn EmbeddingAdapter>, config: &RetrievalConfig) -> Self {
        Self {
            db,
            embedder,
            classifier: QueryComplexityClassifier::new(config),
            config: config.clone(),
        }
    }

    pub fn classifier(&self) -> &QueryComplexityClassifier {
        &self.classifier
    }

    /// Retrieve memories and cross-session excerpts relevant to `query`.
    pub async fn retrieve(&self, session_id: &str, query: &str) -> ContextBlock {
        let profile = self.classifier.classify(query);
        debug!(
            tier = profile.tier.as_str(),
            semantic_threshold = profile.semantic_threshold,
            max_results = profile.max_results,
            "query classified"
        );

        let vector = match self.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed, falling back to recent turns");
                return self.recent_fallback(session_id).await;
            }
        };

        let (excerpts, memories) = tokio::join!(
            self.search_messages(session_id, query, &vector, &profile),
            self.search_memories(&vector, profile.max_results),
        );

        debug!(
            memories = memories.len(),
            excerpts = excerpts.len(),
            "retrieval complete"
        );
        ContextBlock {
            memories,
            excerpts,
            fallback: false,
        }
    }

    async fn embed_query(&self, query: &str) -> Result<VectorLiteral, ReverieError> {
        let vector = self.embedder.embed_one(query).await?;
        Ok(to_safe_vector_literal(&vector)?)
    }

    async fn search_messages(
        &self,
        session_id: &str,
        query: &str,
        vector: &VectorLiteral,
        profile: &QueryProfile,
    ) -> Vec<RetrievalResult> {
        let limit = profile.max_results.saturating_mul(CANDIDATE_MULTIPLIER);
        let terms = extract_keywords(query, self.config.max_keyword_terms);

        let (semantic, keyword) = tokio::join!(
            search_by_vector(&self.db, SearchTable::Turns, vector, Some(session_id), limit),
            search_by_keywords(&self.db, SearchTable::Turns, &terms, Some(session_id), limit),
        );

        let semantic = semantic.unwrap_or_else(|e| {
            warn!(error = %e, "semantic message search failed");
            Vec::new()
        });
        let keyword = keyword.unwrap_or_else(|e| {
            warn!(error = %e, "keyword search failed, using semantic results only");
            Vec::new()
        });

        let semantic = above(semantic, profile.semantic_threshold);
        let keyword = above(keyword, profile.keyword_threshold);

        let mut fused = fuse(
            semantic,
            keyword,
            self.config.semantic_weight,
            self.config.keyword_weight,
        );
        fused.truncate(profile.max_results);
        fused
    }

    async fn search_memories(&self, vector: &VectorLiteral, max_results: usize) -> Vec<RetrievalResult> {
        let limit = max_results.div_ceil(2);
        match self
            .search_memories_by_vector(vector, self.config.memory_threshold, limit)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| to_result(RetrievalKind::Memory, hit.score, 0.0, hit))
                .collect(),
            Err(e) => {
                warn!(error = %e, "memory search failed");
                Vec::new()
            }
        }
    }

    /// Memories with cosine similarity of at least `threshold`, best first.
    pub async fn search_memories_by_vector(
        &self,
        vector: &VectorLiteral,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ReverieError> {
        let hits = search_by_vector(&self.db, SearchTable::Memories, vector, None, limit).await?;
        Ok(above(hits, threshold))
    }

    async fn recent_fallback(&self, session_id: &str) -> ContextBlock {
        match recent_turns(&self.db, session_id, self.config.fallback_turns).await {
            Ok(turns) => ContextBlock {
                memories: Vec::new(),
                excerpts: turns
                    .into_iter()
                    .map(|turn| RetrievalResult {
                        kind: RetrievalKind::Message,
                        id: turn.id,
                        session_id: turn.session_id,
                        role: Some(turn.role),
                        content: turn.content,
                        score: 0.0,
                        semantic_score: 0.0,
                        keyword_score: 0.0,
                    })
                    .collect(),
                fallback: true,
            },
            Err(e) => {
                warn!(error = %e, "recent turn fallback failed, retrieving nothing");
                ContextBlock::default()
            }
        }
    }
}

fn above(hits: Vec<SearchHit>, threshold: f64) -> Vec<SearchHit> {
    hits.into_iter().filter(|h| h.score >= threshold).collect()
}

fn to_result(kind: RetrievalKind, semantic: f64, keyword: f64, hit: SearchHit) -> RetrievalResult {
    RetrievalResult {
        kind,
        id: hit.id,
        session_id: hit.session_id,
        role: hit.role,
        content: hit.content,
        score: hit.score,
        semantic_score: semantic,
        keyword_score: keyword,
    }
}

/// Fuse thresholded semantic and keyword hits.
///
/// `score = semantic_weight * semantic + keyword_weight * keyword`, where a
/// side that did not return the row contributes 0. Sorted by fused score,
/// highest first; ties keep semantic-first discovery order.
pub fn fuse(
    semantic: Vec<SearchHit>,
    keyword: Vec<SearchHit>,
    semantic_weight: f64,
    keyword_weight: f64,
) -> Vec<RetrievalResult> {
    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, (SearchHit, f64, f64)> = HashMap::new();

    for hit in semantic {
        if !rows.contains_key(&hit.id) {
            order.push(hit.id.clone());
            let score = hit.score;
            rows.insert(hit.id.clone(), (hit, score, 0.0));
        }
    }
    for hit in keyword {
        match rows.get_mut(&hit.id) {
            Some(row) => row.2 = row.2.max(hit.score),
            None => {
                order.push(hit.id.clone());
                let score = hit.score;
                rows.insert(hit.id.clone(), (hit, 0.0, score));
            }
        }
    }

    let mut fused: Vec<RetrievalResult> = order
        .into_iter()
        .filter_map(|id| rows.remove(&id))
        .map(|(mut hit, s, k)| {
            hit.score = semantic_weight * s + keyword_weight * k;
            to_result(RetrievalKind::Message, s, k, hit)
        })
        .collect();
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

/// Keyword terms for full-text search.
///
/// Lowercased alphanumeric words of at least three characters, stopwords
/// removed, deduplicated, longest first, at most `max_terms`.
pub fn extract_keywords(query: &str, max_terms: usize) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    terms.truncate(max_terms);
    terms
}
