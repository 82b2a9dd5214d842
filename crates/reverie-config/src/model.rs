// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Reverie memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReverieConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local embedding model settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Hybrid retrieval weights and tier profiles.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt assembly and compression settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Reflective memory pipeline settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and CLI output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "reverie".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("reverie").join("reverie.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("reverie.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Local ONNX embedding model configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// HuggingFace model identifier.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Directory the model and tokenizer are downloaded into.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Dimension of every stored vector. Fixed per deployment.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            data_dir: default_data_dir(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("reverie"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .to_string_lossy()
        .into_owned()
}

fn default_dimensions() -> usize {
    384
}

/// Retrieval parameters for one query complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierProfile {
    /// Minimum cosine similarity for a semantic hit.
    pub semantic_threshold: f64,
    /// Minimum normalized keyword rank for a keyword hit.
    pub keyword_threshold: f64,
    /// Maximum message excerpts returned after fusion.
    pub max_results: usize,
}

/// Hybrid retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Weight applied to the semantic score during fusion.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,

    /// Weight applied to the keyword score during fusion.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Semantic threshold for memory search, independent of tier.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,

    /// Session turns returned when the query cannot be embedded.
    #[serde(default = "default_fallback_turns")]
    pub fallback_turns: usize,

    /// Maximum keyword terms extracted from a query.
    #[serde(default = "default_max_keyword_terms")]
    pub max_keyword_terms: usize,

    #[serde(default = "default_simple_tier")]
    pub simple: TierProfile,

    #[serde(default = "default_medium_tier")]
    pub medium: TierProfile,

    #[serde(default = "default_complex_tier")]
    pub complex: TierProfile,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            memory_threshold: default_memory_threshold(),
            fallback_turns: default_fallback_turns(),
            max_keyword_terms: default_max_keyword_terms(),
            simple: default_simple_tier(),
            medium: default_medium_tier(),
            complex: default_complex_tier(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_memory_threshold() -> f64 {
    0.80
}

fn default_fallback_turns() -> usize {
    3
}

fn default_max_keyword_terms() -> usize {
    5
}

fn default_simple_tier() -> TierProfile {
    TierProfile {
        semantic_threshold: 0.78,
        keyword_threshold: 0.10,
        max_results: 3,
    }
}

fn default_medium_tier() -> TierProfile {
    TierProfile {
        semantic_threshold: 0.70,
        keyword_threshold: 0.05,
        max_results: 5,
    }
}

fn default_complex_tier() -> TierProfile {
    TierProfile {
        semantic_threshold: 0.60,
        keyword_threshold: 0.02,
        max_results: 8,
    }
}

/// Prompt assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Model the assembled prompt is sent to. Selects the context limit.
    #[serde(default = "default_context_model")]
    pub model: String,

    /// Context window used when `model` is not a known model.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// Tokens reserved for the response.
    #[serde(default = "default_response_reserve")]
    pub response_reserve: usize,

    /// Most recent non-system messages always kept during truncation.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Fixed token overhead counted per message.
    #[serde(default = "default_message_overhead")]
    pub message_overhead: usize,

    /// Context blocks longer than this many characters are compressed.
    #[serde(default = "default_compression_threshold_chars")]
    pub compression_threshold_chars: usize,

    /// Model used for context compression.
    #[serde(default = "default_compression_model")]
    pub compression_model: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            model: default_context_model(),
            context_limit: default_context_limit(),
            response_reserve: default_response_reserve(),
            keep_recent: default_keep_recent(),
            message_overhead: default_message_overhead(),
            compression_threshold_chars: default_compression_threshold_chars(),
            compression_model: default_compression_model(),
        }
    }
}

fn default_context_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_context_limit() -> usize {
    200_000
}

fn default_response_reserve() -> usize {
    4096
}

fn default_keep_recent() -> usize {
    4
}

fn default_message_overhead() -> usize {
    4
}

fn default_compression_threshold_chars() -> usize {
    8000
}

fn default_compression_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

/// Reflective memory pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory pipeline. When false, turns are recorded but no facts are extracted.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Model used for extraction and consolidation calls.
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Existing memories shown to the extractor as already known.
    #[serde(default = "default_negative_context_limit")]
    pub negative_context_limit: usize,

    /// Recent session memories checked for exact duplicates.
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,

    /// Minimum similarity for an existing memory to be a consolidation candidate.
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: f64,

    /// Maximum consolidation candidates.
    #[serde(default = "default_consolidation_limit")]
    pub consolidation_limit: usize,

    /// Recent session turns handed to the extractor.
    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            extraction_model: default_extraction_model(),
            negative_context_limit: default_negative_context_limit(),
            dedupe_window: default_dedupe_window(),
            consolidation_threshold: default_consolidation_threshold(),
            consolidation_limit: default_consolidation_limit(),
            recent_turns: default_recent_turns(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_extraction_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_negative_context_limit() -> usize {
    15
}

fn default_dedupe_window() -> usize {
    20
}

fn default_consolidation_threshold() -> f64 {
    0.75
}

fn default_consolidation_limit() -> usize {
    10
}

fn default_recent_turns() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_are_ordered() {
        let r = RetrievalConfig::default();
        assert!(r.simple.semantic_threshold > r.medium.semantic_threshold);
        assert!(r.medium.semantic_threshold > r.complex.semantic_threshold);
        assert!(r.simple.max_results < r.medium.max_results);
        assert!(r.medium.max_results < r.complex.max_results);
    }

    #[test]
    fn default_fusion_weights() {
        let r = RetrievalConfig::default();
        assert_eq!(r.semantic_weight, 0.7);
        assert_eq!(r.keyword_weight, 0.3);
    }

    #[test]
    fn default_database_path_ends_with_db_file() {
        assert!(StorageConfig::default().database_path.ends_with("reverie.db"));
    }
}
