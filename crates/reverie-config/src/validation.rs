// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: threshold ranges,
//! fusion weights, tier ordering, and token budgets.

use crate::diagnostic::ConfigError;
use crate::model::{ReverieConfig, TierProfile};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ReverieConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.agent.log_level
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.embedding.data_dir.trim().is_empty() {
        errors.push(ConfigError::validation("embedding.data_dir must not be empty"));
    }

    if config.embedding.dimensions == 0 {
        errors.push(ConfigError::validation(
            "embedding.dimensions must be at least 1",
        ));
    }

    let retrieval = &config.retrieval;
    for (name, weight) in [
        ("semantic_weight", retrieval.semantic_weight),
        ("keyword_weight", retrieval.keyword_weight),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            errors.push(ConfigError::validation(format!(
                "retrieval.{name} must be a non-negative number, got {weight}"
            )));
        }
    }
    if retrieval.semantic_weight == 0.0 && retrieval.keyword_weight == 0.0 {
        errors.push(ConfigError::validation(
            "retrieval.semantic_weight and retrieval.keyword_weight must not both be zero",
        ));
    }

    check_threshold(
        &mut errors,
        "retrieval.memory_threshold",
        retrieval.memory_threshold,
    );

    if retrieval.max_keyword_terms == 0 {
        errors.push(ConfigError::validation(
            "retrieval.max_keyword_terms must be at least 1",
        ));
    }

    for (name, tier) in [
        ("simple", &retrieval.simple),
        ("medium", &retrieval.medium),
        ("complex", &retrieval.complex),
    ] {
        check_tier(&mut errors, name, tier);
    }

    // Simpler queries must be at least as strict and return no more results.
    if retrieval.simple.semantic_threshold < retrieval.medium.semantic_threshold
        || retrieval.medium.semantic_threshold < retrieval.complex.semantic_threshold
    {
        errors.push(ConfigError::validation(
            "retrieval tier semantic_threshold must not increase from simple to medium to complex",
        ));
    }
    if retrieval.simple.max_results > retrieval.medium.max_results
        || retrieval.medium.max_results > retrieval.complex.max_results
    {
        errors.push(ConfigError::validation(
            "retrieval tier max_results must not decrease from simple to medium to complex",
        ));
    }

    let context = &config.context;
    if context.response_reserve >= context.context_limit {
        errors.push(ConfigError::validation(format!(
            "context.response_reserve ({}) must be less than context.context_limit ({})",
            context.response_reserve, context.context_limit
        )));
    }
    if context.compression_threshold_chars == 0 {
        errors.push(ConfigError::validation(
            "context.compression_threshold_chars must be at least 1",
        ));
    }

    check_threshold(
        &mut errors,
        "memory.consolidation_threshold",
        config.memory.consolidation_threshold,
    );
    if config.memory.extraction_model.trim().is_empty() {
        errors.push(ConfigError::validation(
            "memory.extraction_model must not be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_threshold(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(ConfigError::validation(format!(
            "{key} must be in (0, 1], got {value}"
        )));
    }
}

fn check_tier(errors: &mut Vec<ConfigError>, name: &str, tier: &TierProfile) {
    check_threshold(
        errors,
        &format!("retrieval.{name}.semantic_threshold"),
        tier.semantic_threshold,
    );
    check_threshold(
        errors,
        &format!("retrieval.{name}.keyword_threshold"),
        tier.keyword_threshold,
    );
    if tier.max_results == 0 {
        errors.push(ConfigError::validation(format!(
            "retrieval.{name}.max_results must be at least 1"
        )));
    }
}
