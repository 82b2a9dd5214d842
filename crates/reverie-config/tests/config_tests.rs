// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Reverie configuration system.

use reverie_config::diagnostic::ConfigError;
use reverie_config::model::ReverieConfig;
use reverie_config::{load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_reverie_config() {
    let toml = r#"
[agent]
name = "test-agent"
log_level = "debug"

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[embedding]
dimensions = 8

[retrieval]
semantic_weight = 0.6
keyword_weight = 0.4

[retrieval.simple]
semantic_threshold = 0.9
keyword_threshold = 0.2
max_results = 2

[context]
keep_recent = 6

[memory]
enabled = false
dedupe_window = 30
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "test-agent");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.embedding.dimensions, 8);
    assert_eq!(config.retrieval.semantic_weight, 0.6);
    assert_eq!(config.retrieval.simple.max_results, 2);
    assert_eq!(config.retrieval.medium.max_results, 5);
    assert_eq!(config.context.keep_recent, 6);
    assert!(!config.memory.enabled);
    assert_eq!(config.memory.dedupe_window, 30);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    let defaults = ReverieConfig::default();
    assert_eq!(config.agent.name, defaults.agent.name);
    assert_eq!(config.embedding.dimensions, 384);
    assert_eq!(config.retrieval.memory_threshold, 0.80);
    assert_eq!(config.retrieval.fallback_turns, 3);
    assert_eq!(config.context.response_reserve, 4096);
    assert_eq!(config.context.compression_threshold_chars, 8000);
    assert_eq!(config.memory.negative_context_limit, 15);
    assert_eq!(config.memory.consolidation_threshold, 0.75);
    assert_eq!(config.memory.consolidation_limit, 10);
}

#[test]
fn unknown_field_produces_suggestion() {
    let toml = r#"
[retrieval]
semantc_weight = 0.5
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "semantc_weight");
            assert_eq!(suggestion.as_deref(), Some("semantic_weight"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n")
        .expect_err("should reject unknown section");
    assert!(matches!(errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_produces_invalid_type() {
    let errors = load_and_validate_str("[context]\nkeep_recent = \"four\"\n")
        .expect_err("should reject wrong type");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn validation_errors_surface_through_load() {
    let toml = r#"
[retrieval]
memory_threshold = 0.0

[context]
context_limit = 1000
response_reserve = 2000
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}
