// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reverie doctor` command implementation.
//!
//! Runs diagnostic checks against the configured environment: config
//! validity, database reachability (including the vector extension), and
//! whether the embedding model is already on disk.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use reverie_config::ReverieConfig;
use reverie_core::{HealthStatus, PluginAdapter, ReverieError};
use reverie_memory::ModelManager;
use reverie_storage::Database;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `reverie doctor` command.
///
/// With `plain`, disables colored output.
pub async fn run_doctor(config: &ReverieConfig, plain: bool) -> Result<(), ReverieError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(),
        check_database(config).await,
        check_embedding_model(config),
    ];

    println!();
    println!("  reverie doctor");
    println!("  {}", "-".repeat(50));

    for result in &results {
        println!("{}", format_line(result, use_color));
    }
    println!();

    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Check configuration loads without errors.
fn check_config() -> CheckResult {
    let start = Instant::now();
    match reverie_config::load_and_validate() {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Open the database and confirm the vector extension answers.
async fn check_database(config: &ReverieConfig) -> CheckResult {
    let start = Instant::now();
    let db_path = &config.storage.database_path;

    if !std::path::Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let db = match Database::open(db_path, config.embedding.dimensions, config.storage.wal_mode)
        .await
    {
        Ok(db) => db,
        Err(e) => {
            return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };

    let result = match db.health_check().await {
        Ok(HealthStatus::Healthy) => {
            CheckResult::new("Database", CheckStatus::Pass, "connected", start)
        }
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new("Database", CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("Database", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    };
    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "database checkpoint failed");
    }
    result
}

/// Report whether the embedding model is already downloaded.
fn check_embedding_model(config: &ReverieConfig) -> CheckResult {
    let start = Instant::now();
    let manager = ModelManager::new(
        PathBuf::from(&config.embedding.data_dir),
        &config.embedding.model_name,
    );
    if manager.is_model_available() {
        CheckResult::new(
            "Embedding model",
            CheckStatus::Pass,
            format!("{} ({} dims)", config.embedding.model_name, config.embedding.dimensions),
            start,
        )
    } else {
        CheckResult::new(
            "Embedding model",
            CheckStatus::Warn,
            format!(
                "not downloaded: {} (fetched on first recall)",
                manager.model_dir().display()
            ),
            start,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> ReverieConfig {
        let mut config = ReverieConfig::default();
        config.storage.database_path = dir.path().join("reverie.db").to_string_lossy().into_owned();
        config.embedding.data_dir = dir.path().to_string_lossy().into_owned();
        config.embedding.dimensions = 8;
        config
    }

    #[tokio::test]
    async fn missing_database_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let result = check_database(&config_in(&dir)).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("will be created"));
    }

    #[tokio::test]
    async fn existing_database_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        Database::open(&config.storage.database_path, 8, false)
            .await
            .unwrap()
            .close()
            .await
            .unwrap();

        let result = check_database(&config).await;
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.message);
    }

    #[test]
    fn missing_model_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let result = check_embedding_model(&config_in(&dir));
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[test]
    fn plain_output_uses_tags() {
        let result = CheckResult {
            name: "Database".into(),
            status: CheckStatus::Fail,
            message: "open failed".into(),
            duration: Duration::from_millis(3),
        };
        let line = format_line(&result, false);
        assert!(line.contains("[FAIL]"));
        assert!(line.contains("open failed (3ms)"));
    }
}
