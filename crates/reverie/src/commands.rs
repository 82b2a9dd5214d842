// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reverie recall`, `reverie memories`, and `reverie sessions`.

use std::sync::Arc;

use reverie_config::ReverieConfig;
use reverie_core::{Memory, ReverieError};
use reverie_memory::{HybridRetriever, LazyEmbedder};
use reverie_storage::Database;
use reverie_storage::queries::memories::{count_memories, recent_memories};
use reverie_storage::queries::sessions::list_sessions;
use tracing::debug;

async fn open_database(config: &ReverieConfig) -> Result<Database, ReverieError> {
    Database::open(
        &config.storage.database_path,
        config.embedding.dimensions,
        config.storage.wal_mode,
    )
    .await
}

/// Retrieve and print the context block for `query`.
///
/// Downloads the embedding model on first use. If embedding fails the
/// block falls back to the session's recent turns.
pub async fn run_recall(
    config: &ReverieConfig,
    session_id: &str,
    query: &str,
) -> Result<(), ReverieError> {
    let db = open_database(config).await?;
    let embedder = Arc::new(LazyEmbedder::onnx(
        &config.embedding.data_dir,
        &config.embedding.model_name,
        config.embedding.dimensions,
    ));
    let retriever = HybridRetriever::new(db.clone(), embedder, &config.retrieval);

    let profile = retriever.classifier().classify(query);
    debug!(tier = profile.tier.as_str(), "query classified");

    let block = retriever.retrieve(session_id, query).await;
    if block.is_empty() {
        println!("(no relevant context)");
    } else {
        println!("{}", block.render());
    }

    db.close().await
}

/// Print stored memories, newest first.
pub async fn run_memories(
    config: &ReverieConfig,
    session_id: Option<&str>,
    limit: usize,
) -> Result<(), ReverieError> {
    let db = open_database(config).await?;
    let memories = recent_memories(&db, session_id, limit).await?;
    let total = count_memories(&db).await?;

    if memories.is_empty() {
        println!("No memories stored.");
    } else {
        for memory in &memories {
            println!("{}", format_memory(memory));
        }
        println!();
        println!("  {} shown, {total} total", memories.len());
    }

    db.close().await
}

/// Print sessions, most recently active first.
pub async fn run_sessions(config: &ReverieConfig, limit: usize) -> Result<(), ReverieError> {
    let db = open_database(config).await?;
    let sessions = list_sessions(&db, limit).await?;

    if sessions.is_empty() {
        println!("No sessions recorded.");
    }
    for session in &sessions {
        println!(
            "  {}  last active {}  {}",
            session.id,
            session.updated_at,
            session.title.as_deref().unwrap_or("")
        );
    }

    db.close().await
}

fn format_memory(memory: &Memory) -> String {
    let short_id: String = memory.id.chars().take(8).collect();
    format!(
        "  {short_id}  {}  [{}]  {}",
        memory.created_at, memory.session_id, memory.content
    )
}
