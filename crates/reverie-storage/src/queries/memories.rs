// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory CRUD and embedding writes.

use reverie_core::{Memory, ReverieError, VectorLiteral};
use rusqlite::params;
use tracing::warn;

use crate::database::{Database, map_tr_err};

const MEMORY_COLUMNS: &str =
    "id, session_id, content, category, confidence, created_at, updated_at";

fn row_to_memory(row: &rusqlite::Row<'_>) -> Result<Memory, rusqlite::Error> {
    Ok(Memory {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        confidence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Insert a memory row. The schema rejects blank content and out-of-range confidence.
pub async fn insert_memory(db: &Database, memory: &Memory) -> Result<(), ReverieError> {
    let memory = memory.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO memories (id, session_id, content, category, confidence, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    memory.id,
                    memory.session_id,
                    memory.content,
                    memory.category,
                    memory.confidence,
                    memory.created_at,
                    memory.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Write the embedding for an existing memory.
///
/// Fails with `InvalidVector` if the literal's dimension differs from the
/// database's.
pub async fn insert_memory_embedding(
    db: &Database,
    memory_id: &str,
    session_id: &str,
    vector: &VectorLiteral,
) -> Result<(), ReverieError> {
    vector.ensure_dimensions(db.dimensions())?;

    let memory_id = memory_id.to_string();
    let session_id = session_id.to_string();
    let literal = vector.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO memory_embeddings (owner_id, session_id, vector)
                 VALUES (?1, ?2, vec_f32(?3))",
                params![memory_id, session_id, literal],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a memory's content in place and bump `updated_at`.
///
/// When `embedding` is given, the embedding row is swapped for a new one
/// computed from the new content, in the same transaction. Otherwise, or if
/// the vector has the wrong dimension, the old embedding is kept and only
/// the content changes. Returns `false` if no memory has that id.
pub async fn update_memory(
    db: &Database,
    id: &str,
    content: &str,
    embedding: Option<&VectorLiteral>,
) -> Result<bool, ReverieError> {
    let embedding = embedding.filter(|vector| match vector.ensure_dimensions(db.dimensions()) {
        Ok(()) => true,
        Err(e) => {
            warn!(memory_id = id, error = %e, "rejecting embedding for updated memory");
            false
        }
    });

    let id = id.to_string();
    let content = content.to_string();
    let literal = embedding.map(|v| v.as_str().to_string());
    let now = reverie_core::now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE memories SET content = ?1, updated_at = MAX(?2, created_at) WHERE id = ?3",
                params![content, now, id],
            )?;
            if changed > 0
                && let Some(literal) = literal
            {
                tx.execute(
                    "INSERT OR REPLACE INTO memory_embeddings (owner_id, session_id, vector)
                     SELECT id, session_id, vec_f32(?2) FROM memories WHERE id = ?1",
                    params![id, literal],
                )?;
            }
            tx.commit()?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated memories, optionally restricted to one session.
pub async fn recent_memories(
    db: &Database,
    session_id: Option<&str>,
    limit: usize,
) -> Result<Vec<Memory>, ReverieError> {
    let session_id = session_id.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<Memory>, rusqlite::Error> {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE (?1 IS NULL OR session_id = ?1)
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id, limit as i64], row_to_memory)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Get a single memory by id.
pub async fn get_memory(db: &Database, id: &str) -> Result<Option<Memory>, ReverieError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Memory>, rusqlite::Error> {
            let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
            match conn.query_row(&sql, params![id], row_to_memory) {
                Ok(memory) => Ok(Some(memory)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a memory has a stored embedding.
pub async fn has_embedding(db: &Database, memory_id: &str) -> Result<bool, ReverieError> {
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM memory_embeddings WHERE owner_id = ?1)",
                params![memory_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Number of stored memories.
pub async fn count_memories(db: &Database) -> Result<usize, ReverieError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        })
        .await
        .map(|n| n as usize)
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions::upsert_session;
    use reverie_core::{InvalidVectorError, to_safe_vector_literal};

    fn make_memory(id: &str, session: &str, content: &str, ts: &str) -> Memory {
        Memory {
            id: id.to_string(),
            session_id: session.to_string(),
            content: content.to_string(),
            category: None,
            confidence: 1.0,
            created_at: ts.to_string(),
            updated_at: ts.to_string(),
        }
    }

    async fn setup() -> Database {
        let db = Database::open_in_memory(3).await.unwrap();
        upsert_session(&db, "s1").await.unwrap();
        upsert_session(&db, "s2").await.unwrap();
        db
    }

    #[tokio::test]
    async fn insert_and_get_memory() {
        let db = setup().await;
        let m = make_memory("m1", "s1", "User likes tea", "2026-01-01T00:00:00.000Z");
        insert_memory(&db, &m).await.unwrap();

        assert_eq!(get_memory(&db, "m1").await.unwrap(), Some(m));
        assert_eq!(count_memories(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let db = setup().await;
        let m = make_memory("m1", "s1", "   ", "2026-01-01T00:00:00.000Z");
        assert!(insert_memory(&db, &m).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let db = setup().await;
        let mut m = make_memory("m1", "s1", "fact", "2026-01-01T00:00:00.000Z");
        m.confidence = 1.5;
        assert!(insert_memory(&db, &m).await.is_err());
    }

    #[tokio::test]
    async fn update_content_in_place() {
        let db = setup().await;
        let m = make_memory("m1", "s1", "User prefers dark mode", "2026-01-01T00:00:00.000Z");
        insert_memory(&db, &m).await.unwrap();

        assert!(update_memory(&db, "m1", "User prefers light mode", None).await.unwrap());
        let updated = get_memory(&db, "m1").await.unwrap().unwrap();
        assert_eq!(updated.content, "User prefers light mode");
        assert_eq!(updated.created_at, m.created_at);
        assert!(updated.updated_at > m.updated_at);
        assert_eq!(count_memories(&db).await.unwrap(), 1);

        assert!(!update_memory(&db, "missing", "x", None).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_dimension_update_keeps_content_change() {
        let db = setup().await;
        let m = make_memory("m1", "s1", "User prefers dark mode", "2026-01-01T00:00:00.000Z");
        insert_memory(&db, &m).await.unwrap();
        let old = to_safe_vector_literal(&[1.0, 0.0, 0.0]).unwrap();
        insert_memory_embedding(&db, "m1", "s1", &old).await.unwrap();

        let wrong = to_safe_vector_literal(&[0.0, 1.0]).unwrap();
        assert!(update_memory(&db, "m1", "User prefers light mode", Some(&wrong)).await.unwrap());

        let updated = get_memory(&db, "m1").await.unwrap().unwrap();
        assert_eq!(updated.content, "User prefers light mode");
        let hits = crate::queries::search::search_by_vector(
            &db,
            crate::queries::search::SearchTable::Memories,
            &old,
            None,
            5,
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn update_replaces_embedding() {
        let db = setup().await;
        let m = make_memory("m1", "s1", "User prefers dark mode", "2026-01-01T00:00:00.000Z");
        insert_memory(&db, &m).await.unwrap();
        let old = to_safe_vector_literal(&[1.0, 0.0, 0.0]).unwrap();
        insert_memory_embedding(&db, "m1", "s1", &old).await.unwrap();

        let new = to_safe_vector_literal(&[0.0, 1.0, 0.0]).unwrap();
        assert!(update_memory(&db, "m1", "User prefers light mode", Some(&new)).await.unwrap());

        let hits = crate::queries::search::search_by_vector(
            &db,
            crate::queries::search::SearchTable::Memories,
            &new,
            None,
            5,
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].content, "User prefers light mode");
    }

    #[tokio::test]
    async fn recent_memories_scoped_and_ordered() {
        let db = setup().await;
        insert_memory(&db, &make_memory("a", "s1", "a", "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        insert_memory(&db, &make_memory("b", "s2", "b", "2026-01-02T00:00:00.000Z"))
            .await
            .unwrap();
        insert_memory(&db, &make_memory("c", "s1", "c", "2026-01-03T00:00:00.000Z"))
            .await
            .unwrap();

        let all = recent_memories(&db, None, 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let scoped = recent_memories(&db, Some("s1"), 1).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "c");
    }

    #[tokio::test]
    async fn embedding_write_checks_dimensions() {
        let db = setup().await;
        insert_memory(&db, &make_memory("a", "s1", "a", "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let wrong = to_safe_vector_literal(&[1.0, 2.0]).unwrap();
        let err = insert_memory_embedding(&db, "a", "s1", &wrong)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReverieError::InvalidVector(InvalidVectorError::DimensionMismatch { .. })
        ));
        assert!(!has_embedding(&db, "a").await.unwrap());

        let right = to_safe_vector_literal(&[1.0, 2.0, 3.0]).unwrap();
        insert_memory_embedding(&db, "a", "s1", &right).await.unwrap();
        assert!(has_embedding(&db, "a").await.unwrap());
    }
}
