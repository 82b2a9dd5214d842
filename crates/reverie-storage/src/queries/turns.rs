// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn queries and the transactional exchange recorder.

use reverie_core::{ReverieError, Role, Turn, VectorLiteral};
use rusqlite::params;
use tracing::{debug, warn};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_role;
use crate::queries::sessions::upsert_session_sync;

/// A turn to be written, with its validated embedding if one was produced.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub embedding: Option<VectorLiteral>,
}

impl NewTurn {
    pub fn new(role: Role, content: impl Into<String>, embedding: Option<VectorLiteral>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            embedding,
        }
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<Turn, rusqlite::Error> {
    let role: String = row.get(2)?;
    Ok(Turn {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: parse_role(2, &role)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Persist a session upsert, its turns, and their embeddings atomically.
///
/// Turns are stamped in order with strictly increasing timestamps. An
/// embedding whose dimension does not match the database is dropped with a
/// warning; its turn is still written.
pub async fn record_exchange(
    db: &Database,
    session_id: &str,
    turns: Vec<NewTurn>,
) -> Result<Vec<Turn>, ReverieError> {
    let dimensions = db.dimensions();
    let mut turns = turns;
    for turn in &mut turns {
        if let Some(literal) = &turn.embedding
            && let Err(e) = literal.ensure_dimensions(dimensions)
        {
            warn!(turn_id = %turn.id, error = %e, "dropping turn embedding");
            turn.embedding = None;
        }
    }

    let session_id = session_id.to_string();
    let stored = db
        .connection()
        .call(move |conn| -> Result<Vec<Turn>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let base = next_timestamp_millis(&tx, &session_id)?;
            upsert_session_sync(&tx, &session_id, &format_millis(base))?;

            let mut stored = Vec::with_capacity(turns.len());
            for (offset, turn) in turns.into_iter().enumerate() {
                let created_at = format_millis(base + offset as i64);
                tx.execute(
                    "INSERT INTO turns (id, session_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![turn.id, session_id, turn.role.as_str(), turn.content, created_at],
                )?;
                if let Some(literal) = &turn.embedding {
                    tx.execute(
                        "INSERT INTO turn_embeddings (owner_id, session_id, vector)
                         VALUES (?1, ?2, vec_f32(?3))",
                        params![turn.id, session_id, literal.as_str()],
                    )?;
                }
                stored.push(Turn {
                    id: turn.id,
                    session_id: session_id.clone(),
                    role: turn.role,
                    content: turn.content,
                    created_at,
                });
            }

            // Session activity tracks its newest turn.
            tx.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![
                    format_millis(base + stored.len().saturating_sub(1) as i64),
                    session_id
                ],
            )?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)?;

    debug!(turns = stored.len(), "exchange recorded");
    Ok(stored)
}

/// The `limit` most recent turns of a session, returned oldest first.
pub async fn recent_turns(
    db: &Database,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Turn>, ReverieError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Turn>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, created_at FROM turns
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let mut turns = stmt
                .query_map(params![session_id, limit as i64], row_to_turn)?
                .collect::<Result<Vec<_>, _>>()?;
            turns.reverse();
            Ok(turns)
        })
        .await
        .map_err(map_tr_err)
}

/// Current time in millis, bumped past the session's newest turn so that
/// `created_at` stays strictly increasing within a session.
fn next_timestamp_millis(
    conn: &rusqlite::Connection,
    session_id: &str,
) -> Result<i64, rusqlite::Error> {
    let now = chrono::Utc::now().timestamp_millis();
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM turns WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    let latest = latest
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(&ts).ok())
        .map(|dt| dt.timestamp_millis());
    Ok(match latest {
        Some(last) if last >= now => last + 1,
        _ => now,
    })
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::to_safe_vector_literal;

    async fn embedding_count(db: &Database) -> i64 {
        db.connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM turn_embeddings", [], |r| r.get(0))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn record_exchange_writes_turns_in_order() {
        let db = Database::open_in_memory(3).await.unwrap();
        let lit = to_safe_vector_literal(&[1.0, 0.0, 0.0]).unwrap();

        let stored = record_exchange(
            &db,
            "s1",
            vec![
                NewTurn::new(Role::User, "hello", Some(lit.clone())),
                NewTurn::new(Role::Assistant, "hi there", Some(lit)),
            ],
        )
        .await
        .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].created_at < stored[1].created_at);

        let turns = recent_turns(&db, "s1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "hi there");
        assert_eq!(embedding_count(&db).await, 2);
    }

    #[tokio::test]
    async fn turn_without_embedding_still_persists() {
        let db = Database::open_in_memory(3).await.unwrap();
        record_exchange(&db, "s1", vec![NewTurn::new(Role::User, "no vector", None)])
            .await
            .unwrap();
        assert_eq!(recent_turns(&db, "s1", 5).await.unwrap().len(), 1);
        assert_eq!(embedding_count(&db).await, 0);
    }

    #[tokio::test]
    async fn wrong_dimension_embedding_is_dropped() {
        let db = Database::open_in_memory(3).await.unwrap();
        let lit = to_safe_vector_literal(&[1.0, 0.0]).unwrap();
        record_exchange(&db, "s1", vec![NewTurn::new(Role::User, "short", Some(lit))])
            .await
            .unwrap();
        assert_eq!(recent_turns(&db, "s1", 5).await.unwrap().len(), 1);
        assert_eq!(embedding_count(&db).await, 0);
    }

    #[tokio::test]
    async fn recent_turns_limits_to_latest() {
        let db = Database::open_in_memory(3).await.unwrap();
        for i in 0..3 {
            record_exchange(
                &db,
                "s1",
                vec![
                    NewTurn::new(Role::User, format!("q{i}"), None),
                    NewTurn::new(Role::Assistant, format!("a{i}"), None),
                ],
            )
            .await
            .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }

        let turns = recent_turns(&db, "s1", 3).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn failed_transaction_leaves_nothing_behind() {
        let db = Database::open_in_memory(3).await.unwrap();
        let duplicate = NewTurn::new(Role::User, "first", None);
        let mut clash = NewTurn::new(Role::Assistant, "second", None);
        clash.id = duplicate.id.clone();

        let result = record_exchange(&db, "s1", vec![duplicate, clash]).await;
        assert!(result.is_err());
        assert!(recent_turns(&db, "s1", 5).await.unwrap().is_empty());
        assert!(
            crate::queries::sessions::get_session(&db, "s1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
