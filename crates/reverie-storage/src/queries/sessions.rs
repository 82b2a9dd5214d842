// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session queries.

use reverie_core::{ReverieError, Session};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Insert the session if missing, otherwise refresh `updated_at`.
///
/// Shared by the standalone call and the turn-recording transaction.
pub(crate) fn upsert_session_sync(
    conn: &rusqlite::Connection,
    id: &str,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)
         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        params![id, now],
    )?;
    Ok(())
}

/// Create the session or touch its `updated_at`.
pub async fn upsert_session(db: &Database, id: &str) -> Result<(), ReverieError> {
    let id = id.to_string();
    let now = reverie_core::now_timestamp();
    db.connection()
        .call(move |conn| upsert_session_sync(conn, &id, &now))
        .await
        .map_err(map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, ReverieError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Session>, rusqlite::Error> {
            let result = conn.query_row(
                "SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1",
                params![id],
                row_to_session,
            );
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List sessions, most recently active first.
pub async fn list_sessions(db: &Database, limit: usize) -> Result<Vec<Session>, ReverieError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Session>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, title, created_at, updated_at FROM sessions
                 ORDER BY updated_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_session)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
