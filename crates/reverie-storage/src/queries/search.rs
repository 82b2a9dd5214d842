// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector and keyword search over turns and memories.
//!
//! Vector search ranks by `1 - vec_distance_cosine`. Keyword search runs an
//! FTS5 `MATCH` with quoted, OR-joined terms and maps the BM25 rank into
//! `[0, 1)` as `r / (1 + r)` where `r = -bm25`.

use reverie_core::{ReverieError, Role, VectorLiteral};
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::queries::parse_role;

/// Table a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTable {
    Turns,
    Memories,
}

impl SearchTable {
    fn vector_sql(self) -> &'static str {
        match self {
            SearchTable::Turns => {
                "SELECT t.id, t.session_id, t.role, t.content,
                        1.0 - vec_distance_cosine(e.vector, vec_f32(?1)) AS similarity
                 FROM turn_embeddings e
                 JOIN turns t ON t.id = e.owner_id
                 WHERE (?2 IS NULL OR e.session_id != ?2)
                 ORDER BY similarity DESC
                 LIMIT ?3"
            }
            SearchTable::Memories => {
                "SELECT m.id, m.session_id, NULL, m.content,
                        1.0 - vec_distance_cosine(e.vector, vec_f32(?1)) AS similarity
                 FROM memory_embeddings e
                 JOIN memories m ON m.id = e.owner_id
                 WHERE (?2 IS NULL OR e.session_id != ?2)
                 ORDER BY similarity DESC
                 LIMIT ?3"
            }
        }
    }

    fn keyword_sql(self) -> &'static str {
        match self {
            SearchTable::Turns => {
                "SELECT t.id, t.session_id, t.role, t.content, bm25(turns_fts) AS rank
                 FROM turns_fts
                 JOIN turns t ON t.rowid = turns_fts.rowid
                 WHERE turns_fts MATCH ?1 AND (?2 IS NULL OR t.session_id != ?2)
                 ORDER BY rank
                 LIMIT ?3"
            }
            SearchTable::Memories => {
                "SELECT m.id, m.session_id, NULL, m.content, bm25(memories_fts) AS rank
                 FROM memories_fts
                 JOIN memories m ON m.rowid = memories_fts.rowid
                 WHERE memories_fts MATCH ?1 AND (?2 IS NULL OR m.session_id != ?2)
                 ORDER BY rank
                 LIMIT ?3"
            }
        }
    }
}

/// One search result. `role` is set for turns only.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub session_id: String,
    pub role: Option<Role>,
    pub content: String,
    /// Cosine similarity for vector search, normalized rank for keyword search.
    pub score: f64,
}

fn row_to_hit(row: &rusqlite::Row<'_>) -> Result<(SearchHit, f64), rusqlite::Error> {
    let role: Option<String> = row.get(2)?;
    let raw: f64 = row.get(4)?;
    Ok((
        SearchHit {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: role.as_deref().map(|r| parse_role(2, r)).transpose()?,
            content: row.get(3)?,
            score: raw,
        },
        raw,
    ))
}

/// Rank rows by cosine similarity to `vector`, most similar first.
///
/// Rows from `exclude_session` are skipped.
pub async fn search_by_vector(
    db: &Database,
    table: SearchTable,
    vector: &VectorLiteral,
    exclude_session: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>, ReverieError> {
    vector.ensure_dimensions(db.dimensions())?;

    let literal = vector.as_str().to_string();
    let exclude = exclude_session.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<SearchHit>, rusqlite::Error> {
            let mut stmt = conn.prepare(table.vector_sql())?;
            let rows = stmt.query_map(params![literal, exclude, limit as i64], row_to_hit)?;
            rows.map(|r| r.map(|(hit, _)| hit)).collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Rank rows by BM25 against any of `terms`, best match first.
///
/// Terms are quoted for FTS5 so user text never reaches the query parser as
/// syntax. An empty term list returns no results.
pub async fn search_by_keywords(
    db: &Database,
    table: SearchTable,
    terms: &[String],
    exclude_session: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>, ReverieError> {
    let Some(query) = build_match_query(terms) else {
        return Ok(Vec::new());
    };

    let exclude = exclude_session.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<SearchHit>, rusqlite::Error> {
            let mut stmt = conn.prepare(table.keyword_sql())?;
            let rows = stmt.query_map(params![query, exclude, limit as i64], row_to_hit)?;
            rows.map(|r| {
                r.map(|(mut hit, bm25)| {
                    hit.score = normalize_bm25(bm25);
                    hit
                })
            })
            .collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Quote each non-blank term and OR-join them into an FTS5 query.
pub fn build_match_query(terms: &[String]) -> Option<String> {
    let quoted: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}

/// Map a (negative) BM25 rank into `[0, 1)`, higher is better.
pub fn normalize_bm25(bm25: f64) -> f64 {
    let r = (-bm25).max(0.0);
    if !r.is_finite() {
        return 0.0;
    }
    r / (1.0 + r)
}
