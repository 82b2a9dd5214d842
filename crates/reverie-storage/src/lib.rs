// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Reverie memory engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, the sqlite-vec
//! extension for cosine distance, FTS5 indexes for keyword search, and a
//! single-writer concurrency model via `tokio-rusqlite`.
//!
//! Every vector bound into SQL arrives as a [`reverie_core::VectorLiteral`],
//! so only validated, finite vectors of the configured dimension are written
//! or queried.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::{Database, map_tr_err};
pub use queries::search::{SearchHit, SearchTable, search_by_keywords, search_by_vector};
pub use queries::turns::{NewTurn, record_exchange, recent_turns};
