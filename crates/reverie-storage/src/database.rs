// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All access is serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use async_trait::async_trait;
use reverie_core::{AdapterType, HealthStatus, PluginAdapter, ReverieError};
use tracing::{debug, info};

use crate::migrations::run_migrations;

/// Convert a tokio-rusqlite error into `ReverieError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ReverieError {
    ReverieError::Storage {
        source: Box::new(e),
    }
}

/// Register the sqlite-vec extension for every connection opened afterwards.
fn ensure_sqlite_vec_loaded() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point statically
        // linked by the sqlite-vec crate; auto-extension registration expects
        // exactly this signature.
        unsafe {
            type ExtEntryPoint = unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::ffi::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> i32;

            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                ExtEntryPoint,
            >(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// Handle to the Reverie SQLite database.
///
/// Cloning is cheap; clones share the same background connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    dimensions: usize,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
    ///
    /// `dimensions` is the fixed embedding dimension for this deployment;
    /// vector writes of any other length are rejected.
    pub async fn open(path: &str, dimensions: usize, wal_mode: bool) -> Result<Self, ReverieError> {
        ensure_sqlite_vec_loaded();

        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ReverieError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ReverieError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn, dimensions };
        db.initialize(wal_mode).await?;
        info!(path, dimensions, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub async fn open_in_memory(dimensions: usize) -> Result<Self, ReverieError> {
        ensure_sqlite_vec_loaded();

        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| ReverieError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn, dimensions };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), ReverieError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let mode: String =
                        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.execute_batch(
                    "PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;",
                )?;
                run_migrations(conn).map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(wal_mode, "database initialized");
        Ok(())
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Embedding dimension every stored vector must have.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Checkpoint the WAL so the database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), ReverieError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint before the handle is dropped.
    pub async fn close(self) -> Result<(), ReverieError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        let result = self
            .conn
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("SELECT vec_version()", [], |row| row.get(0))
            })
            .await;

        Ok(match result {
            Ok(version) => {
                debug!(sqlite_vec = %version, "database health check passed");
                HealthStatus::Healthy
            }
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        self.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("reverie.db");
        let db = Database::open(path.to_str().unwrap(), 4, true).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.dimensions(), 4);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reverie.db");
        let path = path.to_str().unwrap();
        Database::open(path, 4, true).await.unwrap().close().await.unwrap();
        Database::open(path, 4, true).await.unwrap().close().await.unwrap();
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let db = Database::open_in_memory(4).await.unwrap();
        assert_eq!(db.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(db.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn vec_functions_are_registered() {
        let db = Database::open_in_memory(3).await.unwrap();
        let distance: f64 = db
            .connection()
            .call(|conn| -> Result<f64, rusqlite::Error> {
                conn.query_row(
                    "SELECT vec_distance_cosine(vec_f32('[1,0,0]'), vec_f32('[0,1,0]'))",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!((distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Database::open_in_memory(3).await.unwrap();
        let result = db
            .connection()
            .call(|conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO turns (id, session_id, role, content, created_at)
                     VALUES ('t1', 'missing', 'user', 'hi', '2026-01-01T00:00:00.000Z')",
                    [],
                )
            })
            .await;
        assert!(result.is_err());
    }
}
