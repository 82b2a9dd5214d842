// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end memory engine tests.
//!
//! `TestHarness` assembles the full engine over a temp-dir SQLite database
//! with a [`MockProvider`] and [`MockEmbedder`].

use std::sync::Arc;

use reverie_config::ReverieConfig;
use reverie_core::ReverieError;
use reverie_memory::MemoryOrchestrator;
use reverie_storage::Database;

use crate::mock_embedder::MockEmbedder;
use crate::mock_provider::{MockProvider, MockReply};

/// Default embedding width for harness databases.
pub const TEST_DIMENSIONS: usize = 32;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<MockReply>,
    embedder: Option<MockEmbedder>,
    config: ReverieConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ReverieConfig::default();
        config.embedding.dimensions = TEST_DIMENSIONS;
        Self {
            replies: Vec::new(),
            embedder: None,
            config,
        }
    }

    /// Queue mock provider replies.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    /// Use a preconfigured embedder. Its dimension overrides the config's.
    pub fn with_embedder(mut self, embedder: MockEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, tweak: impl FnOnce(&mut ReverieConfig)) -> Self {
        tweak(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ReverieError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ReverieError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        let embedder = self
            .embedder
            .unwrap_or_else(|| MockEmbedder::new(config.embedding.dimensions));
        config.embedding.dimensions = reverie_core::EmbeddingAdapter::dimensions(&embedder);
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::open(
            &config.storage.database_path,
            config.embedding.dimensions,
            config.storage.wal_mode,
        )
        .await?;

        let provider = Arc::new(MockProvider::with_replies(self.replies));
        let embedder = Arc::new(embedder);
        let orchestrator = Arc::new(MemoryOrchestrator::new(
            &config,
            db.clone(),
            embedder.clone(),
            provider.clone(),
        )?);

        Ok(TestHarness {
            config,
            db,
            provider,
            embedder,
            orchestrator,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine wired to mocks, with its database in a temp directory.
pub struct TestHarness {
    pub config: ReverieConfig,
    pub db: Database,
    pub provider: Arc<MockProvider>,
    pub embedder: Arc<MockEmbedder>,
    pub orchestrator: Arc<MemoryOrchestrator>,
    /// Keeps the database directory alive for the harness lifetime.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }
}
