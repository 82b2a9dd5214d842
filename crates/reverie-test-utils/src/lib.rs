// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Reverie integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without model files or network access.
//!
//! # Components
//!
//! - [`MockProvider`] - LLM provider that replays queued replies and records requests
//! - [`MockEmbedder`] - deterministic bag-of-words embedder with failure injection
//! - [`TestHarness`] - temp-dir database wired into a [`reverie_memory::MemoryOrchestrator`]

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_embedder::MockEmbedder;
pub use mock_provider::{MockProvider, MockReply};
