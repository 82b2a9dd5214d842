// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the external capabilities the memory engine consumes.
//!
//! All adapters extend [`PluginAdapter`] and use `#[async_trait]` so they
//! can be held as `Arc<dyn ...>`.

pub mod adapter;
pub mod embedding;
pub mod provider;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use provider::ProviderAdapter;
