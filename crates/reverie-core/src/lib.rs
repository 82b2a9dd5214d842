// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Reverie memory engine.
//!
//! This crate provides the error type, shared domain types, adapter traits
//! for the embedding model and LLM provider, and the vector math used by
//! retrieval and storage.

pub mod error;
pub mod traits;
pub mod types;
pub mod vector;

pub use error::ReverieError;
pub use types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, Memory, PromptMessage,
    ProviderRequest, ProviderResponse, ResponseSchema, Role, Session, TokenUsage, Turn,
    now_timestamp,
};
pub use vector::{
    InvalidVectorError, VectorLiteral, cosine_distance, cosine_similarity, to_safe_vector_literal,
};

pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
