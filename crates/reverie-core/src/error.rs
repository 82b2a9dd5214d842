// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Reverie memory engine.

use thiserror::Error;

use crate::vector::InvalidVectorError;

/// The primary error type used across all Reverie adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ReverieError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, token limits, malformed output).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding generation failed or returned an unusable result.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// A vector failed validation and must not reach storage.
    #[error(transparent)]
    InvalidVector(#[from] InvalidVectorError),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReverieError {
    /// Convenience constructor for provider errors without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        ReverieError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Convenience constructor for embedding errors.
    pub fn embedding(message: impl Into<String>) -> Self {
        ReverieError::Embedding {
            message: message.into(),
        }
    }
}
