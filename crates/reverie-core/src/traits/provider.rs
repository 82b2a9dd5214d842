// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider adapter trait.

use async_trait::async_trait;

use crate::error::ReverieError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for an LLM completion backend.
///
/// When the request carries a `response_schema`, the provider should fill
/// `ProviderResponse::structured`. Callers tolerate a response that ignores
/// the schema and returns free text instead.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError>;
}
