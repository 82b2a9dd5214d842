// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly for the Reverie memory engine.
//!
//! - [`TokenBudget`]: deterministic token counting and smart truncation
//! - [`ContextCompressor`]: query-focused LLM compression of long context
//! - [`ContextAssembler`]: combines context, history, and the current turn

pub mod assembler;
pub mod budget;
pub mod compression;

pub use assembler::{ContextAssembler, PromptMessages};
pub use budget::TokenBudget;
pub use compression::ContextCompressor;
