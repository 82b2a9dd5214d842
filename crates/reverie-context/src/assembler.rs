// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final prompt assembly: context block, truncated history, current turn.

use reverie_config::model::ContextConfig;
use reverie_core::{PromptMessage, ReverieError};
use tracing::debug;

use crate::budget::TokenBudget;
use crate::compression::ContextCompressor;

/// Messages ready to send, with their token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessages {
    pub messages: Vec<PromptMessage>,
    /// `TokenBudget::count_all` over `messages`.
    pub token_count: usize,
    /// Whether the context block went through compression.
    pub compressed: bool,
}

/// Builds the final message list within the model's input budget.
pub struct ContextAssembler {
    budget: TokenBudget,
    compressor: Option<ContextCompressor>,
    model: String,
    keep_recent: usize,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig, compressor: Option<ContextCompressor>) -> Result<Self, ReverieError> {
        Ok(Self {
            budget: TokenBudget::new(config)?,
            compressor,
            model: config.model.clone(),
            keep_recent: config.keep_recent,
        })
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Assemble `[context block] + history + user turn`.
    ///
    /// The context block becomes a leading system message (compressed first
    /// when oversized). History is truncated so the whole prompt fits
    /// `max_input_budget`; the current user turn is always included.
    pub async fn assemble(
        &self,
        context_block: &str,
        history: &[PromptMessage],
        user_turn: &str,
    ) -> PromptMessages {
        let mut compressed = false;
        let mut head = Vec::with_capacity(history.len() + 1);

        if !context_block.trim().is_empty() {
            let block = match &self.compressor {
                Some(compressor) if compressor.should_compress(context_block) => {
                    let out = compressor.compress(user_turn, context_block).await;
                    compressed = out != context_block;
                    out
                }
                _ => context_block.to_string(),
            };
            head.push(PromptMessage::system(block));
        }
        head.extend(history.iter().cloned());

        let current = PromptMessage::user(user_turn);
        let available = self
            .budget
            .max_input_budget(&self.model)
            .saturating_sub(self.budget.message_cost(&current));

        let mut messages = self.budget.smart_truncate(&head, available, self.keep_recent);
        messages.push(current);

        let token_count = self.budget.count_all(&messages);
        debug!(
            messages = messages.len(),
            token_count,
            compressed,
            "prompt assembled"
        );

        PromptMessages {
            messages,
            token_count,
            compressed,
        }
    }
}
