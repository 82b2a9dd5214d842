// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting and budget-aware truncation of message history.
//!
//! Counting uses the `cl100k_base` BPE, so results are deterministic for a
//! given text. A message costs its content tokens plus a fixed overhead.

use std::collections::HashMap;
use std::sync::Arc;

use reverie_config::model::ContextConfig;
use reverie_core::{PromptMessage, ReverieError, Role};
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Context windows of known models. Prefix match, first hit wins.
const MODEL_CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("claude-", 200_000),
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
];

/// Token counter and truncation policy.
#[derive(Clone)]
pub struct TokenBudget {
    bpe: Arc<CoreBPE>,
    message_overhead: usize,
    response_reserve: usize,
    default_context_limit: usize,
}

impl std::fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudget")
            .field("message_overhead", &self.message_overhead)
            .field("response_reserve", &self.response_reserve)
            .field("default_context_limit", &self.default_context_limit)
            .finish_non_exhaustive()
    }
}

impl TokenBudget {
    pub fn new(config: &ContextConfig) -> Result<Self, ReverieError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| ReverieError::Internal(format!("failed to load tokenizer: {e}")))?;
        Ok(Self {
            bpe: Arc::new(bpe),
            message_overhead: config.message_overhead,
            response_reserve: config.response_reserve,
            default_context_limit: config.context_limit,
        })
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Tokens for one message, including the per-message overhead.
    pub fn message_cost(&self, message: &PromptMessage) -> usize {
        self.count(&message.content) + self.message_overhead
    }

    /// Sum of per-message costs.
    pub fn count_all(&self, messages: &[PromptMessage]) -> usize {
        messages.iter().map(|m| self.message_cost(m)).sum()
    }

    /// Input tokens available for `model`: its context window minus the response reserve.
    pub fn max_input_budget(&self, model: &str) -> usize {
        let limit = MODEL_CONTEXT_LIMITS
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map(|(_, limit)| *limit)
            .unwrap_or(self.default_context_limit);
        limit.saturating_sub(self.response_reserve)
    }

    /// Longest prefix of `text` that counts at most `max_tokens`.
    pub fn fit(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        let mut n = max_tokens;
        while n > 0 {
            // A cut can split a multi-byte character; step back until it decodes
            // and re-counts within the limit.
            if let Ok(prefix) = self.bpe.decode(tokens[..n].to_vec())
                && self.count(&prefix) <= max_tokens
            {
                return prefix;
            }
            n -= 1;
        }
        String::new()
    }

    /// Truncate `history` so that `count_all(result) <= budget`.
    ///
    /// - System messages are always kept. If they alone exceed the budget,
    ///   the oldest are shortened (or dropped) first and only system
    ///   messages are returned.
    /// - The last `keep_recent` non-system messages are kept next. If they
    ///   overflow, the oldest of them are shortened first.
    /// - Older messages are then added newest-first until the next one no
    ///   longer fits.
    ///
    /// Output preserves the input order.
    pub fn smart_truncate(
        &self,
        history: &[PromptMessage],
        budget: usize,
        keep_recent: usize,
    ) -> Vec<PromptMessage> {
        let costs: Vec<usize> = history.iter().map(|m| self.message_cost(m)).collect();
        let system: Vec<usize> = (0..history.len())
            .filter(|&i| history[i].role == Role::System)
            .collect();
        let others: Vec<usize> = (0..history.len())
            .filter(|&i| history[i].role != Role::System)
            .collect();

        let mut kept: HashMap<usize, Option<String>> = HashMap::new();

        let system_total: usize = system.iter().map(|&i| costs[i]).sum();
        if system_total > budget {
            self.shrink_oldest(history, &costs, &system, system_total - budget, &mut kept);
            debug!(budget, system_total, "system messages exceed budget");
            return emit(history, &kept);
        }
        for &i in &system {
            kept.insert(i, None);
        }
        let mut remaining = budget - system_total;

        let split = others.len().saturating_sub(keep_recent);
        let (older, recent) = others.split_at(split);
        let recent_total: usize = recent.iter().map(|&i| costs[i]).sum();
        if recent_total > remaining {
            self.shrink_oldest(history, &costs, recent, recent_total - remaining, &mut kept);
            debug!(budget, recent_total, "recent messages truncated to fit");
            return emit(history, &kept);
        }
        for &i in recent {
            kept.insert(i, None);
        }
        remaining -= recent_total;

        let mut dropped = 0usize;
        for (pos, &i) in older.iter().enumerate().rev() {
            if costs[i] > remaining {
                dropped = pos + 1;
                break;
            }
            kept.insert(i, None);
            remaining -= costs[i];
        }

        if dropped > 0 {
            debug!(dropped, budget, "older messages dropped");
        }
        emit(history, &kept)
    }

    /// Keep every index in `group`, shortening from the oldest until `excess`
    /// tokens have been freed. Messages shortened to nothing are dropped.
    fn shrink_oldest(
        &self,
        history: &[PromptMessage],
        costs: &[usize],
        group: &[usize],
        excess: usize,
        kept: &mut HashMap<usize, Option<String>>,
    ) {
        let mut excess = excess;
        for &i in group {
            if excess == 0 {
                kept.insert(i, None);
                continue;
            }
            if costs[i] <= excess {
                excess -= costs[i];
                continue;
            }
            let content_tokens = costs[i] - self.message_overhead;
            if content_tokens <= excess {
                // Emptying the content frees too little; drop the message.
                excess = excess.saturating_sub(costs[i]);
                continue;
            }
            let target = content_tokens - excess;
            let shortened = self.fit(&history[i].content, target);
            kept.insert(i, Some(shortened));
            excess = 0;
        }
    }
}

fn emit(history: &[PromptMessage], kept: &HashMap<usize, Option<String>>) -> Vec<PromptMessage> {
    history
        .iter()
        .enumerate()
        .filter_map(|(i, m)| match kept.get(&i) {
            Some(Some(content)) => Some(PromptMessage::new(m.role, content.clone())),
            Some(None) => Some(m.clone()),
            None => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn budget() -> TokenBudget {
        TokenBudget::new(&ContextConfig::default()).unwrap()
    }

    fn msg(role: Role, text: &str) -> PromptMessage {
        PromptMessage::new(role, text)
    }

    #[test]
    fn count_is_deterministic() {
        let b = budget();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(b.count(text), b.count(text));
        assert!(b.count(text) > 0);
        assert_eq!(b.count(""), 0);
    }

    #[test]
    fn count_all_adds_overhead() {
        let b = budget();
        let messages = vec![msg(Role::User, "hello"), msg(Role::Assistant, "")];
        assert_eq!(b.count_all(&messages), b.count("hello") + 4 + 4);
    }

    #[test]
    fn max_input_budget_subtracts_reserve() {
        let b = budget();
        assert_eq!(b.max_input_budget("claude-sonnet-4-20250514"), 200_000 - 4096);
        assert_eq!(b.max_input_budget("gpt-4o-mini"), 128_000 - 4096);
        assert_eq!(b.max_input_budget("unknown-model"), 200_000 - 4096);
    }

    #[test]
    fn fit_returns_prefix_within_limit() {
        let b = budget();
        let text = "one two three four five six seven eight nine ten";
        let fitted = b.fit(text, 3);
        assert!(b.count(&fitted) <= 3);
        assert!(text.starts_with(&fitted));
        assert_eq!(b.fit(text, 1000), text);
        assert_eq!(b.fit(text, 0), "");
    }

    #[test]
    fn fit_handles_multibyte_text() {
        let b = budget();
        let text = "日本語のテキストを切り詰めるテストです。";
        let fitted = b.fit(text, 5);
        assert!(b.count(&fitted) <= 5);
        assert!(text.starts_with(&fitted));
    }

    #[test]
    fn everything_fits_unchanged() {
        let b = budget();
        let history = vec![
            msg(Role::System, "be helpful"),
            msg(Role::User, "hi"),
            msg(Role::Assistant, "hello"),
        ];
        assert_eq!(b.smart_truncate(&history, 10_000, 4), history);
    }

    #[test]
    fn older_messages_dropped_first() {
        let b = budget();
        let history: Vec<_> = (0..10)
            .map(|i| msg(if i % 2 == 0 { Role::User } else { Role::Assistant }, &format!("message number {i}")))
            .collect();
        let recent_cost = b.count_all(&history[6..]);
        let one_more = b.message_cost(&history[5]);

        let out = b.smart_truncate(&history, recent_cost + one_more, 4);
        assert_eq!(out, history[5..].to_vec());
    }

    #[test]
    fn stops_at_first_older_message_that_does_not_fit() {
        let b = budget();
        let history = vec![
            msg(Role::User, "short"),
            msg(Role::Assistant, &"long ".repeat(200)),
            msg(Role::User, "recent"),
        ];
        let budget_tokens = b.message_cost(&history[2]) + b.message_cost(&history[0]);
        let out = b.smart_truncate(&history, budget_tokens, 1);
        assert_eq!(out, vec![history[2].clone()]);
    }

    #[test]
    fn system_overflow_truncates_oldest_system() {
        let b = budget();
        let history = vec![
            msg(Role::System, &"alpha ".repeat(100)),
            msg(Role::System, "keep me"),
            msg(Role::User, "hello"),
        ];
        let limit = b.message_cost(&history[1]) + 20;
        let out = b.smart_truncate(&history, limit, 4);

        assert!(out.iter().all(|m| m.role == Role::System));
        assert_eq!(out.last().unwrap().content, "keep me");
        assert!(b.count_all(&out) <= limit);
    }

    #[test]
    fn recent_overflow_truncates_oldest_recent() {
        let b = budget();
        let history = vec![
            msg(Role::System, "sys"),
            msg(Role::User, &"words ".repeat(300)),
            msg(Role::Assistant, "final answer"),
        ];
        let limit = b.message_cost(&history[0]) + b.message_cost(&history[2]) + 30;
        let out = b.smart_truncate(&history, limit, 4);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], history[0]);
        assert_eq!(out[2], history[2]);
        assert!(out[1].content.len() < history[1].content.len());
        assert!(b.count_all(&out) <= limit);
    }

    fn arb_history() -> impl Strategy<Value = Vec<PromptMessage>> {
        prop::collection::vec(
            (0u8..3, "[a-z ]{0,60}").prop_map(|(r, text)| {
                let role = match r {
                    0 => Role::System,
                    1 => Role::User,
                    _ => Role::Assistant,
                };
                PromptMessage::new(role, text)
            }),
            0..12,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn truncation_respects_budget(history in arb_history(), limit in 0usize..200, keep in 0usize..6) {
            let b = budget();
            let out = b.smart_truncate(&history, limit, keep);
            prop_assert!(b.count_all(&out) <= limit);
        }

        #[test]
        fn recent_kept_verbatim_when_they_fit(history in arb_history(), extra in 0usize..100, keep in 0usize..6) {
            let b = budget();
            let system: Vec<_> = history.iter().filter(|m| m.role == Role::System).cloned().collect();
            let others: Vec<_> = history.iter().filter(|m| m.role != Role::System).cloned().collect();
            let recent = &others[others.len().saturating_sub(keep)..];
            let limit = b.count_all(&system) + b.count_all(recent) + extra;

            let out = b.smart_truncate(&history, limit, keep);
            for m in recent {
                prop_assert!(out.contains(m));
            }
            for m in &system {
                prop_assert!(out.contains(m));
            }
        }
    }
}
