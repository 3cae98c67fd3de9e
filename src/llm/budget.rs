//! Content budget derivation from a backend's context window
//!
//! No real tokenizer is involved: the 4-characters-per-token factor is a
//! deliberately conservative approximation, so the derived character ceiling
//! errs on the side of under-filling the context window.

use thiserror::Error;

/// Coarse approximation factor between characters and tokens.
pub const CHARS_PER_TOKEN: u32 = 4;

/// Tokens reserved for the instruction/system portion of every prompt.
pub const PROMPT_OVERHEAD_TOKENS: u32 = 500;

/// Tokens reserved for the generated response.
pub const RESPONSE_RESERVE_TOKENS: u32 = 1024;

/// Budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error(
        "context window of {context_window} tokens leaves {content_tokens} tokens for content \
         after {overhead} prompt overhead and {reserve} response reserve"
    )]
    NonPositiveBudget {
        context_window: u32,
        content_tokens: i64,
        overhead: u32,
        reserve: u32,
    },
}

/// Usable content budget derived from a model's context window.
///
/// Effectively constant for the lifetime of one client; recompute when the
/// backend configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub context_window_tokens: u32,
    pub prompt_overhead_tokens: u32,
    pub response_reserve_tokens: u32,
    pub chars_per_token: u32,
}

impl ContextBudget {
    /// Create a budget with the fixed overhead/reserve constants.
    pub fn new(context_window_tokens: u32) -> Self {
        Self {
            context_window_tokens,
            prompt_overhead_tokens: PROMPT_OVERHEAD_TOKENS,
            response_reserve_tokens: RESPONSE_RESERVE_TOKENS,
            chars_per_token: CHARS_PER_TOKEN,
        }
    }

    /// Tokens available for content in a single generation call. May be
    /// negative when the context window is misconfigured too small.
    pub fn max_content_tokens(&self) -> i64 {
        self.context_window_tokens as i64
            - self.prompt_overhead_tokens as i64
            - self.response_reserve_tokens as i64
    }

    /// Hard ceiling, in characters, on content passed to one generation call.
    /// Zero when the token budget is non-positive; callers must `validate()`
    /// before relying on this.
    pub fn max_content_chars(&self) -> usize {
        let tokens = self.max_content_tokens();
        if tokens <= 0 {
            0
        } else {
            tokens as usize * self.chars_per_token as usize
        }
    }

    /// Detect a misconfigured window before any generation call is attempted.
    pub fn validate(&self) -> Result<(), BudgetError> {
        let content_tokens = self.max_content_tokens();
        if content_tokens <= 0 {
            return Err(BudgetError::NonPositiveBudget {
                context_window: self.context_window_tokens,
                content_tokens,
                overhead: self.prompt_overhead_tokens,
                reserve: self.response_reserve_tokens,
            });
        }
        Ok(())
    }

    /// Rough token estimate for a piece of text.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / self.chars_per_token as usize
    }
}
