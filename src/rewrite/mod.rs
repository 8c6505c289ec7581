//! Rewriting service contract
//!
//! The service cleans up dictated text (`process`) and applies spoken edit
//! instructions (`edit`). Calls are stateless and never fail past this
//! boundary: on any internal failure the outcome has `ok == false` and
//! carries the input text unchanged, so `text` is always a usable fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RewriteConfig;

/// Result of one rewriting call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    pub ok: bool,
    pub text: String,
}

impl RewriteOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    /// Failed call falling back to the unmodified input
    pub fn fallback(input: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: input.into(),
        }
    }
}

#[async_trait]
pub trait RewritingService: Send + Sync {
    /// Rewrite dictated text according to the configured prompt
    async fn process(&self, text: &str, config: &RewriteConfig) -> RewriteOutcome;

    /// Apply `instruction` to `original`
    async fn edit(&self, original: &str, instruction: &str, config: &RewriteConfig) -> RewriteOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_keeps_input() {
        let outcome = RewriteOutcome::fallback("raw words");
        assert!(!outcome.ok);
        assert_eq!(outcome.text, "raw words");
    }
}
