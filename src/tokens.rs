//! Token estimation for chunk budgets.
//!
//! Uses tiktoken-rs for OpenAI-compatible counts where the model family is
//! known, and a character heuristic everywhere else.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Model family used for estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenModel {
    /// cl100k_base: GPT-4, GPT-3.5-turbo
    Cl100kBase,
    /// o200k_base: GPT-4o, o1, o3
    O200kBase,
    /// ~4 characters per token.
    #[default]
    Heuristic,
}

impl std::fmt::Display for TokenModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenModel::Cl100kBase => write!(f, "cl100k_base"),
            TokenModel::O200kBase => write!(f, "o200k_base"),
            TokenModel::Heuristic => write!(f, "heuristic"),
        }
    }
}

impl TokenModel {
    /// Resolve a model or encoding name. Unknown names use the heuristic.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "cl100k" | "cl100k_base" => return TokenModel::Cl100kBase,
            "o200k" | "o200k_base" => return TokenModel::O200kBase,
            _ => {}
        }
        if name.starts_with("gpt-4o")
            || name.starts_with("gpt-4.1")
            || name.starts_with("o1")
            || name.starts_with("o3")
            || name.starts_with("o4")
        {
            TokenModel::O200kBase
        } else if name.starts_with("gpt-4") || name.starts_with("gpt-3.5") {
            TokenModel::Cl100kBase
        } else {
            TokenModel::Heuristic
        }
    }
}

// Cached tokenizers - initialized once per encoding
static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_tokenizer(model: TokenModel) -> Option<&'static CoreBPE> {
    match model {
        TokenModel::Cl100kBase => CL100K
            .get_or_init(|| tiktoken_rs::cl100k_base().ok())
            .as_ref(),
        TokenModel::O200kBase => O200K
            .get_or_init(|| tiktoken_rs::o200k_base().ok())
            .as_ref(),
        TokenModel::Heuristic => None,
    }
}

fn tiktoken_count(text: &str, model: TokenModel) -> Option<usize> {
    let bpe = get_tokenizer(model)?;
    Some(bpe.encode_ordinary(text).len())
}

/// Fallback heuristic: ~4 characters per token, rounded up.
fn fallback_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimates token counts. Never fails; deterministic for a given input.
///
/// # Examples
///
/// ```
/// use repodigest::tokens::TokenAnalyzer;
///
/// let analyzer = TokenAnalyzer::new();
/// assert!(analyzer.estimate("Hello, world!", "gpt-4o") > 0);
/// assert_eq!(analyzer.estimate("", "anything"), 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAnalyzer;

impl TokenAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for `text` under the named model.
    pub fn estimate(&self, text: &str, model: &str) -> usize {
        self.estimate_with(text, TokenModel::from_name(model))
    }

    /// Estimate tokens for `text` under a resolved model family.
    pub fn estimate_with(&self, text: &str, model: TokenModel) -> usize {
        if text.is_empty() {
            return 0;
        }
        tiktoken_count(text, model).unwrap_or_else(|| fallback_count(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_string() {
        let analyzer = TokenAnalyzer::new();
        assert_eq!(analyzer.estimate("", "gpt-4o"), 0);
        assert_eq!(analyzer.estimate("", "claude"), 0);
    }

    #[test]
    fn test_simple_text() {
        let count = TokenAnalyzer::new().estimate("Hello, world!", "cl100k");
        assert!(count > 0 && count < 10);
    }

    #[test]
    fn test_fallback_approximation() {
        assert_eq!(fallback_count(""), 0);
        assert_eq!(fallback_count("a"), 1);
        assert_eq!(fallback_count("abcd"), 1);
        assert_eq!(fallback_count("abcde"), 2);
        assert_eq!(fallback_count("abcdefgh"), 2);
    }

    #[test]
    fn test_unknown_model_uses_heuristic() {
        let analyzer = TokenAnalyzer::new();
        assert_eq!(analyzer.estimate("abcdefgh", "claude-3-opus"), 2);
        assert_eq!(analyzer.estimate("abcdefgh", ""), 2);
    }

    #[test]
    fn test_model_from_name() {
        assert_eq!(TokenModel::from_name("gpt-4o-mini"), TokenModel::O200kBase);
        assert_eq!(TokenModel::from_name("o200k_base"), TokenModel::O200kBase);
        assert_eq!(TokenModel::from_name("GPT-4-turbo"), TokenModel::Cl100kBase);
        assert_eq!(TokenModel::from_name("gpt-3.5-turbo"), TokenModel::Cl100kBase);
        assert_eq!(TokenModel::from_name("gemini-pro"), TokenModel::Heuristic);
    }

    proptest! {
        #[test]
        fn estimate_is_deterministic(s in "[a-zA-Z0-9 \n]{0,200}") {
            let analyzer = TokenAnalyzer::new();
            prop_assert_eq!(analyzer.estimate(&s, "gpt-4"), analyzer.estimate(&s, "gpt-4"));
            prop_assert_eq!(analyzer.estimate(&s, "other"), fallback_count(&s));
        }
    }
}
