//! Tokenizer implementations for text analysis.
//!
//! - [`unicode_word::UnicodeWordTokenizer`] - Uses Unicode word boundaries
//! - [`ngram::NgramTokenizer`] - Overlapping character n-grams
//!
//! # Examples
//!
//! ```
//! use glaive::analysis::tokenizer::Tokenizer;
//! use glaive::analysis::tokenizer::unicode_word::UnicodeWordTokenizer;
//!
//! let tokenizer = UnicodeWordTokenizer::new();
//! let tokens: Vec<_> = tokenizer.tokenize("Hello world").unwrap().collect();
//! assert_eq!(tokens.len(), 2);
//! assert_eq!(tokens[1].position, 1);
//! ```

pub mod ngram;
pub mod unicode_word;

use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Trait for tokenizers that convert text into tokens.
///
/// Positions are assigned by the tokenizer and become the positions stored
/// in postings, so phrase and NEAR queries depend on them being dense.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text into a stream of tokens.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;

    /// Length below which a trailing query token should be matched as a prefix.
    fn min_token_chars(&self) -> usize {
        1
    }
}
