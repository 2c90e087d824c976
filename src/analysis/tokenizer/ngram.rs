//! N-gram tokenizer implementation.

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::Tokenizer;
use crate::error::{GlaiveError, Result};

/// A tokenizer that generates overlapping character n-grams.
///
/// One gram starts at every character, so the position of a gram is the
/// index of its first character. Grams near the end of the text are
/// shortened rather than dropped; whitespace is never part of a gram and
/// breaks the text into independent runs.
///
/// # Examples
///
/// ```
/// use glaive::analysis::tokenizer::ngram::NgramTokenizer;
/// use glaive::analysis::tokenizer::Tokenizer;
///
/// let tokenizer = NgramTokenizer::new(2).unwrap();
/// let tokens: Vec<_> = tokenizer.tokenize("abc").unwrap()
///     .map(|t| t.text)
///     .collect();
/// assert_eq!(tokens, vec!["ab", "bc", "c"]);
/// ```
#[derive(Clone, Debug)]
pub struct NgramTokenizer {
    n: usize,
}

impl NgramTokenizer {
    /// Create a new n-gram tokenizer.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(GlaiveError::invalid_argument("n-gram length must be at least 1"));
        }
        Ok(NgramTokenizer { n })
    }

    /// Create a bigram tokenizer (n=2).
    pub fn bigram() -> Self {
        NgramTokenizer { n: 2 }
    }

    /// Gram length.
    pub fn n(&self) -> usize {
        self.n
    }
}

impl Tokenizer for NgramTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for start in 0..chars.len() {
            if chars[start].1.is_whitespace() {
                continue;
            }
            let mut end = start;
            while end < chars.len() && end - start < self.n && !chars[end].1.is_whitespace() {
                end += 1;
            }
            let start_offset = chars[start].0;
            let end_offset = chars.get(end).map_or(text.len(), |&(i, _)| i);
            tokens.push(Token::with_offsets(
                &text[start_offset..end_offset],
                position,
                start_offset,
                end_offset,
            ));
            position += 1;
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "ngram"
    }

    fn min_token_chars(&self) -> usize {
        self.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokenizer: &NgramTokenizer, text: &str) -> Vec<String> {
        tokenizer.tokenize(text).unwrap().map(|t| t.text).collect()
    }

    #[test]
    fn test_ngram_creation() {
        assert!(NgramTokenizer::new(0).is_err());
        assert_eq!(NgramTokenizer::bigram().n(), 2);
    }

    #[test]
    fn test_bigrams() {
        let tokenizer = NgramTokenizer::bigram();
        assert_eq!(texts(&tokenizer, "hello"), vec!["he", "el", "ll", "lo", "o"]);
    }

    #[test]
    fn test_whitespace_breaks_runs() {
        let tokenizer = NgramTokenizer::bigram();
        let tokens: Vec<Token> = tokenizer.tokenize("ab cd").unwrap().collect();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "b", "cd", "d"]);
        assert_eq!(tokens[2].start_offset, 3);
    }

    #[test]
    fn test_multibyte() {
        let tokenizer = NgramTokenizer::new(3).unwrap();
        assert_eq!(texts(&tokenizer, "日本語だ"), vec!["日本語", "本語だ", "語だ", "だ"]);
    }
}
