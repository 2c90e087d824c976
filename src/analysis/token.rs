//! Token type produced by tokenizers.

use std::fmt;

/// A single token with its position in the token stream and its byte range
/// in the (normalized) source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token's text content.
    pub text: String,
    /// Position in the token stream (0-based).
    pub position: u32,
    /// Byte offset of the first character.
    pub start_offset: usize,
    /// Byte offset one past the last character.
    pub end_offset: usize,
}

impl Token {
    /// Create a token without offsets.
    pub fn new<S: Into<String>>(text: S, position: u32) -> Self {
        let text = text.into();
        let end_offset = text.len();
        Token {
            text,
            position,
            start_offset: 0,
            end_offset,
        }
    }

    /// Create a token spanning `start..end` of the source.
    pub fn with_offsets<S: Into<String>>(text: S, position: u32, start: usize, end: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: start,
            end_offset: end,
        }
    }

    /// Number of characters in the token.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.text, self.position)
    }
}

/// A boxed iterator of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;
