//! Text analysis for Glaive.
//!
//! An [`Analyzer`] pairs a [`tokenizer::Tokenizer`] with optional lowercase
//! normalization. Documents and queries of one index always go through the
//! same analyzer so their tokens line up; the [`lexer::Lexer`] then maps
//! tokens to term ids.

pub mod lexer;
pub mod token;
pub mod tokenizer;

use crate::config::{IndexConfig, TokenizerKind};
use crate::error::Result;

use self::token::Token;
use self::tokenizer::Tokenizer;
use self::tokenizer::ngram::NgramTokenizer;
use self::tokenizer::unicode_word::UnicodeWordTokenizer;

/// Tokenizer plus normalization.
pub struct Analyzer {
    tokenizer: Box<dyn Tokenizer>,
    normalize: bool,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("tokenizer", &self.tokenizer.name())
            .field("normalize", &self.normalize)
            .finish()
    }
}

impl Analyzer {
    /// Create an analyzer from its parts.
    pub fn new(tokenizer: Box<dyn Tokenizer>, normalize: bool) -> Self {
        Analyzer {
            tokenizer,
            normalize,
        }
    }

    /// The analyzer an index with `config` uses.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let tokenizer: Box<dyn Tokenizer> = match config.tokenizer {
            TokenizerKind::Word => Box::new(UnicodeWordTokenizer::new()),
            TokenizerKind::Ngram(n) => Box::new(NgramTokenizer::new(n)?),
        };
        Ok(Analyzer::new(tokenizer, config.flags.normalize))
    }

    /// The underlying tokenizer.
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Normalize `text` the way tokens are normalized.
    pub fn normalize(&self, text: &str) -> String {
        if self.normalize {
            text.to_lowercase()
        } else {
            text.to_string()
        }
    }

    /// Normalize and tokenize `text`.
    pub fn analyze(&self, text: &str) -> Result<Vec<Token>> {
        self.tokenize_normalized(&self.normalize(text))
    }

    pub(crate) fn tokenize_normalized(&self, normalized: &str) -> Result<Vec<Token>> {
        Ok(self.tokenizer.tokenize(normalized)?.collect())
    }
}
