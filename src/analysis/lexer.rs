//! Lexer turning analyzed text into term ids.
//!
//! The lexer walks the tokens of one text and resolves each against a
//! lexicon. On the indexing side unknown tokens are added; on the query side
//! an unknown token stops the walk with [`LexStatus::NotFound`], which query
//! token resolution uses to fall back to raw text matching.

use crate::analysis::Analyzer;
use crate::analysis::token::Token;
use crate::error::Result;
use crate::lexicon::SymbolTable;

/// Progress of a lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexStatus {
    /// More tokens follow the current one.
    Doing,
    /// The current token was the last one (or there were none).
    Done,
    /// The current token is not in the lexicon.
    NotFound,
}

/// Whether the lexer feeds an update or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    /// Every token, unknown ones are added to the lexicon.
    Add,
    /// Tokens a query should match; tails of n-gram runs are dropped.
    Query,
}

/// Token walker over one text.
#[derive(Debug)]
pub struct Lexer {
    orig: String,
    tokens: Vec<Token>,
    next: usize,
    status: LexStatus,
    force_prefix: bool,
}

impl Lexer {
    /// Analyze `text` and prepare to walk its tokens.
    pub fn open(analyzer: &Analyzer, text: &str, mode: LexMode) -> Result<Self> {
        let orig = analyzer.normalize(text);
        let mut tokens = analyzer.tokenize_normalized(&orig)?;
        let mut force_prefix = false;

        if mode == LexMode::Query {
            let min_chars = analyzer.tokenizer().min_token_chars();
            let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());
            for token in tokens {
                let is_tail = token.char_len() < min_chars
                    && kept.last().is_some_and(|prev| prev.end_offset == token.end_offset);
                if !is_tail {
                    kept.push(token);
                }
            }
            tokens = kept;
            force_prefix = tokens.last().is_some_and(|t| t.char_len() < min_chars)
                || orig.trim_end().ends_with('*');
        }

        let status = if tokens.is_empty() {
            LexStatus::Done
        } else {
            LexStatus::Doing
        };
        Ok(Lexer {
            orig,
            tokens,
            next: 0,
            status,
            force_prefix,
        })
    }

    /// The normalized source text.
    pub fn orig(&self) -> &str {
        &self.orig
    }

    /// Current status.
    pub fn status(&self) -> LexStatus {
        self.status
    }

    /// Whether the last query token should be expanded as a prefix.
    pub fn force_prefix(&self) -> bool {
        self.force_prefix
    }

    /// Number of tokens the walk will visit.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the text produced no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The token most recently returned.
    pub fn token(&self) -> Option<&Token> {
        self.next.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    /// Position of the token most recently returned.
    pub fn pos(&self) -> u32 {
        self.token().map_or(0, |t| t.position)
    }

    /// Advance and look the token up without modifying the lexicon.
    pub fn next_lookup(&mut self, lexicon: &SymbolTable) -> Option<u32> {
        let token = self.advance()?;
        let id = lexicon.get(token.text.as_bytes());
        self.settle(id.is_some());
        id
    }

    /// Advance and intern the token.
    pub fn next_add(&mut self, lexicon: &mut SymbolTable) -> Result<Option<u32>> {
        let Some(token) = self.advance() else {
            return Ok(None);
        };
        let id = lexicon.get_or_insert(token.text.as_bytes())?;
        self.settle(true);
        Ok(Some(id))
    }

    fn advance(&mut self) -> Option<&Token> {
        if self.status != LexStatus::Doing {
            return None;
        }
        let token = self.tokens.get(self.next)?;
        self.next += 1;
        Some(token)
    }

    fn settle(&mut self, found: bool) {
        self.status = if !found {
            LexStatus::NotFound
        } else if self.next >= self.tokens.len() {
            LexStatus::Done
        } else {
            LexStatus::Doing
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tokenizer::ngram::NgramTokenizer;
    use crate::analysis::tokenizer::unicode_word::UnicodeWordTokenizer;

    fn word_analyzer() -> Analyzer {
        Analyzer::new(Box::new(UnicodeWordTokenizer::new()), true)
    }

    #[test]
    fn test_add_mode_interns_tokens() {
        let mut lexicon = SymbolTable::new(0, false);
        let mut lexer = Lexer::open(&word_analyzer(), "Cat dog CAT", LexMode::Add).unwrap();
        let mut ids = Vec::new();
        while let Some(id) = lexer.next_add(&mut lexicon).unwrap() {
            ids.push((id, lexer.pos()));
        }
        assert_eq!(ids, vec![(1, 0), (2, 1), (1, 2)]);
        assert_eq!(lexer.status(), LexStatus::Done);
    }

    #[test]
    fn test_query_mode_stops_on_unknown() {
        let mut lexicon = SymbolTable::new(0, false);
        lexicon.get_or_insert(b"cat").unwrap();
        let mut lexer = Lexer::open(&word_analyzer(), "cat bird dog", LexMode::Query).unwrap();

        assert_eq!(lexer.next_lookup(&lexicon), Some(1));
        assert_eq!(lexer.status(), LexStatus::Doing);
        assert_eq!(lexer.next_lookup(&lexicon), None);
        assert_eq!(lexer.status(), LexStatus::NotFound);
        assert_eq!(lexer.token().map(|t| t.text.as_str()), Some("bird"));
        assert_eq!(lexer.next_lookup(&lexicon), None);
    }

    #[test]
    fn test_empty_text_is_done() {
        let lexer = Lexer::open(&word_analyzer(), "  ,, ", LexMode::Query).unwrap();
        assert_eq!(lexer.status(), LexStatus::Done);
        assert!(lexer.is_empty());
    }

    #[test]
    fn test_trailing_star_forces_prefix() {
        let lexer = Lexer::open(&word_analyzer(), "data*", LexMode::Query).unwrap();
        assert!(lexer.force_prefix());
        let lexer = Lexer::open(&word_analyzer(), "data", LexMode::Query).unwrap();
        assert!(!lexer.force_prefix());
    }

    #[test]
    fn test_query_mode_drops_ngram_tails() {
        let analyzer = Analyzer::new(Box::new(NgramTokenizer::bigram()), true);
        let lexer = Lexer::open(&analyzer, "abc", LexMode::Query).unwrap();
        assert_eq!(lexer.len(), 2);
        assert!(!lexer.force_prefix());

        let lexer = Lexer::open(&analyzer, "ab c", LexMode::Query).unwrap();
        let texts: Vec<&str> = lexer.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "c"]);
        assert!(lexer.force_prefix());

        let lexer = Lexer::open(&analyzer, "abc", LexMode::Add).unwrap();
        assert_eq!(lexer.len(), 3);
    }
}
