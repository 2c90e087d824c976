//! Query execution.
//!
//! A query string is analyzed with the index's analyzer, each token is
//! resolved to the postings of one or more terms, and the resulting posting
//! streams are merged into a [`Records`](crate::records::Records) result
//! set. [`SelectOptions`] choose how tokens expand, how sections are
//! weighted and how occurrences must relate to one another.
//!
//! # Example
//!
//! ```
//! use glaive::config::IndexConfig;
//! use glaive::index::{Index, Values};
//! use glaive::query::{SelectMode, SelectOptions};
//! use glaive::records::{Operator, RecordUnit, Records};
//!
//! # fn main() -> glaive::error::Result<()> {
//! let index = Index::create(IndexConfig::in_memory())?;
//! index.upd(b"doc1", None, Some("the quick brown fox"))?;
//! index.upd(b"doc2", None, Some("a quick red fox"))?;
//!
//! let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
//! index.select("quick brown", &mut records, Operator::Or, &SelectOptions::default())?;
//! assert_eq!(records.nhits(), 1);
//!
//! let near = SelectOptions::new(SelectMode::Near).with_max_interval(3);
//! let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
//! index.select("quick fox", &mut records, Operator::Or, &near)?;
//! assert_eq!(records.nhits(), 2);
//! # Ok(())
//! # }
//! ```

pub mod cursor_heap;
pub mod escalation;
pub mod position_tree;
pub mod select;
pub mod similar;
pub mod term_extract;
pub mod token;

use std::fmt;
use std::sync::Arc;

pub use self::select::Searcher;
pub use self::token::{Expansion, TokenInfo};

/// How query tokens are matched against the lexicon and against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Tokens must occur as a phrase.
    #[default]
    Exact,
    /// Like `Exact`, but the first token may match term endings and the
    /// last token term beginnings; a single token matches inside terms.
    Partial,
    /// The whole query as one token matched anywhere inside terms.
    Unsplit,
    /// Tokens must occur within `max_interval` positions of each other.
    ///
    /// Distances are raw document positions: in the text `cat dog` the two
    /// tokens are 1 apart whatever the query order. Engines that anchor NEAR
    /// at the query offsets behave like [`SelectMode::Near2`] here.
    Near,
    /// Like `Near`, with each token's distance taken relative to its
    /// place in the query.
    Near2,
    /// The last token matches term beginnings.
    Prefix,
    /// The first token matches term endings.
    Suffix,
    /// Documents sharing the rarest terms of the query text.
    Similar,
    /// Documents containing any lexicon term found in the query text.
    TermExtract,
}

/// Per-section weights applied to every hit.
#[derive(Clone, Default)]
pub enum Weights {
    /// Every section weighs 1.
    #[default]
    None,
    /// `vector[sid - 1]`; sections beyond the vector weigh 0.
    Static(Vec<i32>),
    /// Computed from the document key and section id.
    Dynamic(Arc<dyn Fn(&[u8], u32) -> i32 + Send + Sync>),
    /// Every section weighs the same.
    Constant(i32),
}

impl fmt::Debug for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weights::None => f.write_str("None"),
            Weights::Static(vector) => f.debug_tuple("Static").field(vector).finish(),
            Weights::Dynamic(_) => f.write_str("Dynamic(..)"),
            Weights::Constant(w) => f.debug_tuple("Constant").field(w).finish(),
        }
    }
}

/// What [`SelectMode::TermExtract`] records for each extracted term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermExtractPolicy {
    /// One record per occurrence in the query text, keyed by the term's
    /// byte offset; the result set is reopened at section unit.
    #[default]
    EachPost,
    /// One record per matching document.
    EachTerm,
}

/// Options of a select.
#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub mode: SelectMode,
    /// Widest window, in positions, allowed by NEAR modes.
    pub max_interval: i32,
    /// Number of terms `Similar` scans; 0 picks `n / 8 + 1`.
    pub similarity_threshold: usize,
    /// Extra terms `Similar` considers for each query token.
    pub similar_expansion: Expansion,
    pub term_extract: TermExtractPolicy,
    pub weights: Weights,
}

impl Default for SelectOptions {
    fn default() -> Self {
        SelectOptions {
            mode: SelectMode::Exact,
            max_interval: 0,
            similarity_threshold: 0,
            similar_expansion: Expansion::NONE,
            term_extract: TermExtractPolicy::default(),
            weights: Weights::None,
        }
    }
}

impl SelectOptions {
    pub fn new(mode: SelectMode) -> Self {
        SelectOptions {
            mode,
            ..Default::default()
        }
    }

    pub fn with_max_interval(mut self, max_interval: i32) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: usize) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_similar_expansion(mut self, expansion: Expansion) -> Self {
        self.similar_expansion = expansion;
        self
    }

    pub fn with_term_extract(mut self, policy: TermExtractPolicy) -> Self {
        self.term_extract = policy;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }
}
