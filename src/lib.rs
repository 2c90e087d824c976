//! # Glaive
//!
//! An embeddable full-text search engine.
//!
//! ## Features
//!
//! - Segmented postings store: small term lists live inline in the term
//!   array, growing ones in skip-linked buffers that are flushed into
//!   delta-compressed chunks
//! - Memory-mapped file storage or plain heap storage
//! - Phrase, NEAR, prefix, suffix and infix queries evaluated by a
//!   driver-first merge of posting streams
//! - Result sets with boolean composition, sorting and grouping
//! - Similarity search and term extraction
//!
//! ## Example
//!
//! ```
//! use glaive::prelude::*;
//!
//! # fn main() -> glaive::error::Result<()> {
//! let index = Index::create(IndexConfig::in_memory())?;
//! index.upd(b"doc1", None, Some("The quick brown fox"))?;
//!
//! let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
//! index.select("QUICK brown", &mut records, Operator::Or, &SelectOptions::default())?;
//! records.sort(10, SortOrder::Descending)?;
//! assert_eq!(records.next().map(|r| r.score), Some(1));
//! assert_eq!(records.curr_key().as_deref(), Some(&b"doc1"[..]));
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod index;
pub mod lexicon;
pub mod postings;
pub mod query;
pub mod records;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::config::IndexConfig;
    pub use crate::error::{GlaiveError, Result};
    pub use crate::index::{Index, Values};
    pub use crate::query::{SelectMode, SelectOptions, Weights};
    pub use crate::records::{Operator, RecordUnit, Records, SortOrder};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
