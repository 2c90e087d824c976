//! Index configuration.
//!
//! An [`IndexConfig`] is chosen at creation time and persisted next to the
//! index as `meta.json`, so reopening restores the same key width, flags,
//! tokenizer and segment sizing.

use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};
use crate::storage::StorageConfig;

/// Hard limit on logical segments of a postings store.
pub const MAX_SEGMENTS: usize = 0x4000;

/// Default number of initial segments.
pub const DEFAULT_INITIAL_N_SEGMENTS: usize = 512;

/// Ratio between chunk units and initial segments.
pub const MAX_CHUNK_RATIO: usize = 64;

/// Behavioural switches of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFlags {
    /// Keep a reversed lexicon so `Suffix`/`Partial` queries can enumerate
    /// terms by their ending.
    pub enable_suffix_search: bool,

    /// Tokenize into n-grams instead of words.
    pub ngram: bool,

    /// Lowercase text before tokenizing.
    pub normalize: bool,
}

impl Default for IndexFlags {
    fn default() -> Self {
        IndexFlags {
            enable_suffix_search: true,
            ngram: false,
            normalize: true,
        }
    }
}

/// Which tokenizer splits documents and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TokenizerKind {
    /// Unicode word boundaries.
    #[default]
    Word,
    /// Overlapping character n-grams of the given length.
    Ngram(usize),
}

/// Sizing of a postings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingsConfig {
    /// Segments reserved for round-robin buffer placement.
    pub initial_n_segments: usize,

    /// Upper bound on logical segments.
    pub max_segments: usize,
}

impl PostingsConfig {
    /// Sizing for `initial_n_segments`, clamped to the segment maximum.
    pub fn new(initial_n_segments: usize) -> Self {
        let initial = initial_n_segments.clamp(1, MAX_SEGMENTS);
        PostingsConfig {
            initial_n_segments: initial,
            max_segments: MAX_SEGMENTS,
        }
    }

    /// Maximum number of chunk units the store may allocate.
    pub fn max_chunk_units(&self) -> usize {
        self.initial_n_segments * MAX_CHUNK_RATIO
    }

    /// Mapped segment count above which `expire` starts unmapping.
    pub fn expire_threshold(&self) -> usize {
        self.initial_n_segments * 2
    }
}

impl Default for PostingsConfig {
    fn default() -> Self {
        PostingsConfig::new(DEFAULT_INITIAL_N_SEGMENTS)
    }
}

/// Configuration of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Width of document keys in bytes; 0 means variable-length keys.
    pub key_size: usize,

    /// Behavioural flags.
    pub flags: IndexFlags,

    /// Initial segment count of the postings store.
    pub initial_n_segments: usize,

    /// `sel` broadens the query while the hit count is at or below this.
    pub escalation_threshold: usize,

    /// Tokenizer used for documents and queries.
    pub tokenizer: TokenizerKind,

    /// Where the index lives.
    pub storage: StorageConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            key_size: 0,
            flags: IndexFlags::default(),
            initial_n_segments: DEFAULT_INITIAL_N_SEGMENTS,
            escalation_threshold: 0,
            tokenizer: TokenizerKind::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl IndexConfig {
    /// An in-memory index with default settings.
    pub fn in_memory() -> Self {
        IndexConfig::default()
    }

    /// Set the storage location.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Set the document key width.
    pub fn with_key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    /// Set the initial segment count.
    pub fn with_initial_n_segments(mut self, n: usize) -> Self {
        self.initial_n_segments = n;
        self
    }

    /// Set the escalation threshold used by `sel`.
    pub fn with_escalation_threshold(mut self, threshold: usize) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    /// Use an n-gram tokenizer of length `n`.
    pub fn with_ngram(mut self, n: usize) -> Self {
        self.tokenizer = TokenizerKind::Ngram(n);
        self.flags.ngram = true;
        self
    }

    /// Replace the flags.
    pub fn with_flags(mut self, flags: IndexFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Postings sizing derived from this config.
    pub fn postings(&self) -> PostingsConfig {
        PostingsConfig::new(self.initial_n_segments)
    }

    /// Reject settings that cannot produce a working index.
    pub fn validate(&self) -> Result<()> {
        if self.initial_n_segments == 0 {
            return Err(GlaiveError::invalid_argument(
                "initial_n_segments must be positive",
            ));
        }
        if let TokenizerKind::Ngram(0) = self.tokenizer {
            return Err(GlaiveError::invalid_argument("n-gram length must be positive"));
        }
        Ok(())
    }
}
