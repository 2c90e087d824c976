//! Postings store.
//!
//! For every term id the store keeps an ordered list of [`Posting`]s. A
//! term's list lives in one of three places, recorded in its 32-bit array
//! slot (see [`slot::Slot`]):
//!
//! - nowhere (the term has no postings),
//! - inline in the slot itself, for a single small posting,
//! - in a buffer segment, as a sorted linked list of pending records plus a
//!   reference to the term's compacted chunk.
//!
//! Writes always go to buffers. When a buffer segment runs out of space it
//! is flushed: each of its terms is merged with its chunk into a new chunk,
//! and the buffer image is rebuilt empty in a fresh physical segment.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use glaive::config::PostingsConfig;
//! use glaive::lexicon::SymbolTable;
//! use glaive::postings::{PendingSpecs, PostingStore, UpdateSpec};
//! use glaive::storage::memory::MemoryStorage;
//!
//! let mut lexicon = SymbolTable::new(0, false);
//! let mut store = PostingStore::create(Arc::new(MemoryStorage::new()), PostingsConfig::new(4)).unwrap();
//!
//! let tid = lexicon.get_or_insert(b"cat").unwrap();
//! let mut spec = UpdateSpec::new(1, 1);
//! spec.add(0, 0);
//! spec.add(5, 0);
//! store.update(&mut lexicon, &PendingSpecs::default(), tid, &spec, 0).unwrap();
//!
//! let postings = store.postings(&lexicon, tid).unwrap();
//! assert_eq!(postings[0].positions, vec![0, 5]);
//! ```

pub mod buffer;
pub mod chunk;
pub mod cursor;
pub mod slot;
pub mod store;
pub mod update_spec;

mod merge;

pub use self::cursor::PostingCursor;
pub use self::store::{EntryInfo, PostingStore};
pub use self::update_spec::{MAX_TF, PendingSpecs, UpdateSpec};

use crate::error::{GlaiveError, Result};
use crate::util::varint;

/// Document and section a posting belongs to. Orders by `rid`, then `sid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId {
    pub rid: u32,
    pub sid: u32,
}

impl DocId {
    pub fn new(rid: u32, sid: u32) -> Self {
        DocId { rid, sid }
    }
}

/// One occurrence record of a term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Posting {
    pub rid: u32,
    pub sid: u32,
    pub tf: u32,
    pub score: u32,
    /// Absolute positions, non-decreasing.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn id(&self) -> DocId {
        DocId::new(self.rid, self.sid)
    }

    /// Whether the posting is a live occurrence rather than a tombstone.
    pub fn is_live(&self) -> bool {
        self.tf > 0 && self.sid > 0
    }
}

/// Append `tf`, `score` and the gaps between `positions`.
///
/// `tf` is stored doubled with the low bit flagging a following score.
pub(crate) fn encode_tail(out: &mut Vec<u8>, tf: u32, score: u32, positions: &[u32]) {
    if score == 0 {
        varint::push_u32(out, tf << 1);
    } else {
        varint::push_u32(out, (tf << 1) | 1);
        varint::push_u32(out, score);
    }
    let mut last = 0;
    for &pos in positions.iter().take(tf as usize) {
        varint::push_u32(out, pos - last);
        last = pos;
    }
}

/// Decode what [`encode_tail`] wrote into `posting`.
pub(crate) fn decode_tail(bytes: &[u8], at: &mut usize, posting: &mut Posting) -> Result<()> {
    let tf2 = varint::read_u32_at(bytes, at)?;
    posting.tf = tf2 >> 1;
    posting.score = if tf2 & 1 == 1 {
        varint::read_u32_at(bytes, at)?
    } else {
        0
    };
    posting.positions.clear();
    let mut pos = 0u32;
    for _ in 0..posting.tf {
        let gap = varint::read_u32_at(bytes, at)?;
        pos = pos
            .checked_add(gap)
            .ok_or_else(|| GlaiveError::invalid_format("position overflow"))?;
        posting.positions.push(pos);
    }
    Ok(())
}
