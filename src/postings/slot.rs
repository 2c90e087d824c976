//! Array slot codec.
//!
//! Every term id owns one little-endian `u32` in an array segment:
//!
//! ```text
//! 0                          empty
//! rid << 12 | sid << 1 | 1   inline posting (position kept in the lexicon pocket)
//! even, non-zero             byte offset of the term's buffer entry
//! ```

use crate::postings::{DocId, Posting};

/// Largest record id an inline slot can hold (exclusive).
pub const INLINE_MAX_RID: u32 = 0x10_0000;

/// Largest section id an inline slot can hold (exclusive).
pub const INLINE_MAX_SID: u32 = 0x800;

/// Largest position an inline slot can hold (exclusive).
pub const INLINE_MAX_POS: u32 = 0x4000;

/// Decoded array slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Inline { rid: u32, sid: u32, pos: u32 },
    /// Offset of the term's buffer entry: logical segment in the high bits.
    Indirect(u32),
}

impl Slot {
    /// Decode a raw slot. `pocket` supplies the position of inline postings.
    pub fn decode(raw: u32, pocket: u32) -> Slot {
        if raw == 0 {
            Slot::Empty
        } else if raw & 1 == 1 {
            Slot::Inline {
                rid: raw >> 12,
                sid: (raw >> 1) & 0x7ff,
                pos: pocket,
            }
        } else {
            Slot::Indirect(raw)
        }
    }

    /// The raw value stored in the array. Inline positions are not part of it.
    pub fn raw(&self) -> u32 {
        match *self {
            Slot::Empty => 0,
            Slot::Inline { rid, sid, .. } => (rid << 12) | (sid << 1) | 1,
            Slot::Indirect(offset) => offset,
        }
    }

    /// The inline slot for `posting`, if it qualifies.
    pub fn inline_for(posting: &Posting) -> Option<Slot> {
        let pos = *posting.positions.first()?;
        inline_eligible(posting.id(), posting.tf, posting.score, pos).then_some(Slot::Inline {
            rid: posting.rid,
            sid: posting.sid,
            pos,
        })
    }

    /// The single posting an inline slot stands for.
    pub fn inline_posting(&self) -> Option<Posting> {
        match *self {
            Slot::Inline { rid, sid, pos } => Some(Posting {
                rid,
                sid,
                tf: 1,
                score: 0,
                positions: vec![pos],
            }),
            _ => None,
        }
    }
}

/// Whether a posting fits an inline slot.
pub fn inline_eligible(id: DocId, tf: u32, score: u32, pos: u32) -> bool {
    id.rid < INLINE_MAX_RID
        && id.sid < INLINE_MAX_SID
        && tf == 1
        && score == 0
        && pos < INLINE_MAX_POS
}
