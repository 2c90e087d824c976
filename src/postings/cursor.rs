//! Read-only cursor over one term's postings.

use std::sync::Arc;

use crate::error::Result;
use crate::postings::merge::PostingMerge;
use crate::postings::{DocId, Posting};
use crate::storage::segment::Segment;

enum Source<'a> {
    /// A posting decoded from an inline slot, handed out once.
    Sole(Option<Posting>),
    /// Chunk and buffer merged. Holding `segment` keeps it mapped.
    Merged {
        segment: Arc<Segment>,
        merge: PostingMerge<'a>,
    },
}

/// Forward-only iterator over the postings of one term.
///
/// Call [`next`](PostingCursor::next) to move to a posting, then
/// [`next_pos`](PostingCursor::next_pos) to walk its positions. A cursor
/// borrows the store, so no write can happen while one is open.
pub struct PostingCursor<'a> {
    tid: u32,
    source: Source<'a>,
    current: Option<Posting>,
    pos_index: usize,
}

impl std::fmt::Debug for PostingCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostingCursor")
            .field("tid", &self.tid)
            .field("current", &self.current.as_ref().map(Posting::id))
            .finish()
    }
}

impl<'a> PostingCursor<'a> {
    pub(crate) fn sole(tid: u32, posting: Posting) -> Self {
        PostingCursor {
            tid,
            source: Source::Sole(Some(posting)),
            current: None,
            pos_index: 0,
        }
    }

    pub(crate) fn merged(tid: u32, segment: Arc<Segment>, chunk: &'a [u8], head: u16) -> Self {
        PostingCursor {
            tid,
            source: Source::Merged {
                segment,
                merge: PostingMerge::new(chunk, head),
            },
            current: None,
            pos_index: 0,
        }
    }

    /// Term this cursor reads.
    pub fn tid(&self) -> u32 {
        self.tid
    }

    /// Advance to the next posting. Returns false once exhausted.
    pub fn next(&mut self) -> Result<bool> {
        self.pos_index = 0;
        self.current = match &mut self.source {
            Source::Sole(posting) => posting.take(),
            Source::Merged { segment, merge } => match merge.next(segment) {
                Ok(posting) => posting,
                Err(e) => {
                    self.current = None;
                    return Err(e);
                }
            },
        };
        Ok(self.current.is_some())
    }

    /// The current posting.
    pub fn posting(&self) -> Option<&Posting> {
        self.current.as_ref()
    }

    /// Key of the current posting.
    pub fn id(&self) -> Option<DocId> {
        self.current.as_ref().map(Posting::id)
    }

    /// Advance to the next position of the current posting.
    pub fn next_pos(&mut self) -> Option<u32> {
        let pos = *self.current.as_ref()?.positions.get(self.pos_index)?;
        self.pos_index += 1;
        Some(pos)
    }

    /// Position most recently returned by [`next_pos`](Self::next_pos).
    pub fn pos(&self) -> Option<u32> {
        let idx = self.pos_index.checked_sub(1)?;
        self.current.as_ref()?.positions.get(idx).copied()
    }
}
