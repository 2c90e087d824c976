//! Min-heap of posting cursors.
//!
//! When a query token expands to several terms, their cursors are merged
//! through a [`CursorHeap`] ordered by `(rid, sid, pos)` of each cursor's
//! current posting and position. Walking the heap with
//! [`pop_pos`](CursorHeap::pop_pos) visits the occurrences of all terms in
//! one document in position order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::binary_heap::PeekMut;

use crate::error::Result;
use crate::postings::{DocId, Posting, PostingCursor};

struct Entry<'a>(PostingCursor<'a>);

impl Entry<'_> {
    fn key(&self) -> (DocId, u32) {
        (self.0.id().unwrap_or_default(), self.0.pos().unwrap_or(0))
    }
}

impl PartialEq for Entry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry<'_> {}

impl PartialOrd for Entry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: the smallest key sits on top
        other.key().cmp(&self.key())
    }
}

/// Cursors merged into one stream of `(rid, sid, pos)`.
#[derive(Default)]
pub struct CursorHeap<'a> {
    heap: BinaryHeap<Entry<'a>>,
}

impl std::fmt::Debug for CursorHeap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorHeap")
            .field("len", &self.heap.len())
            .field("min", &self.heap.peek().map(Entry::key))
            .finish()
    }
}

impl<'a> CursorHeap<'a> {
    pub fn new() -> Self {
        CursorHeap {
            heap: BinaryHeap::new(),
        }
    }

    /// Add a fresh cursor, moving it onto its first posting and position.
    /// Cursors without postings are dropped.
    pub fn push(&mut self, mut cursor: PostingCursor<'a>) -> Result<()> {
        if cursor.next()? {
            cursor.next_pos();
            self.heap.push(Entry(cursor));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The cursor with the smallest key.
    pub fn min(&self) -> Option<&PostingCursor<'a>> {
        self.heap.peek().map(|e| &e.0)
    }

    /// Key of the smallest cursor.
    pub fn min_id(&self) -> Option<DocId> {
        self.min().and_then(PostingCursor::id)
    }

    /// Current position of the smallest cursor.
    pub fn min_pos(&self) -> Option<u32> {
        self.min().and_then(PostingCursor::pos)
    }

    /// Current posting of the smallest cursor.
    pub fn min_posting(&self) -> Option<&Posting> {
        self.min().and_then(PostingCursor::posting)
    }

    /// Move the smallest cursor to its next posting.
    pub fn pop(&mut self) -> Result<()> {
        let Some(mut top) = self.heap.peek_mut() else {
            return Ok(());
        };
        if top.0.next()? {
            top.0.next_pos();
        } else {
            PeekMut::pop(top);
        }
        Ok(())
    }

    /// Move the smallest cursor to its next position, or to the first
    /// position of its next posting.
    pub fn pop_pos(&mut self) -> Result<()> {
        let Some(mut top) = self.heap.peek_mut() else {
            return Ok(());
        };
        if top.0.next_pos().is_some() {
            return Ok(());
        }
        if top.0.next()? {
            top.0.next_pos();
        } else {
            PeekMut::pop(top);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(rid: u32, sid: u32, positions: &[u32]) -> Posting {
        Posting {
            rid,
            sid,
            tf: positions.len() as u32,
            score: 0,
            positions: positions.to_vec(),
        }
    }

    #[test]
    fn test_orders_by_key_then_position() {
        let mut heap = CursorHeap::new();
        heap.push(PostingCursor::sole(1, posting(3, 1, &[4]))).unwrap();
        heap.push(PostingCursor::sole(2, posting(2, 1, &[7, 9]))).unwrap();
        heap.push(PostingCursor::sole(3, posting(2, 1, &[8]))).unwrap();
        assert_eq!(heap.len(), 3);

        let mut seen = Vec::new();
        while let (Some(id), Some(pos)) = (heap.min_id(), heap.min_pos()) {
            seen.push((id.rid, pos));
            heap.pop_pos().unwrap();
        }
        assert_eq!(seen, vec![(2, 7), (2, 8), (2, 9), (3, 4)]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_pop_skips_whole_posting() {
        let mut heap = CursorHeap::new();
        heap.push(PostingCursor::sole(1, posting(1, 1, &[0, 1, 2]))).unwrap();
        heap.push(PostingCursor::sole(2, posting(5, 1, &[0]))).unwrap();
        heap.pop().unwrap();
        assert_eq!(heap.min_id(), Some(DocId::new(5, 1)));
        heap.pop().unwrap();
        assert!(heap.min().is_none());
        heap.pop().unwrap();
    }
}
