//! Merging several sorted result sets by score.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{GlaiveError, Result};
use crate::records::{Record, Records, SortOrder};

#[derive(Debug)]
struct HeapEntry {
    record: Record,
    bin: usize,
    order: SortOrder,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry; the greatest is the one that
        // sorts first.
        self.order
            .compare(
                (other.record.score, &other.record.key),
                (self.record.score, &self.record.key),
            )
            .then_with(|| other.bin.cmp(&self.bin))
    }
}

/// Walks the current records of several result sets in one score order.
///
/// Each added set is iterated with [`Records::next`], so sort them first
/// for a globally ordered walk.
#[derive(Debug)]
pub struct RecordsHeap {
    bins: Vec<Option<Records>>,
    heap: BinaryHeap<HeapEntry>,
    order: SortOrder,
    limit: usize,
    emitted: usize,
}

impl RecordsHeap {
    /// An empty heap that yields at most `limit` records (0 = no limit).
    pub fn new(limit: usize, order: SortOrder) -> Self {
        RecordsHeap {
            bins: Vec::new(),
            heap: BinaryHeap::new(),
            order,
            limit,
            emitted: 0,
        }
    }

    /// Add a result set positioned on its first record.
    pub fn add(&mut self, mut records: Records) -> Result<()> {
        let Some(record) = records.next() else {
            return Err(GlaiveError::internal("cannot add an empty result set to a heap"));
        };
        let bin = self.bins.len();
        self.bins.push(Some(records));
        self.heap.push(HeapEntry {
            record,
            bin,
            order: self.order,
        });
        Ok(())
    }

    /// Number of result sets not yet exhausted.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The result set whose current record comes next.
    pub fn head(&self) -> Option<&Records> {
        let entry = self.heap.peek()?;
        self.bins.get(entry.bin)?.as_ref()
    }

    /// Take the next record, with the index of the result set it came
    /// from (the order of [`add`](Self::add) calls).
    pub fn next(&mut self) -> Option<(usize, Record)> {
        if self.limit > 0 && self.emitted >= self.limit {
            return None;
        }
        let entry = self.heap.pop()?;
        let records = self.bins.get_mut(entry.bin)?.as_mut()?;
        if let Some(record) = records.next() {
            self.heap.push(HeapEntry {
                record,
                bin: entry.bin,
                order: self.order,
            });
        }
        self.emitted += 1;
        Some((entry.bin, entry.record))
    }

    /// The result set added as number `bin`.
    pub fn records(&self, bin: usize) -> Option<&Records> {
        self.bins.get(bin)?.as_ref()
    }

    /// Give back the result sets in the order they were added.
    pub fn into_inner(self) -> Vec<Records> {
        self.bins.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Operator, RecordKey, RecordUnit};

    fn sorted(entries: &[(u32, i64)]) -> Records {
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        for &(rid, score) in entries {
            records.add(RecordKey::new(rid, 1, 0), score, Operator::Or);
        }
        records.sort(entries.len(), SortOrder::Descending).unwrap();
        records
    }

    #[test]
    fn test_merges_in_score_order() {
        let mut heap = RecordsHeap::new(0, SortOrder::Descending);
        heap.add(sorted(&[(1, 10), (2, 4), (3, 1)])).unwrap();
        heap.add(sorted(&[(7, 8), (8, 5)])).unwrap();
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.head().unwrap().curr_score(), 10);

        let mut hits = Vec::new();
        while let Some((bin, record)) = heap.next() {
            hits.push((bin, record.score));
        }
        assert_eq!(hits, vec![(0, 10), (1, 8), (1, 5), (0, 4), (0, 1)]);
        assert!(heap.records(1).is_some());
        assert!(heap.is_empty());
        assert_eq!(heap.into_inner().len(), 2);
    }

    #[test]
    fn test_limit_and_empty_sets() {
        let mut heap = RecordsHeap::new(2, SortOrder::Descending);
        let empty = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        assert!(heap.add(empty).is_err());
        heap.add(sorted(&[(1, 3), (2, 2), (3, 1)])).unwrap();
        assert_eq!(heap.next().unwrap().1.score, 3);
        assert_eq!(heap.next().unwrap().1.score, 2);
        assert!(heap.next().is_none());
    }
}
