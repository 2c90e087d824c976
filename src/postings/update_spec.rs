//! Pending change to one term's postings in one document section.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::postings::DocId;

/// Cap on stored positions per posting.
pub const MAX_TF: u32 = 0x1ffff;

/// Specs of an update in flight, keyed by term id.
///
/// Terms present here with a live spec are about to receive postings, so a
/// flush that empties them must not drop them from the lexicon.
pub type PendingSpecs = AHashMap<u32, UpdateSpec>;

/// Occurrences of one term in one `(rid, sid)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSpec {
    pub rid: u32,
    pub sid: u32,
    /// Stored occurrence count, capped at [`MAX_TF`].
    pub tf: u32,
    /// Every occurrence added, including those past the cap.
    pub atf: u32,
    pub score: u32,
    pub positions: Vec<u32>,
}

impl UpdateSpec {
    pub fn new(rid: u32, sid: u32) -> Self {
        UpdateSpec {
            rid,
            sid,
            ..Default::default()
        }
    }

    /// Record an occurrence at `pos` carrying `weight`.
    pub fn add(&mut self, pos: u32, weight: u32) {
        self.atf += 1;
        if self.tf >= MAX_TF {
            return;
        }
        self.score = self.score.wrapping_add(weight);
        let at = self.positions.partition_point(|&p| p <= pos);
        self.positions.insert(at, pos);
        self.tf += 1;
    }

    pub fn id(&self) -> DocId {
        DocId::new(self.rid, self.sid)
    }

    /// Whether this spec removes postings instead of adding them.
    pub fn is_delete(&self) -> bool {
        self.tf == 0 || self.sid == 0
    }
}

impl PartialOrd for UpdateSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UpdateSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rid
            .cmp(&other.rid)
            .then(self.sid.cmp(&other.sid))
            .then(self.score.cmp(&other.score))
            .then(self.tf.cmp(&other.tf))
            .then_with(|| self.positions.cmp(&other.positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates() {
        let mut spec = UpdateSpec::new(1, 1);
        spec.add(4, 2);
        spec.add(1, 3);
        assert_eq!(spec.tf, 2);
        assert_eq!(spec.score, 5);
        assert_eq!(spec.positions, vec![1, 4]);
    }

    #[test]
    fn test_tf_is_capped() {
        let mut spec = UpdateSpec::new(1, 1);
        for pos in 0..MAX_TF + 10 {
            spec.add(pos, 0);
        }
        assert_eq!(spec.tf, MAX_TF);
        assert_eq!(spec.atf, MAX_TF + 10);
        assert_eq!(spec.positions.len(), MAX_TF as usize);
    }

    #[test]
    fn test_ordering() {
        let mut a = UpdateSpec::new(1, 1);
        a.add(3, 0);
        let mut b = a.clone();
        assert_eq!(a.cmp(&b), Ordering::Equal);
        b.add(9, 0);
        assert!(a < b);
        assert!(UpdateSpec::new(1, 2) > a);
    }

    #[test]
    fn test_is_delete() {
        assert!(UpdateSpec::new(1, 1).is_delete());
        assert!(UpdateSpec::new(1, 0).is_delete());
        let mut spec = UpdateSpec::new(1, 1);
        spec.add(0, 0);
        assert!(!spec.is_delete());
    }
}
