//! Ordered set of the current positions of a query's tokens.
//!
//! NEAR matching keeps one entry per token and repeatedly moves the token
//! with the smallest position forward until the window between the
//! smallest and the largest position is narrow enough.

use std::collections::BTreeSet;

/// Positions of tokens, with constant-time access to both ends.
///
/// Among equal positions the token inserted first is the minimum and the
/// one inserted last is the maximum.
#[derive(Debug, Default)]
pub struct PositionTree {
    /// `(position, insertion sequence, token index)`
    nodes: BTreeSet<(i64, u64, usize)>,
    seq: u64,
}

impl PositionTree {
    pub fn new() -> Self {
        PositionTree::default()
    }

    /// Forget every token.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.seq = 0;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert token `token` at `pos`.
    pub fn push(&mut self, token: usize, pos: i64) {
        self.nodes.insert((pos, self.seq, token));
        self.seq += 1;
    }

    /// `(token, position)` of the smallest position.
    pub fn min(&self) -> Option<(usize, i64)> {
        self.nodes.first().map(|&(pos, _, token)| (token, pos))
    }

    /// `(token, position)` of the largest position.
    pub fn max(&self) -> Option<(usize, i64)> {
        self.nodes.last().map(|&(pos, _, token)| (token, pos))
    }

    /// Move the minimum token to `pos`.
    pub fn reposition_min(&mut self, pos: i64) {
        if let Some((_, _, token)) = self.nodes.pop_first() {
            self.push(token, pos);
        }
    }
}
