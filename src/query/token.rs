//! Query tokens resolved to posting streams.
//!
//! Every token of a query becomes a [`TokenInfo`]: the cursors of all terms
//! the token expands to, merged through a [`CursorHeap`], plus the token's
//! position in the query (its *offset*). Positions reported by a token are
//! relative to that offset, so the tokens of a phrase line up on the same
//! value exactly where the phrase occurs.

use crate::analysis::Analyzer;
use crate::analysis::lexer::{LexMode, LexStatus, Lexer};
use crate::error::{GlaiveError, Result};
use crate::lexicon::SymbolTable;
use crate::postings::{DocId, Posting, PostingStore};
use crate::query::SelectMode;
use crate::query::cursor_heap::CursorHeap;

/// Which lexicon enumeration a token expands through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Expansion {
    /// Terms starting with the token.
    pub prefix: bool,
    /// Terms ending with the token.
    pub suffix: bool,
}

impl Expansion {
    /// The token itself only.
    pub const NONE: Expansion = Expansion {
        prefix: false,
        suffix: false,
    };
    pub const PREFIX: Expansion = Expansion {
        prefix: true,
        suffix: false,
    };
    pub const SUFFIX: Expansion = Expansion {
        prefix: false,
        suffix: true,
    };
    /// Terms containing the token.
    pub const BOTH: Expansion = Expansion {
        prefix: true,
        suffix: true,
    };

    /// Only the prefix part of this expansion.
    pub fn prefix_part(self) -> Self {
        Expansion {
            prefix: self.prefix,
            suffix: false,
        }
    }

    /// Only the suffix part of this expansion.
    pub fn suffix_part(self) -> Self {
        Expansion {
            prefix: false,
            suffix: self.suffix,
        }
    }

    /// Terms of `lexicon` matching `key` under this expansion.
    pub fn terms(self, lexicon: &SymbolTable, key: &[u8]) -> Vec<u32> {
        match (self.prefix, self.suffix) {
            (false, false) => lexicon.get(key).into_iter().collect(),
            (true, false) => lexicon.prefix_search(key),
            (false, true) => lexicon.suffix_search(key),
            (true, true) => lexicon.infix_search(key),
        }
    }
}

/// One query token and the merged postings of its terms.
#[derive(Debug)]
pub struct TokenInfo<'a> {
    cursors: CursorHeap<'a>,
    offset: u32,
    pos: i64,
    size: u64,
    ntoken: usize,
}

impl<'a> TokenInfo<'a> {
    /// Open the postings of every term `key` expands to.
    ///
    /// Returns `None` when none of them has postings.
    pub fn open(
        store: &'a PostingStore,
        lexicon: &SymbolTable,
        key: &[u8],
        offset: u32,
        expansion: Expansion,
    ) -> Result<Option<Self>> {
        let mut ti = TokenInfo {
            cursors: CursorHeap::new(),
            offset,
            pos: 0,
            size: 0,
            ntoken: 0,
        };
        for tid in expansion.terms(lexicon, key) {
            let size = store.estimate_size(tid)?;
            if size == 0 {
                continue;
            }
            if let Some(cursor) = store.cursor(lexicon, tid)? {
                ti.cursors.push(cursor)?;
                ti.ntoken += 1;
                ti.size += u64::from(size);
            }
        }
        match ti.cursors.min_pos() {
            Some(pos) => {
                ti.pos = i64::from(pos) - i64::from(offset);
                Ok(Some(ti))
            }
            None => Ok(None),
        }
    }

    /// Sum of the size estimates of the token's terms.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of terms the token expanded to.
    pub fn ntoken(&self) -> usize {
        self.ntoken
    }

    /// Number of term cursors not yet exhausted.
    pub fn live_cursors(&self) -> usize {
        self.cursors.len()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Measure positions from the start of the document instead of from
    /// the token's place in the query.
    pub fn clear_offset(&mut self) {
        self.pos += i64::from(self.offset);
        self.offset = 0;
    }

    /// Current position, relative to the token's offset.
    pub fn pos(&self) -> i64 {
        self.pos
    }

    /// Key of the current posting.
    pub fn id(&self) -> Option<DocId> {
        self.cursors.min_id()
    }

    /// The current posting.
    pub fn posting(&self) -> Option<&Posting> {
        self.cursors.min_posting()
    }

    /// Move to the next posting of any term.
    pub fn next_posting(&mut self) -> Result<()> {
        self.cursors.pop()?;
        self.sync_pos();
        Ok(())
    }

    /// Advance to the first posting at or after `target`. Returns the key
    /// reached, or `None` once every term is exhausted.
    pub fn skip(&mut self, target: DocId) -> Result<Option<DocId>> {
        loop {
            let Some(id) = self.cursors.min_id() else {
                return Ok(None);
            };
            if id >= target {
                self.sync_pos();
                return Ok(Some(id));
            }
            self.cursors.pop()?;
        }
    }

    /// Advance within posting `id` to the first occurrence whose relative
    /// position is at least `pos`. Leaves the posting when there is none;
    /// returns the key reached, or `None` once every term is exhausted.
    pub fn skip_pos(&mut self, id: DocId, pos: i64) -> Result<Option<DocId>> {
        let target = pos + i64::from(self.offset);
        loop {
            let Some(current) = self.cursors.min_id() else {
                return Ok(None);
            };
            let at = i64::from(self.cursors.min_pos().unwrap_or(0));
            if current != id || at >= target {
                self.sync_pos();
                return Ok(Some(current));
            }
            self.cursors.pop_pos()?;
        }
    }

    fn sync_pos(&mut self) {
        if let Some(pos) = self.cursors.min_pos() {
            self.pos = i64::from(pos) - i64::from(self.offset);
        }
    }
}

/// Resolve every token of `query` for a select in `mode`.
///
/// The first token of a multi-token query keeps only the suffix part of the
/// mode's expansion and the last keeps only the prefix part; tokens in
/// between match exactly. A query ending in `*` forces prefix expansion.
/// Returns `None` when some token has no postings at all.
pub fn build<'a>(
    store: &'a PostingStore,
    lexicon: &SymbolTable,
    analyzer: &Analyzer,
    query: &str,
    mode: SelectMode,
) -> Result<Option<Vec<TokenInfo<'a>>>> {
    let mut lexer = Lexer::open(analyzer, query, LexMode::Query)?;
    if mode == SelectMode::Unsplit {
        let ti = TokenInfo::open(store, lexicon, raw_text(&lexer), 0, Expansion::BOTH)?;
        return Ok(ti.map(|ti| vec![ti]));
    }

    let mut expansion = match mode {
        SelectMode::Prefix => Expansion::PREFIX,
        SelectMode::Suffix => Expansion::SUFFIX,
        SelectMode::Partial => Expansion::BOTH,
        _ => Expansion::NONE,
    };
    if lexer.force_prefix() {
        expansion.prefix = true;
    }

    let mut tis = Vec::with_capacity(lexer.len());
    let tid = lexer.next_lookup(lexicon);
    let first = match (lexer.status(), tid) {
        (LexStatus::Doing, Some(tid)) => TokenInfo::open(
            store,
            lexicon,
            term_key(lexicon, tid)?,
            lexer.pos(),
            expansion.suffix_part(),
        )?,
        (LexStatus::Done, Some(tid)) => {
            TokenInfo::open(store, lexicon, term_key(lexicon, tid)?, lexer.pos(), expansion)?
        }
        (LexStatus::NotFound, _) => {
            TokenInfo::open(store, lexicon, raw_text(&lexer), 0, expansion)?
        }
        _ => None,
    };
    let Some(first) = first else {
        return Ok(None);
    };
    tis.push(first);

    while lexer.status() == LexStatus::Doing {
        let tid = lexer.next_lookup(lexicon);
        let pos = lexer.pos();
        let ti = match (lexer.status(), tid) {
            (LexStatus::Doing, Some(tid)) => {
                TokenInfo::open(store, lexicon, term_key(lexicon, tid)?, pos, Expansion::NONE)?
            }
            (LexStatus::Done, Some(tid)) => TokenInfo::open(
                store,
                lexicon,
                term_key(lexicon, tid)?,
                pos,
                expansion.prefix_part(),
            )?,
            _ => {
                // an unknown token can only match by expansion, and only the
                // last token expands
                let last = tis.len() + 1 == lexer.len();
                let text = lexer.token().map(|t| t.text.clone()).unwrap_or_default();
                let expansion = if last { expansion.prefix_part() } else { Expansion::NONE };
                TokenInfo::open(store, lexicon, text.as_bytes(), pos, expansion)?
            }
        };
        match ti {
            Some(ti) => tis.push(ti),
            None => return Ok(None),
        }
    }
    Ok(Some(tis))
}

/// The normalized query without surrounding blanks or a trailing `*`.
fn raw_text(lexer: &Lexer) -> &[u8] {
    lexer.orig().trim().trim_end_matches('*').as_bytes()
}

fn term_key(lexicon: &SymbolTable, tid: u32) -> Result<&[u8]> {
    lexicon
        .key(tid)
        .ok_or_else(|| GlaiveError::internal(format!("term {tid} has no key")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::PostingsConfig;
    use crate::postings::{PendingSpecs, UpdateSpec};
    use crate::storage::memory::MemoryStorage;

    struct Fixture {
        store: PostingStore,
        lexicon: SymbolTable,
        analyzer: Analyzer,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                store: PostingStore::create(Arc::new(MemoryStorage::new()), PostingsConfig::new(4))
                    .unwrap(),
                lexicon: SymbolTable::new(0, true),
                analyzer: Analyzer::from_config(&Default::default()).unwrap(),
            }
        }

        fn add(&mut self, term: &str, rid: u32, positions: &[u32]) {
            let tid = self.lexicon.get_or_insert(term.as_bytes()).unwrap();
            let mut spec = UpdateSpec::new(rid, 1);
            for &p in positions {
                spec.add(p, 0);
            }
            self.store
                .update(&mut self.lexicon, &PendingSpecs::default(), tid, &spec, tid)
                .unwrap();
        }
    }

    #[test]
    fn test_open_merges_expanded_terms() {
        let mut fx = Fixture::new();
        fx.add("search", 1, &[3]);
        fx.add("searching", 2, &[0]);
        fx.add("research", 3, &[1]);

        let ti = TokenInfo::open(&fx.store, &fx.lexicon, b"search", 0, Expansion::NONE)
            .unwrap()
            .unwrap();
        assert_eq!(ti.ntoken(), 1);
        assert_eq!(ti.id(), Some(DocId::new(1, 1)));
        assert_eq!(ti.pos(), 3);

        let ti = TokenInfo::open(&fx.store, &fx.lexicon, b"search", 0, Expansion::PREFIX)
            .unwrap()
            .unwrap();
        assert_eq!(ti.ntoken(), 2);

        let ti = TokenInfo::open(&fx.store, &fx.lexicon, b"search", 0, Expansion::SUFFIX)
            .unwrap()
            .unwrap();
        assert_eq!(ti.ntoken(), 2);

        let ti = TokenInfo::open(&fx.store, &fx.lexicon, b"search", 0, Expansion::BOTH)
            .unwrap()
            .unwrap();
        assert_eq!(ti.ntoken(), 3);

        assert!(
            TokenInfo::open(&fx.store, &fx.lexicon, b"missing", 0, Expansion::BOTH)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_skip_and_skip_pos() {
        let mut fx = Fixture::new();
        fx.add("cat", 1, &[0, 4, 9]);
        fx.add("cat", 3, &[2]);
        fx.add("cat", 6, &[1]);

        let mut ti = TokenInfo::open(&fx.store, &fx.lexicon, b"cat", 2, Expansion::NONE)
            .unwrap()
            .unwrap();
        assert_eq!(ti.pos(), -2);

        assert_eq!(ti.skip_pos(DocId::new(1, 1), 1).unwrap(), Some(DocId::new(1, 1)));
        assert_eq!(ti.pos(), 2);
        assert_eq!(ti.skip_pos(DocId::new(1, 1), 8).unwrap(), Some(DocId::new(3, 1)));

        assert_eq!(ti.skip(DocId::new(4, 1)).unwrap(), Some(DocId::new(6, 1)));
        assert_eq!(ti.skip(DocId::new(7, 1)).unwrap(), None);
    }

    #[test]
    fn test_clear_offset_keeps_document_position() {
        let mut fx = Fixture::new();
        fx.add("dog", 1, &[5]);
        let mut ti = TokenInfo::open(&fx.store, &fx.lexicon, b"dog", 3, Expansion::NONE)
            .unwrap()
            .unwrap();
        assert_eq!(ti.pos(), 2);
        ti.clear_offset();
        assert_eq!((ti.offset(), ti.pos()), (0, 5));
    }

    #[test]
    fn test_build_assigns_offsets() {
        let mut fx = Fixture::new();
        fx.add("quick", 1, &[0]);
        fx.add("brown", 1, &[1]);
        fx.add("fox", 1, &[2]);

        let tis = build(&fx.store, &fx.lexicon, &fx.analyzer, "quick brown fox", SelectMode::Exact)
            .unwrap()
            .unwrap();
        let offsets: Vec<u32> = tis.iter().map(TokenInfo::offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert!(tis.iter().all(|ti| ti.pos() == 0));

        assert!(
            build(&fx.store, &fx.lexicon, &fx.analyzer, "quick cat", SelectMode::Exact)
                .unwrap()
                .is_none()
        );
        assert!(
            build(&fx.store, &fx.lexicon, &fx.analyzer, "", SelectMode::Exact)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_build_expands_last_token_with_star() {
        let mut fx = Fixture::new();
        fx.add("brown", 1, &[0]);
        fx.add("foxes", 1, &[1]);
        fx.add("foxtrot", 2, &[1]);

        let tis = build(&fx.store, &fx.lexicon, &fx.analyzer, "brown fox*", SelectMode::Exact)
            .unwrap()
            .unwrap();
        assert_eq!(tis.len(), 2);
        assert_eq!(tis[1].ntoken(), 2);
    }

    #[test]
    fn test_build_unsplit_uses_whole_text() {
        let mut fx = Fixture::new();
        fx.add("warehouse", 1, &[0]);
        let tis = build(&fx.store, &fx.lexicon, &fx.analyzer, "house", SelectMode::Unsplit)
            .unwrap()
            .unwrap();
        assert_eq!(tis.len(), 1);
        assert_eq!(tis[0].ntoken(), 1);
    }
}
