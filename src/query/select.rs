//! Query evaluation.
//!
//! A [`Searcher`] resolves the tokens of a query, orders them cheapest
//! first and walks the cheapest one (the driver) posting by posting. The
//! other tokens only ever skip forward to the driver's key, so a document
//! is examined only when every token occurs in it. Inside such a document
//! the tokens are then checked for a phrase (consecutive positions) or for
//! a NEAR window, and the document's score is folded into the result set.

use log::{debug, info};

use crate::analysis::Analyzer;
use crate::error::Result;
use crate::lexicon::{DELETE_FLAG, SymbolTable};
use crate::postings::{DocId, PostingStore};
use crate::query::position_tree::PositionTree;
use crate::query::term_extract;
use crate::query::token::{self, TokenInfo};
use crate::query::{SelectMode, SelectOptions, Weights};
use crate::records::{Operator, RecordKey, RecordUnit, Records};

/// Occurrences found in one document.
#[derive(Debug, Default)]
struct DocMatch {
    noccur: i64,
    tscore: i64,
    /// Per-occurrence hits for position records: `(position, factor)`.
    hits: Vec<(u32, i64)>,
}

/// Read-only view of an index used to evaluate queries.
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    pub(crate) store: &'a PostingStore,
    pub(crate) lexicon: &'a SymbolTable,
    pub(crate) keys: &'a SymbolTable,
    pub(crate) analyzer: &'a Analyzer,
}

impl<'a> Searcher<'a> {
    pub fn new(
        store: &'a PostingStore,
        lexicon: &'a SymbolTable,
        keys: &'a SymbolTable,
        analyzer: &'a Analyzer,
    ) -> Self {
        Searcher {
            store,
            lexicon,
            keys,
            analyzer,
        }
    }

    /// Evaluate `query` and fold its hits into `records` with `op`.
    ///
    /// On a storage error the hits gathered so far stay in `records` and
    /// the error is returned. With [`Operator::And`] records not hit by
    /// this query are removed in every case.
    pub fn select(
        &self,
        query: &str,
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
    ) -> Result<()> {
        let outcome = match options.mode {
            SelectMode::Similar => self.similar_hits(query, records, op, options),
            SelectMode::TermExtract => self.term_extract_hits(query, records, op, options),
            _ => self.select_hits(query, records, op, options),
        };
        if op == Operator::And {
            records.purge_unmarked();
        }
        records.clear_cursor();
        self.store.expire();
        outcome?;
        if options.mode == SelectMode::TermExtract {
            term_extract::sort_extracted(records, options)?;
        }
        Ok(())
    }

    fn select_hits(
        &self,
        query: &str,
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
    ) -> Result<()> {
        let Some(mut tis) = token::build(self.store, self.lexicon, self.analyzer, query, options.mode)?
        else {
            debug!("no postings for ({query})");
            return Ok(());
        };
        let near = match options.mode {
            SelectMode::Near => {
                tis.iter_mut().for_each(TokenInfo::clear_offset);
                true
            }
            SelectMode::Near2 => true,
            _ => false,
        };
        tis.sort_by_key(TokenInfo::size);
        info!("n={} ({query})", tis.len());

        if tis.len() == 1
            && tis[0].live_cursors() == 1
            && op == Operator::Or
            && records.is_empty()
            && records.record_unit() == RecordUnit::Document
            && records.max_n_subrecs() == 0
            && self.store.max_section() == 1
        {
            return self.scan_single(&mut tis[0], records, options);
        }
        self.merge(&mut tis, records, op, options, near)
    }

    /// One term, one section per document: every posting is a hit.
    fn scan_single(
        &self,
        ti: &mut TokenInfo<'_>,
        records: &mut Records,
        options: &SelectOptions,
    ) -> Result<()> {
        while let Some(posting) = ti.posting() {
            let id = posting.id();
            let score = i64::from(posting.tf) + i64::from(posting.score);
            let weight = self.weight(id, options);
            if weight != 0 {
                self.add(records, RecordKey::new(id.rid, id.sid, 0), score * weight, Operator::Or);
            }
            ti.next_posting()?;
        }
        Ok(())
    }

    fn merge(
        &self,
        tis: &mut [TokenInfo<'_>],
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
        near: bool,
    ) -> Result<()> {
        let rep = records.wants_positions();
        let orp = records.record_unit() == RecordUnit::Position || op == Operator::Or;
        let mut tree = PositionTree::new();
        loop {
            let Some(id) = tis[0].id() else {
                return Ok(());
            };
            let mut next = successor(id);
            let mut all = true;
            for ti in tis[1..].iter_mut() {
                match ti.skip(id)? {
                    None => return Ok(()),
                    Some(at) if at != id => {
                        next = at;
                        all = false;
                        break;
                    }
                    Some(_) => {}
                }
            }

            let weight = self.weight(id, options);
            let doc = RecordKey::new(id.rid, id.sid, 0);
            if all && weight != 0 && (orp || records.contains(doc)) {
                let found = if tis.len() == 1 && !rep {
                    tis[0].posting().map_or_else(DocMatch::default, |p| DocMatch {
                        noccur: i64::from(p.tf),
                        tscore: i64::from(p.score),
                        hits: Vec::new(),
                    })
                } else if near {
                    near_windows(tis, id, &mut next, &mut tree, options.max_interval, rep)?
                } else {
                    phrase_matches(tis, id, &mut next, rep)?
                };
                for (pos, factor) in found.hits {
                    self.add(records, RecordKey::new(id.rid, id.sid, pos), factor * weight, op);
                }
                if found.noccur > 0 && !rep {
                    self.add(records, doc, (found.noccur + found.tscore) * weight, op);
                }
            }
            if tis[0].skip(next)?.is_none() {
                return Ok(());
            }
        }
    }

    /// Weight of section `id.sid` of document `id.rid`.
    pub(crate) fn weight(&self, id: DocId, options: &SelectOptions) -> i64 {
        match &options.weights {
            Weights::None => 1,
            Weights::Static(vector) => id
                .sid
                .checked_sub(1)
                .and_then(|i| vector.get(i as usize))
                .map_or(0, |&w| i64::from(w)),
            Weights::Dynamic(f) => self.keys.key(id.rid).map_or(0, |key| i64::from(f(key, id.sid))),
            Weights::Constant(w) => i64::from(*w),
        }
    }

    /// Fold a hit into `records`, skipping deleted documents when asked to.
    pub(crate) fn add(&self, records: &mut Records, key: RecordKey, score: i64, op: Operator) {
        if records.ignore_deleted_records() && self.keys.pocket(key.rid) == Some(DELETE_FLAG) {
            return;
        }
        records.add(key, score, op);
    }
}

fn successor(id: DocId) -> DocId {
    match id.sid.checked_add(1) {
        Some(sid) => DocId::new(id.rid, sid),
        None => DocId::new(id.rid.saturating_add(1), 0),
    }
}

/// Move `ti` to relative position `pos` or beyond inside posting `id`.
/// Returns false when the token left the posting; `next` then holds the
/// key it reached.
fn seek_pos(ti: &mut TokenInfo<'_>, id: DocId, pos: i64, next: &mut DocId) -> Result<bool> {
    match ti.skip_pos(id, pos)? {
        Some(at) if at == id => Ok(true),
        Some(at) => {
            *next = at;
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Count the places where all tokens occur at consecutive positions.
///
/// The tokens are visited round robin; each one is moved to the candidate
/// position, and a token landing beyond it restarts the count there.
fn phrase_matches(
    tis: &mut [TokenInfo<'_>],
    id: DocId,
    next: &mut DocId,
    rep: bool,
) -> Result<DocMatch> {
    let n = tis.len();
    let mut found = DocMatch::default();
    let (mut pos, mut score, mut count) = (0i64, 0i64, 0usize);
    for k in (0..n).cycle() {
        let ti = &mut tis[k];
        if !seek_pos(ti, id, pos, next)? {
            break;
        }
        let posting_score = ti.posting().map_or(0, |p| i64::from(p.score));
        if ti.pos() == pos {
            score += posting_score;
            count += 1;
        } else {
            score = posting_score;
            count = 1;
            pos = ti.pos();
        }
        if count == n {
            if rep {
                found.hits.push((pos as u32, score + 1));
            }
            found.tscore += score;
            found.noccur += 1;
            score = 0;
            count = 0;
            pos += 1;
        }
    }
    Ok(found)
}

/// Count the windows in which every token occurs within `max_interval`
/// positions of the others.
fn near_windows(
    tis: &mut [TokenInfo<'_>],
    id: DocId,
    next: &mut DocId,
    tree: &mut PositionTree,
    max_interval: i32,
    rep: bool,
) -> Result<DocMatch> {
    let mut found = DocMatch::default();
    tree.clear();
    for (k, ti) in tis.iter_mut().enumerate() {
        if !seek_pos(ti, id, 0, next)? {
            return Ok(found);
        }
        tree.push(k, ti.pos());
    }
    let max_interval = i64::from(max_interval);
    while let (Some((k, min)), Some((_, max))) = (tree.min(), tree.max()) {
        let target = if max - min <= max_interval {
            if rep {
                found.hits.push((min as u32, 1));
            }
            found.noccur += 1;
            max + 1
        } else {
            max - max_interval
        };
        let ti = &mut tis[k];
        if !seek_pos(ti, id, target, next)? {
            break;
        }
        tree.reposition_min(ti.pos());
    }
    Ok(found)
}
