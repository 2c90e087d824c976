//! Result sets produced by queries.
//!
//! A [`Records`] maps record keys to a score and an optional list of the
//! best sub-records that contributed to it. The granularity of a key is its
//! [`RecordUnit`]: whole documents, sections of documents, or single
//! positions. Queries fold postings into a result set with an
//! [`Operator`], and result sets built against the same key table can be
//! combined with the set operations below.
//!
//! # Example
//!
//! ```
//! use glaive::records::{Operator, RecordKey, RecordUnit, Records};
//!
//! # fn main() -> glaive::error::Result<()> {
//! let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
//! records.add(RecordKey::new(1, 1, 0), 3, Operator::Or);
//! records.add(RecordKey::new(2, 1, 0), 5, Operator::Or);
//! records.sort(10, Default::default())?;
//! let first = records.next().unwrap();
//! assert_eq!(first.key.rid, 2);
//! assert_eq!(first.score, 5);
//! # Ok(())
//! # }
//! ```

pub mod heap;

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};
use crate::lexicon::SymbolTable;

pub use self::heap::RecordsHeap;

/// Granularity of a record or sub-record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordUnit {
    /// One record per document.
    Document,
    /// One record per section of a document.
    Section,
    /// One record per term occurrence.
    Position,
    /// Keys chosen by a grouping function; the value is the key width in
    /// bytes, 0 for variable width.
    UserDefined(usize),
    /// No sub-records.
    None,
}

impl RecordUnit {
    /// Number of key components, or `None` for units a query cannot
    /// produce directly.
    fn width(self) -> Option<usize> {
        match self {
            RecordUnit::Document => Some(1),
            RecordUnit::Section => Some(2),
            RecordUnit::Position => Some(3),
            RecordUnit::UserDefined(_) | RecordUnit::None => None,
        }
    }
}

/// How a query folds a posting into a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    /// Insert or add to the existing score.
    #[default]
    Or,
    /// Keep only records hit by this query.
    And,
    /// Remove hit records.
    But,
    /// Add to the score of existing records, never insert.
    Adjust,
}

/// Key of a record. Components finer than the record unit are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordKey {
    pub rid: u32,
    pub sid: u32,
    pub pos: u32,
}

impl RecordKey {
    pub fn new(rid: u32, sid: u32, pos: u32) -> Self {
        RecordKey { rid, sid, pos }
    }

    /// This key truncated to `unit`.
    pub fn truncate(self, unit: RecordUnit) -> Self {
        match unit {
            RecordUnit::Document => RecordKey::new(self.rid, 0, 0),
            RecordUnit::Section => RecordKey::new(self.rid, self.sid, 0),
            _ => self,
        }
    }
}

/// Sort direction of [`Records::sort`] and [`RecordsHeap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Highest score first.
    #[default]
    Descending,
    /// Lowest score first.
    Ascending,
}

impl SortOrder {
    /// Order two scored keys; ties are broken by ascending key.
    pub(crate) fn compare(self, a: (i64, &RecordKey), b: (i64, &RecordKey)) -> Ordering {
        let by_score = match self {
            SortOrder::Descending => b.0.cmp(&a.0),
            SortOrder::Ascending => a.0.cmp(&b.0),
        };
        by_score.then_with(|| a.1.cmp(b.1))
    }
}

/// A sub-record kept under its parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRecord {
    pub score: i64,
    pub key: RecordKey,
}

#[derive(Debug, Clone, Default)]
struct RecInfo {
    score: i64,
    n_subrecs: u32,
    /// Set when an `And` query hit this record.
    marked: bool,
    subrecs: Vec<SubRecord>,
}

impl RecInfo {
    /// Keep `sub` when it is among the `limit` best seen so far.
    fn push_subrec(&mut self, sub: SubRecord, limit: usize, order: SortOrder) {
        if limit == 0 {
            return;
        }
        if self.subrecs.len() < limit {
            self.subrecs.push(sub);
            return;
        }
        let worst = self
            .subrecs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| order.compare((a.score, &a.key), (b.score, &b.key)))
            .map(|(i, _)| i);
        if let Some(i) = worst {
            let w = self.subrecs[i];
            if order.compare((sub.score, &sub.key), (w.score, &w.key)) == Ordering::Less {
                self.subrecs[i] = sub;
            }
        }
    }
}

/// A record as reported while iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub key: RecordKey,
    pub score: i64,
    pub n_subrecs: u32,
}

/// A query result set.
#[derive(Debug)]
pub struct Records {
    record_unit: RecordUnit,
    subrec_unit: RecordUnit,
    max_n_subrecs: usize,
    subrec_order: SortOrder,
    keys: Option<Arc<RwLock<SymbolTable>>>,
    records: AHashMap<RecordKey, RecInfo>,
    /// Iteration order: the sort result, or a snapshot taken by `rewind`.
    order: Option<Vec<RecordKey>>,
    sorted: bool,
    curr: Option<usize>,
    ignore_deleted_records: bool,
    /// Keys of user-defined groups; the group with rid `n` is entry `n - 1`.
    group_keys: Vec<Vec<u8>>,
}

impl Records {
    /// Create an empty result set.
    ///
    /// `max_n_subrecs > 0` requires a sub-record unit finer than the record
    /// unit.
    pub fn open(
        record_unit: RecordUnit,
        subrec_unit: RecordUnit,
        max_n_subrecs: usize,
    ) -> Result<Self> {
        check_units(record_unit, subrec_unit, max_n_subrecs)?;
        Ok(Records {
            record_unit,
            subrec_unit,
            max_n_subrecs,
            subrec_order: SortOrder::Descending,
            keys: None,
            records: AHashMap::new(),
            order: None,
            sorted: false,
            curr: None,
            ignore_deleted_records: false,
            group_keys: Vec::new(),
        })
    }

    /// Drop every record and switch to new units.
    pub fn reopen(
        &mut self,
        record_unit: RecordUnit,
        subrec_unit: RecordUnit,
        max_n_subrecs: usize,
    ) -> Result<()> {
        check_units(record_unit, subrec_unit, max_n_subrecs)?;
        *self = Records::open(record_unit, subrec_unit, max_n_subrecs)?;
        Ok(())
    }

    pub fn record_unit(&self) -> RecordUnit {
        self.record_unit
    }

    pub fn subrec_unit(&self) -> RecordUnit {
        self.subrec_unit
    }

    pub fn max_n_subrecs(&self) -> usize {
        self.max_n_subrecs
    }

    /// Attach the key table record ids refer to.
    pub fn set_keys(&mut self, keys: Arc<RwLock<SymbolTable>>) {
        self.keys = Some(keys);
    }

    pub fn keys(&self) -> Option<&Arc<RwLock<SymbolTable>>> {
        self.keys.as_ref()
    }

    /// Skip documents flagged deleted when queries add to this set.
    pub fn set_ignore_deleted_records(&mut self, ignore: bool) {
        self.ignore_deleted_records = ignore;
    }

    pub fn ignore_deleted_records(&self) -> bool {
        self.ignore_deleted_records
    }

    /// Whether postings must be visited position by position to fill this
    /// set.
    pub fn wants_positions(&self) -> bool {
        self.record_unit == RecordUnit::Position || self.subrec_unit == RecordUnit::Position
    }

    /// Number of records.
    pub fn nhits(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record exists for the posting key `key`.
    pub fn contains(&self, key: RecordKey) -> bool {
        self.records.contains_key(&key.truncate(self.record_unit))
    }

    /// Fold one hit at posting key `key` into the set.
    pub fn add(&mut self, key: RecordKey, score: i64, op: Operator) {
        let rkey = key.truncate(self.record_unit);
        let info = match op {
            Operator::Or => self.records.entry(rkey).or_default(),
            Operator::And => match self.records.get_mut(&rkey) {
                Some(info) => {
                    info.marked = true;
                    info
                }
                None => return,
            },
            Operator::But => {
                self.records.remove(&rkey);
                return;
            }
            Operator::Adjust => {
                if let Some(info) = self.records.get_mut(&rkey) {
                    info.score += score;
                }
                return;
            }
        };
        info.score += score;
        info.n_subrecs += 1;
        if self.max_n_subrecs > 0 {
            let sub = SubRecord {
                score,
                key: key.truncate(self.subrec_unit),
            };
            info.push_subrec(sub, self.max_n_subrecs, self.subrec_order);
        }
    }

    /// Drop records an `And` query did not hit and clear the marks.
    pub fn purge_unmarked(&mut self) {
        self.records.retain(|_, info| std::mem::take(&mut info.marked));
        self.clear_cursor();
    }

    /// Forget any sort result and iteration state.
    pub fn clear_cursor(&mut self) {
        self.order = None;
        self.sorted = false;
        self.curr = None;
    }

    /// Sort the records and keep the first `limit` for iteration.
    pub fn sort(&mut self, limit: usize, order: SortOrder) -> Result<()> {
        self.clear_cursor();
        if self.records.is_empty() {
            return Err(GlaiveError::invalid_argument("cannot sort an empty result set"));
        }
        let mut keys: Vec<(i64, RecordKey)> =
            self.records.iter().map(|(k, info)| (info.score, *k)).collect();
        let limit = limit.min(keys.len());
        let cmp = |a: &(i64, RecordKey), b: &(i64, RecordKey)| order.compare((a.0, &a.1), (b.0, &b.1));
        if limit < keys.len() {
            keys.select_nth_unstable_by(limit, cmp);
            keys.truncate(limit);
        }
        keys.sort_unstable_by(cmp);
        self.order = Some(keys.into_iter().map(|(_, k)| k).collect());
        self.sorted = true;
        Ok(())
    }

    /// Restart iteration. Unsorted sets iterate in key order.
    pub fn rewind(&mut self) {
        if !self.sorted {
            let mut keys: Vec<RecordKey> = self.records.keys().copied().collect();
            keys.sort_unstable();
            self.order = Some(keys);
        }
        self.curr = None;
    }

    /// Move to the next record.
    pub fn next(&mut self) -> Option<Record> {
        if self.order.is_none() {
            self.rewind();
        }
        let order = self.order.as_ref()?;
        let next = self.curr.map_or(0, |c| c + 1);
        if next >= order.len() {
            self.curr = Some(order.len());
            return None;
        }
        self.curr = Some(next);
        self.curr_record()
    }

    /// The record iteration is on.
    pub fn curr_record(&self) -> Option<Record> {
        let key = *self.order.as_ref()?.get(self.curr?)?;
        self.record(key)
    }

    pub fn curr_score(&self) -> i64 {
        self.curr_record().map_or(0, |r| r.score)
    }

    /// Key bytes of the current record.
    pub fn curr_key(&self) -> Option<Vec<u8>> {
        self.key_bytes(self.curr_record()?.key)
    }

    /// The record stored under `key`.
    pub fn record(&self, key: RecordKey) -> Option<Record> {
        self.records.get(&key).map(|info| Record {
            key,
            score: info.score,
            n_subrecs: info.n_subrecs,
        })
    }

    /// Key bytes for a record key: the document key from the key table, or
    /// the group key of a user-defined group.
    pub fn key_bytes(&self, key: RecordKey) -> Option<Vec<u8>> {
        if let RecordUnit::UserDefined(_) = self.record_unit {
            return self.group_keys.get(key.rid.checked_sub(1)? as usize).cloned();
        }
        let keys = self.keys.as_ref()?.read();
        keys.key(key.rid).map(<[u8]>::to_vec)
    }

    /// Score of the document with key `key`, 0 when absent. Only meaningful
    /// for document-unit sets.
    pub fn find(&self, key: &[u8]) -> i64 {
        if self.record_unit != RecordUnit::Document {
            return 0;
        }
        let Some(rid) = self.keys.as_ref().and_then(|k| k.read().get(key)) else {
            return 0;
        };
        self.record(RecordKey::new(rid, 0, 0)).map_or(0, |r| r.score)
    }

    /// Look up the record for `key`, `section` and `pos` and make it
    /// current for [`curr_score`](Self::curr_score) and friends.
    pub fn at(&mut self, key: &[u8], section: u32, pos: u32) -> Option<Record> {
        let rkey = match self.record_unit {
            RecordUnit::UserDefined(_) => {
                let idx = self.group_keys.iter().position(|k| k == key)?;
                RecordKey::new(idx as u32 + 1, 0, 0)
            }
            unit => {
                let rid = self.keys.as_ref()?.read().get(key)?;
                RecordKey::new(rid, section, pos).truncate(unit)
            }
        };
        let record = self.record(rkey)?;
        self.order = Some(vec![rkey]);
        self.sorted = false;
        self.curr = Some(0);
        Some(record)
    }

    /// Sub-records kept for `key`, best first.
    pub fn subrecords(&self, key: RecordKey) -> Vec<SubRecord> {
        let Some(info) = self.records.get(&key) else {
            return Vec::new();
        };
        let mut subs = info.subrecs.clone();
        let order = self.subrec_order;
        subs.sort_by(|a, b| order.compare((a.score, &a.key), (b.score, &b.key)));
        subs
    }

    fn check_compatible(&self, other: &Records) -> Result<()> {
        let same = match (&self.keys, &other.keys) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same || self.record_unit != other.record_unit {
            return Err(GlaiveError::invalid_argument(
                "result sets do not share a key table and record unit",
            ));
        }
        Ok(())
    }

    /// Add the records of `other` missing here.
    pub fn union(&mut self, other: Records) -> Result<()> {
        self.check_compatible(&other)?;
        for (key, info) in other.records {
            self.records.entry(key).or_insert(info);
        }
        self.clear_cursor();
        Ok(())
    }

    /// Remove the records present in `other`.
    pub fn subtract(&mut self, other: Records) -> Result<()> {
        self.check_compatible(&other)?;
        self.records.retain(|key, _| !other.records.contains_key(key));
        self.clear_cursor();
        Ok(())
    }

    /// Keep only the records also present in `other`.
    pub fn intersect(&mut self, other: Records) -> Result<()> {
        self.check_compatible(&other)?;
        self.records.retain(|key, _| other.records.contains_key(key));
        self.clear_cursor();
        Ok(())
    }

    /// Remove the records common to both sets from both. Returns how many
    /// there were.
    pub fn difference(&mut self, other: &mut Records) -> Result<usize> {
        self.check_compatible(other)?;
        let common: Vec<RecordKey> = self
            .records
            .keys()
            .filter(|key| other.records.contains_key(key))
            .copied()
            .collect();
        for key in &common {
            self.records.remove(key);
            other.records.remove(key);
        }
        self.clear_cursor();
        other.clear_cursor();
        Ok(common.len())
    }

    /// Fold the records into one record per document, keeping the `limit`
    /// best of them as sub-records.
    pub fn group(&mut self, limit: usize) -> Result<()> {
        let width = self.record_unit.width().unwrap_or(0);
        if width <= 1 {
            return Err(GlaiveError::invalid_argument(
                "only section or position records can be grouped by document",
            ));
        }
        self.regroup(limit, SortOrder::Descending, RecordUnit::Document, |key| {
            Some(key.truncate(RecordUnit::Document))
        });
        Ok(())
    }

    /// Fold the records into groups named by `f`, keeping the `limit` best
    /// members of each group as sub-records. Records for which `f` returns
    /// `None` are dropped.
    pub fn group_by<F>(&mut self, limit: usize, order: SortOrder, mut f: F) -> Result<()>
    where
        F: FnMut(&Records, RecordKey) -> Option<Vec<u8>>,
    {
        let mut names: AHashMap<Vec<u8>, u32> = AHashMap::new();
        let mut group_keys = Vec::new();
        let mut assigned: AHashMap<RecordKey, RecordKey> = AHashMap::new();
        for key in self.records.keys() {
            let Some(name) = f(self, *key) else {
                continue;
            };
            let id = *names.entry(name.clone()).or_insert_with(|| {
                group_keys.push(name);
                group_keys.len() as u32
            });
            assigned.insert(*key, RecordKey::new(id, 0, 0));
        }
        let width = group_keys.iter().map(Vec::len).max().unwrap_or(0);
        let fixed = group_keys.iter().all(|k| k.len() == width);
        self.regroup(
            limit,
            order,
            RecordUnit::UserDefined(if fixed { width } else { 0 }),
            |key| assigned.get(&key).copied(),
        );
        self.group_keys = group_keys;
        Ok(())
    }

    fn regroup<F>(&mut self, limit: usize, order: SortOrder, unit: RecordUnit, mut f: F)
    where
        F: FnMut(RecordKey) -> Option<RecordKey>,
    {
        let mut groups: AHashMap<RecordKey, RecInfo> = AHashMap::new();
        for (key, info) in std::mem::take(&mut self.records) {
            let Some(gkey) = f(key) else {
                continue;
            };
            let group = groups.entry(gkey).or_default();
            group.score += info.score;
            group.n_subrecs += 1;
            let sub = SubRecord {
                score: info.score,
                key,
            };
            group.push_subrec(sub, limit, order);
        }
        self.records = groups;
        self.subrec_unit = self.record_unit;
        self.record_unit = unit;
        self.max_n_subrecs = limit;
        self.subrec_order = order;
        self.clear_cursor();
    }
}

fn check_units(record_unit: RecordUnit, subrec_unit: RecordUnit, max_n_subrecs: usize) -> Result<()> {
    let Some(width) = record_unit.width() else {
        return Err(GlaiveError::invalid_argument(format!(
            "{record_unit:?} is not a query record unit"
        )));
    };
    if max_n_subrecs > 0 && subrec_unit.width().is_none_or(|w| w <= width) {
        return Err(GlaiveError::invalid_argument(format!(
            "sub-records of {subrec_unit:?} are not finer than {record_unit:?}"
        )));
    }
    Ok(())
}
