//! The index handle.
//!
//! An [`Index`] owns everything one full-text index consists of: the key
//! table mapping document keys to record ids, the lexicon mapping terms to
//! term ids, the postings store and the analyzer shared by documents and
//! queries. Writers are serialized by the index lock; queries run against
//! a read view and may proceed concurrently with each other.
//!
//! # Example
//!
//! ```
//! use glaive::config::IndexConfig;
//! use glaive::index::{Index, Values};
//!
//! # fn main() -> glaive::error::Result<()> {
//! let index = Index::create(IndexConfig::in_memory())?;
//! index.update(b"doc1", 1, None, Some(&Values::from("hello world")))?;
//! index.update(b"doc1", 2, None, Some(&Values::new().with("greetings", 2)))?;
//!
//! let hits = index.sel("hello")?.unwrap();
//! assert_eq!(hits.nhits(), 1);
//! assert_eq!(index.info().n_keys, 1);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use crate::analysis::Analyzer;
use crate::analysis::lexer::{LexMode, Lexer};
use crate::config::{IndexConfig, IndexFlags};
use crate::error::{GlaiveError, Result};
use crate::lexicon::{DELETE_FLAG, SymbolTable};
use crate::postings::{EntryInfo, PendingSpecs, PostingStore, UpdateSpec};
use crate::query::{SelectOptions, Searcher};
use crate::records::{Operator, RecordUnit, Records};
use crate::storage::{Storage, StorageConfig, StorageFactory};

const META_FILE: &str = "meta.json";
const KEYS_FILE: &str = "keys.sym";
const LEXICON_FILE: &str = "lexicon.sym";

/// Version of the on-disk layout written to `meta.json`.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    format_version: u32,
    config: IndexConfig,
}

/// Weighted texts indexed into one section.
///
/// Every occurrence of a term in a value adds the value's weight to the
/// posting's score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    entries: Vec<(String, u32)>,
}

impl Values {
    pub fn new() -> Self {
        Values::default()
    }

    /// Append `text` carrying `weight`.
    pub fn add<S: Into<String>>(&mut self, text: S, weight: u32) {
        self.entries.push((text.into(), weight));
    }

    pub fn with<S: Into<String>>(mut self, text: S, weight: u32) -> Self {
        self.add(text, weight);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(text, weight)| (text.as_str(), *weight))
    }
}

impl From<&str> for Values {
    fn from(text: &str) -> Self {
        Values::new().with(text, 0)
    }
}

/// Summary of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub key_size: usize,
    pub flags: IndexFlags,
    pub initial_n_segments: usize,
    /// Documents in the key table.
    pub n_keys: usize,
    /// Terms in the lexicon.
    pub lexicon_size: usize,
    /// Bytes of mapped postings segments.
    pub segment_bytes: usize,
    /// Bytes of allocated postings chunks.
    pub chunk_bytes: usize,
}

/// Lexicon and postings, always locked together.
#[derive(Debug)]
struct Inner {
    lexicon: SymbolTable,
    store: PostingStore,
}

/// A full-text index.
#[derive(Debug)]
pub struct Index {
    config: IndexConfig,
    storage: Arc<dyn Storage>,
    analyzer: Analyzer,
    keys: Arc<RwLock<SymbolTable>>,
    inner: RwLock<Inner>,
    lock: ReentrantMutex<()>,
}

/// Held while [`Index::lock`] keeps other writers out.
pub type IndexLock<'a> = ReentrantMutexGuard<'a, ()>;

impl Index {
    /// Create a new, empty index as `config` describes.
    pub fn create(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let storage = StorageFactory::create(&config.storage)?;
        if storage.file_exists(META_FILE) {
            return Err(GlaiveError::invalid_argument("an index already exists there"));
        }
        let meta = Meta {
            format_version: FORMAT_VERSION,
            config: config.clone(),
        };
        storage.write_file(META_FILE, &serde_json::to_vec_pretty(&meta)?)?;

        let keys = SymbolTable::new(config.key_size, false);
        let lexicon = SymbolTable::new(0, config.flags.enable_suffix_search);
        let store = PostingStore::create(Arc::clone(&storage), config.postings())?;
        let index = Index::assemble(config, storage, keys, lexicon, store)?;
        index.save_tables()?;
        info!("created index ({:?})", index.config.storage);
        Ok(index)
    }

    /// Open an index created earlier at `location`.
    pub fn open(location: &StorageConfig) -> Result<Self> {
        let storage = StorageFactory::open(location)?;
        let meta: Meta = serde_json::from_slice(&storage.read_file(META_FILE)?)?;
        if meta.format_version != FORMAT_VERSION {
            return Err(GlaiveError::invalid_format(format!(
                "index format {} is not {FORMAT_VERSION}",
                meta.format_version
            )));
        }
        let mut config = meta.config;
        config.storage = location.clone();

        let keys = SymbolTable::load(storage.as_ref(), KEYS_FILE)?;
        let lexicon = SymbolTable::load(storage.as_ref(), LEXICON_FILE)?;
        let store = PostingStore::open(Arc::clone(&storage))?;
        info!("opened index ({:?}): {} keys, {} terms", location, keys.len(), lexicon.len());
        Index::assemble(config, storage, keys, lexicon, store)
    }

    fn assemble(
        config: IndexConfig,
        storage: Arc<dyn Storage>,
        keys: SymbolTable,
        lexicon: SymbolTable,
        store: PostingStore,
    ) -> Result<Self> {
        Ok(Index {
            analyzer: Analyzer::from_config(&config)?,
            config,
            storage,
            keys: Arc::new(RwLock::new(keys)),
            inner: RwLock::new(Inner { lexicon, store }),
            lock: ReentrantMutex::new(()),
        })
    }

    /// Write everything to storage and release the index.
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    /// Write the tables and the postings header to storage.
    pub fn sync(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.save_tables()?;
        self.inner.read().store.sync()?;
        self.storage.sync()
    }

    fn save_tables(&self) -> Result<()> {
        self.keys.read().save(self.storage.as_ref(), KEYS_FILE)?;
        self.inner.read().lexicon.save(self.storage.as_ref(), LEXICON_FILE)
    }

    /// Delete every file of the index at `location`.
    pub fn remove(location: &StorageConfig) -> Result<()> {
        let StorageConfig::File(file) = location else {
            return Ok(());
        };
        if !file.path.exists() {
            return Err(GlaiveError::invalid_argument(format!(
                "no index at {}",
                file.path.display()
            )));
        }
        let storage = StorageFactory::open(location)?;
        for name in storage.list_files()? {
            storage.delete_file(&name)?;
        }
        std::fs::remove_dir(&file.path)?;
        info!("removed index {}", file.path.display());
        Ok(())
    }

    /// Move the index directory `from` to `to`.
    pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        if to.exists() {
            return Err(GlaiveError::invalid_argument(format!("{} exists", to.display())));
        }
        std::fs::rename(from, to)?;
        info!("renamed index {} to {}", from.display(), to.display());
        Ok(())
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// The key table record ids refer to.
    pub fn keys(&self) -> &Arc<RwLock<SymbolTable>> {
        &self.keys
    }

    pub fn info(&self) -> IndexInfo {
        let inner = self.inner.read();
        IndexInfo {
            key_size: self.config.key_size,
            flags: self.config.flags,
            initial_n_segments: inner.store.initial_n_segments(),
            n_keys: self.keys.read().len(),
            lexicon_size: inner.lexicon.len(),
            segment_bytes: inner.store.segment_bytes(),
            chunk_bytes: inner.store.chunk_bytes(),
        }
    }

    /// Keep other writers out until the guard is dropped, waiting at most
    /// `timeout`. The holder may keep updating the index.
    pub fn lock(&self, timeout: Duration) -> Result<IndexLock<'_>> {
        self.lock
            .try_lock_for(timeout)
            .ok_or_else(|| GlaiveError::other(format!("index lock not acquired in {timeout:?}")))
    }

    /// Replace the text of section `section` of document `key`.
    ///
    /// `old` must be what the section holds now; only the terms that differ
    /// between `old` and `new` touch the postings. With no new values and
    /// `section == 0` the key itself is dropped.
    pub fn update(
        &self,
        key: &[u8],
        section: u32,
        old: Option<&Values>,
        new: Option<&Values>,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(GlaiveError::invalid_argument("empty document key"));
        }
        let new = new.filter(|v| !v.is_empty());
        if new.is_some() && section == 0 {
            return Err(GlaiveError::invalid_argument("values need a section above 0"));
        }
        let _guard = self.lock.lock();
        let mut keys = self.keys.write();
        let mut inner = self.inner.write();
        let Inner { lexicon, store } = &mut *inner;

        let mut additions = BTreeMap::new();
        if let Some(new) = new {
            let rid = keys.get_or_insert(key)?;
            self.collect_added(lexicon, rid, section, new, &mut additions)?;
        }
        let mut removals = BTreeMap::new();
        if let Some(old) = old {
            let rid = keys
                .get(key)
                .ok_or_else(|| GlaiveError::invalid_argument("old values given for an unknown key"))?;
            self.collect_existing(lexicon, rid, section, old, &mut removals)?;
        }

        // terms whose postings do not change are left alone
        removals.retain(|tid, spec| {
            let unchanged = additions.get(tid) == Some(&*spec);
            if unchanged {
                additions.remove(tid);
            }
            !unchanged
        });
        let pending: PendingSpecs = additions.iter().map(|(&t, s)| (t, s.clone())).collect();
        for (tid, spec) in removals {
            store.delete(lexicon, &pending, tid, &UpdateSpec::new(spec.rid, spec.sid))?;
        }
        for (tid, spec) in &additions {
            store.update(lexicon, &pending, *tid, spec, update_hint(lexicon, *tid))?;
        }
        if new.is_none() && section == 0 {
            keys.delete_key(key);
        }
        debug!("updated {} terms of section {section}", additions.len());
        store.expire();
        Ok(())
    }

    /// Replace the single text of document `key`, held in section 1.
    ///
    /// Every term of `old` is removed from all sections of the document.
    /// Without new text the key is dropped.
    pub fn upd(&self, key: &[u8], old: Option<&str>, new: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(GlaiveError::invalid_argument("empty document key"));
        }
        let _guard = self.lock.lock();
        let mut keys = self.keys.write();
        let mut inner = self.inner.write();
        let Inner { lexicon, store } = &mut *inner;

        let mut additions = BTreeMap::new();
        if let Some(new) = new.filter(|text| !text.is_empty()) {
            let rid = keys.get_or_insert(key)?;
            self.collect_added(lexicon, rid, 1, &Values::from(new), &mut additions)?;
        }
        let pending: PendingSpecs = additions.iter().map(|(&t, s)| (t, s.clone())).collect();
        if let Some(old) = old {
            let rid = keys
                .get(key)
                .ok_or_else(|| GlaiveError::invalid_argument("old text given for an unknown key"))?;
            let mut removals = BTreeMap::new();
            self.collect_existing(lexicon, rid, 0, &Values::from(old), &mut removals)?;
            for tid in removals.into_keys() {
                store.delete(lexicon, &pending, tid, &UpdateSpec::new(rid, 0))?;
            }
        }
        for (tid, spec) in &additions {
            store.update(lexicon, &pending, *tid, spec, update_hint(lexicon, *tid))?;
        }
        if additions.is_empty() {
            keys.delete_key(key);
        }
        store.expire();
        Ok(())
    }

    /// Flag document `key` deleted. Its postings stay; result sets with
    /// [`Records::set_ignore_deleted_records`] skip it.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut keys = self.keys.write();
        let rid = keys
            .get(key)
            .ok_or_else(|| GlaiveError::invalid_argument("unknown document key"))?;
        keys.set_pocket(rid, DELETE_FLAG)
    }

    /// Specs for every term of `values`, interning new terms.
    fn collect_added(
        &self,
        lexicon: &mut SymbolTable,
        rid: u32,
        section: u32,
        values: &Values,
        specs: &mut BTreeMap<u32, UpdateSpec>,
    ) -> Result<()> {
        for (text, weight) in values.iter() {
            let mut lexer = Lexer::open(&self.analyzer, text, LexMode::Add)?;
            while let Some(tid) = lexer.next_add(lexicon)? {
                specs
                    .entry(tid)
                    .or_insert_with(|| UpdateSpec::new(rid, section))
                    .add(lexer.pos(), weight);
            }
        }
        Ok(())
    }

    /// Specs for the terms of `values` the lexicon knows.
    fn collect_existing(
        &self,
        lexicon: &SymbolTable,
        rid: u32,
        section: u32,
        values: &Values,
        specs: &mut BTreeMap<u32, UpdateSpec>,
    ) -> Result<()> {
        for (text, weight) in values.iter() {
            for token in self.analyzer.analyze(text)? {
                match lexicon.get(token.text.as_bytes()) {
                    Some(tid) => specs
                        .entry(tid)
                        .or_insert_with(|| UpdateSpec::new(rid, section))
                        .add(token.position, weight),
                    None => warn!("old term {:?} of section {section} not in lexicon", token.text),
                }
            }
        }
        Ok(())
    }

    /// Evaluate `query` into `records`. A result set without a key table is
    /// given this index's.
    pub fn select(
        &self,
        query: &str,
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
    ) -> Result<()> {
        match records.keys() {
            None => records.set_keys(Arc::clone(&self.keys)),
            Some(keys) if !Arc::ptr_eq(keys, &self.keys) => {
                return Err(GlaiveError::invalid_argument(
                    "result set belongs to another index",
                ));
            }
            Some(_) => {}
        }
        let keys = self.keys.read();
        let inner = self.inner.read();
        Searcher::new(&inner.store, &inner.lexicon, &keys, &self.analyzer)
            .select(query, records, op, options)
    }

    /// Evaluate `query` as a phrase, broadening it while it has at most
    /// `escalation_threshold` hits. Returns `None` when nothing matched.
    pub fn sel(&self, query: &str) -> Result<Option<Records>> {
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
        records.set_keys(Arc::clone(&self.keys));
        {
            let keys = self.keys.read();
            let inner = self.inner.read();
            Searcher::new(&inner.store, &inner.lexicon, &keys, &self.analyzer).sel_into(
                query,
                self.config.escalation_threshold,
                &mut records,
            )?;
        }
        Ok(if records.is_empty() { None } else { Some(records) })
    }

    /// Slot diagnostics of `term`, `None` for terms not in the lexicon.
    pub fn term_info(&self, term: &str) -> Result<Option<EntryInfo>> {
        let inner = self.inner.read();
        let Some(tid) = inner.lexicon.get(self.analyzer.normalize(term).as_bytes()) else {
            return Ok(None);
        };
        inner.store.entry_info(&inner.lexicon, tid).map(Some)
    }

    /// Estimated posting count of `term`, 0 for unknown terms.
    pub fn estimate_size(&self, term: &str) -> Result<u32> {
        let inner = self.inner.read();
        match inner.lexicon.get(self.analyzer.normalize(term).as_bytes()) {
            Some(tid) => inner.store.estimate_size(tid),
            None => Ok(0),
        }
    }

    /// Unmap postings segments beyond the working-set threshold.
    pub fn expire(&self) -> usize {
        self.inner.read().store.expire()
    }

    /// Merge every buffered posting into chunks.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut inner = self.inner.write();
        let Inner { lexicon, store } = &mut *inner;
        store.flush_all(lexicon, &PendingSpecs::default())
    }
}

/// Buffer placement hint: terms starting with the same ASCII letter or
/// digit share buffer segments.
fn update_hint(lexicon: &SymbolTable, tid: u32) -> u32 {
    match lexicon.key(tid).and_then(|key| key.first()) {
        Some(&c) if c.is_ascii_alphanumeric() => u32::from(c),
        _ => tid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SelectMode;

    fn hits(index: &Index, query: &str) -> usize {
        index.sel(query).unwrap().map_or(0, |r| r.nhits())
    }

    #[test]
    fn test_update_diffs_old_and_new() {
        let index = Index::create(IndexConfig::in_memory()).unwrap();
        let v1 = Values::from("red apple");
        let v2 = Values::from("green apple");
        index.update(b"k", 1, None, Some(&v1)).unwrap();
        assert_eq!(hits(&index, "red"), 1);

        index.update(b"k", 1, Some(&v1), Some(&v2)).unwrap();
        assert_eq!(hits(&index, "red"), 0);
        assert_eq!(hits(&index, "green"), 1);
        assert_eq!(hits(&index, "apple"), 1);
        assert!(index.term_info("red").unwrap().is_none());

        index.update(b"k", 0, Some(&v2), None).unwrap();
        assert_eq!(hits(&index, "apple"), 0);
        assert_eq!(index.info().n_keys, 0);
    }

    #[test]
    fn test_update_rejects_bad_arguments() {
        let index = Index::create(IndexConfig::in_memory()).unwrap();
        let v = Values::from("text");
        assert!(index.update(b"", 1, None, Some(&v)).is_err());
        assert!(index.update(b"k", 0, None, Some(&v)).is_err());
        assert!(index.update(b"missing", 1, Some(&v), None).is_err());
        assert!(index.del(b"missing").is_err());
    }

    #[test]
    fn test_weights_become_scores() {
        let index = Index::create(IndexConfig::in_memory()).unwrap();
        let values = Values::new().with("rust", 5).with("rust rust", 1);
        index.update(b"k", 1, None, Some(&values)).unwrap();
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        index
            .select("rust", &mut records, Operator::Or, &SelectOptions::default())
            .unwrap();
        // tf 3 plus score 5 + 1 + 1
        assert_eq!(records.find(b"k"), 10);
    }

    #[test]
    fn test_upd_and_del() {
        let index = Index::create(IndexConfig::in_memory()).unwrap();
        index.upd(b"a", None, Some("hello world")).unwrap();
        index.upd(b"b", None, Some("hello there")).unwrap();
        assert_eq!(hits(&index, "hello"), 2);

        index.upd(b"a", Some("hello world"), Some("goodbye world")).unwrap();
        assert_eq!(hits(&index, "hello"), 1);
        assert_eq!(hits(&index, "goodbye"), 1);

        index.del(b"b").unwrap();
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        records.set_ignore_deleted_records(true);
        let options = SelectOptions::new(SelectMode::Exact);
        index.select("hello", &mut records, Operator::Or, &options).unwrap();
        assert!(records.is_empty());

        index.upd(b"a", Some("goodbye world"), None).unwrap();
        assert_eq!(index.info().n_keys, 1);
        assert_eq!(index.info().lexicon_size, 2);
    }

    #[test]
    fn test_select_rejects_foreign_records() {
        let a = Index::create(IndexConfig::in_memory()).unwrap();
        let b = Index::create(IndexConfig::in_memory()).unwrap();
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        let options = SelectOptions::default();
        a.select("x", &mut records, Operator::Or, &options).unwrap();
        assert!(b.select("x", &mut records, Operator::Or, &options).is_err());
    }

    #[test]
    fn test_lock_is_reentrant() {
        let index = Index::create(IndexConfig::in_memory()).unwrap();
        let guard = index.lock(Duration::from_millis(10)).unwrap();
        index.upd(b"k", None, Some("inside the lock")).unwrap();
        drop(guard);
        assert_eq!(hits(&index, "lock"), 1);
    }

    #[test]
    fn test_update_hint() {
        let mut lexicon = SymbolTable::new(0, false);
        let apple = lexicon.get_or_insert(b"apple").unwrap();
        let dash = lexicon.get_or_insert(b"-x").unwrap();
        assert_eq!(update_hint(&lexicon, apple), u32::from(b'a'));
        assert_eq!(update_hint(&lexicon, dash), dash);
    }
}
