//! Symbol tables mapping byte strings to small integer ids.
//!
//! A [`SymbolTable`] serves two roles in an index: the lexicon (term text to
//! term id) and the key table (document key to record id). Every id carries a
//! 32-bit *pocket* the owner may use freely; the postings store keeps the
//! position of an inline posting there, and the index marks deleted
//! documents with [`DELETE_FLAG`].
//!
//! Keys are kept in a `BTreeMap` so prefix enumeration is a range scan. When
//! suffix search is enabled a second map over reversed keys answers suffix
//! queries the same way.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};
use crate::storage::Storage;
use crate::storage::structured::{self, BlobKind};

/// Longest key a table accepts.
pub const MAX_KEY_LENGTH: usize = 0xffff;

/// Pocket value marking a deleted document key.
pub const DELETE_FLAG: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    key: Vec<u8>,
    pocket: u32,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    key_size: usize,
    enable_suffix_search: bool,
    entries: Vec<Option<Entry>>,
}

/// Byte-string to id dictionary with prefix and suffix enumeration.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    key_size: usize,
    enable_suffix_search: bool,
    /// Slot `id - 1` holds the entry of `id`.
    entries: Vec<Option<Entry>>,
    by_key: BTreeMap<Vec<u8>, u32>,
    by_reversed: BTreeMap<Vec<u8>, u32>,
    free_ids: Vec<u32>,
    max_key_len: usize,
}

impl SymbolTable {
    /// Create an empty table. `key_size > 0` fixes the width of every key.
    pub fn new(key_size: usize, enable_suffix_search: bool) -> Self {
        SymbolTable {
            key_size,
            enable_suffix_search,
            entries: Vec::new(),
            by_key: BTreeMap::new(),
            by_reversed: BTreeMap::new(),
            free_ids: Vec::new(),
            max_key_len: 0,
        }
    }

    /// Fixed key width, or 0 for variable-length keys.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether the table holds no keys.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Largest id ever handed out.
    pub fn max_id(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Look up the id of `key`.
    pub fn get(&self, key: &[u8]) -> Option<u32> {
        self.by_key.get(key).copied()
    }

    /// Return the id of `key`, adding it if missing.
    pub fn get_or_insert(&mut self, key: &[u8]) -> Result<u32> {
        if let Some(id) = self.get(key) {
            return Ok(id);
        }
        self.check_key(key)?;

        let entry = Entry {
            key: key.to_vec(),
            pocket: 0,
        };
        let id = match self.free_ids.pop() {
            Some(id) => {
                self.entries[id as usize - 1] = Some(entry);
                id
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() as u32
            }
        };
        self.by_key.insert(key.to_vec(), id);
        if self.enable_suffix_search && self.key_size == 0 {
            self.by_reversed.insert(reversed(key), id);
        }
        self.max_key_len = self.max_key_len.max(key.len());
        Ok(id)
    }

    /// The key of `id`.
    pub fn key(&self, id: u32) -> Option<&[u8]> {
        self.entry(id).map(|e| e.key.as_slice())
    }

    /// Remove `id`. Returns false when it was not present.
    pub fn delete(&mut self, id: u32) -> bool {
        let Some(slot) = id
            .checked_sub(1)
            .and_then(|i| self.entries.get_mut(i as usize))
        else {
            return false;
        };
        let Some(entry) = slot.take() else {
            return false;
        };
        self.by_key.remove(&entry.key);
        self.by_reversed.remove(&reversed(&entry.key));
        self.free_ids.push(id);
        true
    }

    /// Remove `key`. Returns false when it was not present.
    pub fn delete_key(&mut self, key: &[u8]) -> bool {
        match self.get(key) {
            Some(id) => self.delete(id),
            None => false,
        }
    }

    /// The pocket of `id`.
    pub fn pocket(&self, id: u32) -> Option<u32> {
        self.entry(id).map(|e| e.pocket)
    }

    /// Overwrite the pocket of `id`.
    pub fn set_pocket(&mut self, id: u32, value: u32) -> Result<()> {
        let entry = id
            .checked_sub(1)
            .and_then(|i| self.entries.get_mut(i as usize))
            .and_then(Option::as_mut)
            .ok_or_else(|| GlaiveError::invalid_argument(format!("no symbol with id {id}")))?;
        entry.pocket = value;
        Ok(())
    }

    /// Ids of every key starting with `prefix`, in key order.
    pub fn prefix_search(&self, prefix: &[u8]) -> Vec<u32> {
        if self.key_size > 0 {
            return Vec::new();
        }
        range_with_prefix(&self.by_key, prefix).collect()
    }

    /// Ids of every key ending with `suffix`.
    ///
    /// Without suffix search only an exact match is returned.
    pub fn suffix_search(&self, suffix: &[u8]) -> Vec<u32> {
        if self.key_size > 0 {
            return Vec::new();
        }
        if !self.enable_suffix_search {
            return self.get(suffix).into_iter().collect();
        }
        range_with_prefix(&self.by_reversed, &reversed(suffix)).collect()
    }

    /// Ids of keys that contain `infix` at the start of some tail of the key.
    ///
    /// A tail consisting of a single character only counts when it is the
    /// whole key. Without suffix search this degrades to a prefix search.
    pub fn infix_search(&self, infix: &[u8]) -> Vec<u32> {
        if self.key_size > 0 || infix.is_empty() {
            return Vec::new();
        }
        if !self.enable_suffix_search {
            return self.prefix_search(infix);
        }
        self.by_key
            .iter()
            .filter(|(key, _)| has_infix(key, infix))
            .map(|(_, &id)| id)
            .collect()
    }

    /// The longest key that is a prefix of `text`, with its length in bytes.
    pub fn common_prefix_search(&self, text: &[u8]) -> Option<(u32, usize)> {
        if self.key_size > 0 {
            return None;
        }
        let longest = self.max_key_len.min(text.len());
        (1..=longest)
            .rev()
            .find_map(|len| self.by_key.get(&text[..len]).map(|&id| (id, len)))
    }

    /// Iterate live `(id, key)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u32 + 1, e.key.as_slice())))
    }

    /// Persist the table to `name`.
    pub fn save(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let snapshot = Snapshot {
            key_size: self.key_size,
            enable_suffix_search: self.enable_suffix_search,
            entries: self.entries.clone(),
        };
        structured::write_blob(storage, name, BlobKind::SymbolTable, &snapshot)
    }

    /// Load a table saved with [`SymbolTable::save`].
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Self> {
        let snapshot: Snapshot = structured::read_blob(storage, name, BlobKind::SymbolTable)?;
        let mut table = SymbolTable::new(snapshot.key_size, snapshot.enable_suffix_search);
        for (i, entry) in snapshot.entries.iter().enumerate() {
            let id = i as u32 + 1;
            match entry {
                Some(e) => {
                    if table.by_key.insert(e.key.clone(), id).is_some() {
                        return Err(GlaiveError::invalid_format(format!(
                            "duplicate key in symbol table {name}"
                        )));
                    }
                    if table.enable_suffix_search && table.key_size == 0 {
                        table.by_reversed.insert(reversed(&e.key), id);
                    }
                    table.max_key_len = table.max_key_len.max(e.key.len());
                }
                None => table.free_ids.push(id),
            }
        }
        table.entries = snapshot.entries;
        Ok(table)
    }

    fn entry(&self, id: u32) -> Option<&Entry> {
        self.entries.get(id.checked_sub(1)? as usize)?.as_ref()
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(GlaiveError::invalid_argument("empty key"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(GlaiveError::invalid_argument(format!(
                "key of {} bytes exceeds {MAX_KEY_LENGTH}",
                key.len()
            )));
        }
        if self.key_size > 0 && key.len() != self.key_size {
            return Err(GlaiveError::invalid_argument(format!(
                "key of {} bytes in a table of {}-byte keys",
                key.len(),
                self.key_size
            )));
        }
        Ok(())
    }
}

fn reversed(key: &[u8]) -> Vec<u8> {
    key.iter().rev().copied().collect()
}

fn has_infix(key: &[u8], infix: &[u8]) -> bool {
    let starts: Vec<usize> = match std::str::from_utf8(key) {
        Ok(text) => text.char_indices().map(|(i, _)| i).collect(),
        Err(_) => (0..key.len()).collect(),
    };
    starts.iter().enumerate().any(|(n, &i)| {
        key[i..].starts_with(infix) && (i == 0 || starts.len() - n >= 2)
    })
}

fn range_with_prefix<'a>(
    map: &'a BTreeMap<Vec<u8>, u32>,
    prefix: &'a [u8],
) -> impl Iterator<Item = u32> + 'a {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
        .map(|(_, &id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn table(words: &[&str]) -> SymbolTable {
        let mut table = SymbolTable::new(0, true);
        for w in words {
            table.get_or_insert(w.as_bytes()).unwrap();
        }
        table
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut t = table(&["apple", "banana"]);
        assert_eq!(t.get(b"apple"), Some(1));
        assert_eq!(t.get_or_insert(b"banana").unwrap(), 2);
        assert_eq!(t.key(2), Some(&b"banana"[..]));
        assert_eq!(t.get(b"cherry"), None);
        assert!(t.get_or_insert(b"").is_err());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_delete_reuses_id() {
        let mut t = table(&["a", "b", "c"]);
        assert!(t.delete(2));
        assert!(!t.delete(2));
        assert_eq!(t.get(b"b"), None);
        assert_eq!(t.get_or_insert(b"d").unwrap(), 2);
        assert_eq!(t.max_id(), 3);
    }

    #[test]
    fn test_pockets() {
        let mut t = table(&["x"]);
        assert_eq!(t.pocket(1), Some(0));
        t.set_pocket(1, 77).unwrap();
        assert_eq!(t.pocket(1), Some(77));
        assert!(t.set_pocket(9, 1).is_err());
    }

    #[test]
    fn test_prefix_and_suffix_search() {
        let t = table(&["car", "cart", "scar", "dog", "ca"]);
        let mut prefix = t.prefix_search(b"car");
        prefix.sort();
        assert_eq!(prefix, vec![1, 2]);

        let mut suffix = t.suffix_search(b"ar");
        suffix.sort();
        assert_eq!(suffix, vec![1, 3]);

        assert!(t.prefix_search(b"z").is_empty());
    }

    #[test]
    fn test_suffix_search_disabled() {
        let mut t = SymbolTable::new(0, false);
        t.get_or_insert(b"car").unwrap();
        t.get_or_insert(b"scar").unwrap();
        assert_eq!(t.suffix_search(b"car"), vec![1]);
        assert_eq!(t.infix_search(b"ca"), vec![1]);
    }

    #[test]
    fn test_infix_search() {
        let t = table(&["scary", "car", "oscar", "a", "ba"]);
        let mut ids = t.infix_search(b"car");
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);

        // a trailing single character only matches the key itself
        let mut ids = t.infix_search(b"a");
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_common_prefix_search() {
        let t = table(&["new", "newyork", "york"]);
        assert_eq!(t.common_prefix_search(b"newyorker"), Some((2, 7)));
        assert_eq!(t.common_prefix_search(b"newark"), Some((1, 3)));
        assert_eq!(t.common_prefix_search(b"boston"), None);
    }

    #[test]
    fn test_fixed_width_keys() {
        let mut t = SymbolTable::new(4, false);
        assert_eq!(t.get_or_insert(&7u32.to_le_bytes()).unwrap(), 1);
        assert!(t.get_or_insert(b"abc").is_err());
        assert!(t.prefix_search(&[7]).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let mut t = table(&["alpha", "beta", "gamma"]);
        t.delete(2);
        t.set_pocket(3, 5).unwrap();
        t.save(&storage, "lex").unwrap();

        let mut loaded = SymbolTable::load(&storage, "lex").unwrap();
        assert_eq!(loaded.get(b"gamma"), Some(3));
        assert_eq!(loaded.pocket(3), Some(5));
        assert_eq!(loaded.get(b"beta"), None);
        assert_eq!(loaded.suffix_search(b"mma"), vec![3]);
        assert_eq!(loaded.get_or_insert(b"delta").unwrap(), 2);
    }
}
