//! In-memory storage implementation for testing and temporary indexes.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{Backing, Storage, StorageError};

/// An in-memory storage implementation.
///
/// Whole files live in a map; region files are heap backed, so the pools
/// that use them keep their bytes for as long as the index is open.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Box<[u8]>>>,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl Storage for MemoryStorage {
    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(data.to_vec())
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .insert(name.to_string(), data.to_vec().into_boxed_slice());
        Ok(())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        Ok(data.len() as u64)
    }

    fn open_backing(&self, _name: &str) -> Result<Backing> {
        Ok(Backing::Heap)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();

        storage.write_file("test.txt", b"Hello, World!").unwrap();
        assert!(storage.file_exists("test.txt"));
        assert_eq!(storage.file_size("test.txt").unwrap(), 13);
        assert_eq!(storage.read_file("test.txt").unwrap(), b"Hello, World!");
        assert_eq!(storage.file_count(), 1);

        storage.delete_file("test.txt").unwrap();
        assert!(!storage.file_exists("test.txt"));
        assert!(storage.read_file("test.txt").is_err());
    }

    #[test]
    fn test_list_files_sorted() {
        let storage = MemoryStorage::new();
        storage.write_file("z", b"").unwrap();
        storage.write_file("m", b"").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["m", "z"]);
    }
}
