//! Storage abstraction layer for Glaive.
//!
//! An index persists two kinds of data:
//!
//! - **Whole files** (configuration, symbol tables, the postings header) that
//!   are read and rewritten as a unit through the [`Storage`] trait.
//! - **Fixed-size regions** (postings segments and chunks) that are mapped
//!   piecewise by [`segment::SegmentPool`] and [`chunk::ChunkArena`]. Those
//!   ask the storage for a [`Backing`]: a real file to map with `memmap2`, or
//!   plain heap memory.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - One directory per index
//! - Whole files are replaced atomically (temp file + rename)
//! - Region files are memory mapped
//!
//! ## MemoryStorage
//! - Everything on the heap; nothing survives the process
//! - Used by most tests
//!
//! # Example
//!
//! ```
//! use glaive::storage::{StorageConfig, StorageFactory};
//!
//! # fn main() -> glaive::error::Result<()> {
//! let storage = StorageFactory::create(&StorageConfig::Memory)?;
//! storage.write_file("hello", b"world")?;
//! assert_eq!(storage.read_file("hello")?, b"world");
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};

pub mod chunk;
pub mod file;
pub mod memory;
pub mod segment;
pub mod structured;

/// Where the bytes of a region file live.
#[derive(Debug, Clone)]
pub enum Backing {
    /// Heap memory owned by the pool itself.
    Heap,
    /// A file opened for reading and writing, mapped on demand.
    File(Arc<File>),
}

impl Backing {
    /// Whether regions of this backing may be unmapped and mapped again.
    pub fn is_evictable(&self) -> bool {
        matches!(self, Backing::File(_))
    }
}

/// A trait for storage backends holding the files of one index.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read a whole file.
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Replace a whole file with `data`.
    fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Open a region file for mapping, creating it when missing.
    fn open_backing(&self, name: &str) -> Result<Backing>;

    /// Flush pending writes to durable media.
    fn sync(&self) -> Result<()>;
}

/// Storage configuration for an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StorageConfig {
    /// Files in the given directory.
    File(file::FileStorageConfig),

    /// Heap only.
    #[default]
    Memory,
}

impl StorageConfig {
    /// Convenience constructor for a file-backed index in `path`.
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        StorageConfig::File(file::FileStorageConfig::new(path))
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage instance with the given configuration.
    pub fn create(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory => Ok(Arc::new(memory::MemoryStorage::new())),
            StorageConfig::File(file_config) => {
                let storage = file::FileStorage::new(file_config.clone())?;
                Ok(Arc::new(storage))
            }
        }
    }

    /// Open an existing storage instance.
    ///
    /// Fails when a file-backed directory does not exist yet.
    pub fn open(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
        if let StorageConfig::File(file_config) = config {
            if !file_config.path.is_dir() {
                return Err(StorageError::FileNotFound(
                    file_config.path.display().to_string(),
                )
                .into());
            }
        }
        Self::create(config)
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// Mapping a region failed.
    MapFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::MapFailed(msg) => write!(f, "Mapping failed: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for GlaiveError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MapFailed(msg) => GlaiveError::memory_exhausted(msg),
            other => GlaiveError::storage(other.to_string()),
        }
    }
}
