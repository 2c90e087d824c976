//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};
use crate::storage::{Backing, Storage, StorageError};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the index files.
    pub path: PathBuf,

    /// Call `fsync` after every whole-file write.
    #[serde(default)]
    pub sync_writes: bool,
}

impl FileStorageConfig {
    /// Create a configuration rooted at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileStorageConfig {
            path: path.into(),
            sync_writes: false,
        }
    }
}

/// A file-based storage implementation.
#[derive(Debug)]
pub struct FileStorage {
    /// The root directory for storage.
    directory: PathBuf,
    /// Storage configuration.
    config: FileStorageConfig,
}

impl FileStorage {
    /// Create a new file storage in the configured directory.
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        let directory = config.path.clone();

        // Create directory if it doesn't exist
        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| GlaiveError::storage(format!("Failed to create directory: {e}")))?;
        }

        // Verify it's a directory
        if !directory.is_dir() {
            return Err(GlaiveError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    /// The directory this storage writes into.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Get the full path for a file name.
    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

impl Storage for FileStorage {
    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        std::fs::read(self.file_path(name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::FileNotFound(name.to_string()).into()
            } else {
                StorageError::IoError(e.to_string()).into()
            }
        })
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let tmp = self.file_path(&format!("{name}.tmp"));
        {
            let mut file = File::create(&tmp).map_err(|e| StorageError::IoError(e.to_string()))?;
            file.write_all(data)?;
            if self.config.sync_writes {
                file.sync_all()?;
            }
        }
        std::fs::rename(&tmp, self.file_path(name))
            .map_err(|e| StorageError::IoError(format!("Failed to replace {name}: {e}")))?;
        Ok(())
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| StorageError::IoError(format!("Failed to delete file: {e}")))?;
        }

        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = std::fs::metadata(self.file_path(name))
            .map_err(|_| StorageError::FileNotFound(name.to_string()))?;
        Ok(metadata.len())
    }

    fn open_backing(&self, name: &str) -> Result<Backing> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.file_path(name))
            .map_err(|e| StorageError::IoError(format!("Failed to open {name}: {e}")))?;
        Ok(Backing::File(Arc::new(file)))
    }

    fn sync(&self) -> Result<()> {
        // Whole files are synced on write when configured; region files are
        // flushed by their owners.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(temp_dir.path())).unwrap();

        storage.write_file("test.bin", b"Hello, World!").unwrap();
        assert!(storage.file_exists("test.bin"));
        assert_eq!(storage.file_size("test.bin").unwrap(), 13);
        assert_eq!(storage.read_file("test.bin").unwrap(), b"Hello, World!");

        storage.write_file("test.bin", b"again").unwrap();
        assert_eq!(storage.read_file("test.bin").unwrap(), b"again");

        storage.delete_file("test.bin").unwrap();
        assert!(!storage.file_exists("test.bin"));
        assert!(storage.read_file("test.bin").is_err());
    }

    #[test]
    fn test_list_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(temp_dir.path())).unwrap();

        storage.write_file("b", b"2").unwrap();
        storage.write_file("a", b"1").unwrap();
        storage.open_backing("c").unwrap();

        assert_eq!(storage.list_files().unwrap(), vec!["a", "b", "c"]);
    }
}
