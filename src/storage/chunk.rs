//! Chunk arena and its occupancy map.
//!
//! Chunks are immutable byte ranges addressed by unit number. The
//! [`ChunkArena`] owns the bytes and grows in whole units; the [`ChunkMap`]
//! records which units are in use and hands out first-fit runs.

use std::fs::File;
use std::sync::Arc;

use bit_vec::BitVec;
use log::error;
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};

use crate::error::{GlaiveError, Result};
use crate::storage::{Backing, StorageError};

/// Bits in a chunk unit.
pub const W_OF_CHUNK_UNIT: u32 = 18;

/// Allocation granularity of the arena in bytes.
pub const CHUNK_UNIT: usize = 1 << W_OF_CHUNK_UNIT;

/// Chunk reference of a buffer that has never been flushed.
pub const CHUNK_NOT_ASSIGNED: u32 = 0xffff_ffff;

/// Number of units needed to hold `size` bytes.
pub fn units_for(size: usize) -> usize {
    size.div_ceil(CHUNK_UNIT)
}

enum ArenaData {
    Heap(Vec<u8>),
    Mapped {
        file: Arc<File>,
        map: Option<MmapMut>,
    },
}

/// Growable byte store for chunk data.
pub struct ChunkArena {
    data: ArenaData,
}

impl std::fmt::Debug for ChunkArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkArena").field("len", &self.len()).finish()
    }
}

impl ChunkArena {
    /// Open an arena on `backing`, mapping any existing file contents.
    pub fn new(backing: Backing) -> Result<Self> {
        let data = match backing {
            Backing::Heap => ArenaData::Heap(Vec::new()),
            Backing::File(file) => {
                let map = if file.metadata()?.len() > 0 {
                    Some(map_file(&file)?)
                } else {
                    None
                };
                ArenaData::Mapped { file, map }
            }
        };
        Ok(ChunkArena { data })
    }

    /// Current size in bytes.
    pub fn len(&self) -> usize {
        match &self.data {
            ArenaData::Heap(bytes) => bytes.len(),
            ArenaData::Mapped { map, .. } => map.as_ref().map_or(0, |m| m.len()),
        }
    }

    /// Whether the arena holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow the arena so that units `0..end_unit` exist.
    pub fn ensure_units(&mut self, end_unit: usize) -> Result<()> {
        let needed = end_unit * CHUNK_UNIT;
        if needed <= self.len() {
            return Ok(());
        }
        match &mut self.data {
            ArenaData::Heap(bytes) => {
                bytes
                    .try_reserve(needed - bytes.len())
                    .map_err(|e| GlaiveError::memory_exhausted(format!("chunk arena: {e}")))?;
                bytes.resize(needed, 0);
            }
            ArenaData::Mapped { file, map } => {
                if let Some(old) = map.take() {
                    old.flush()?;
                }
                file.set_len(needed as u64)?;
                *map = Some(map_file(file)?);
            }
        }
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let all: &[u8] = match &self.data {
            ArenaData::Heap(bytes) => bytes,
            ArenaData::Mapped { map, .. } => map.as_deref().unwrap_or(&[]),
        };
        all.get(offset..offset + len).ok_or_else(|| {
            GlaiveError::invalid_format(format!(
                "chunk range {offset}+{len} outside arena of {} bytes",
                all.len()
            ))
        })
    }

    /// Copy `data` into the arena at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let all: &mut [u8] = match &mut self.data {
            ArenaData::Heap(bytes) => bytes,
            ArenaData::Mapped { map, .. } => map.as_deref_mut().unwrap_or(&mut []),
        };
        let len = all.len();
        let target = all.get_mut(offset..offset + data.len()).ok_or_else(|| {
            GlaiveError::internal(format!(
                "chunk write {offset}+{} outside arena of {len} bytes",
                data.len()
            ))
        })?;
        target.copy_from_slice(data);
        Ok(())
    }

    /// Write mapped contents back to the file.
    pub fn flush(&self) -> Result<()> {
        if let ArenaData::Mapped { map: Some(map), .. } = &self.data {
            map.flush()?;
        }
        Ok(())
    }
}

fn map_file(file: &File) -> Result<MmapMut> {
    unsafe { MmapMut::map_mut(file) }
        .map_err(|e| StorageError::MapFailed(format!("chunk arena: {e}")).into())
}

/// Occupancy bitmap over chunk units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMap {
    used: BitVec,
    max_units: usize,
}

impl ChunkMap {
    /// An empty map allowing at most `max_units` units.
    pub fn new(max_units: usize) -> Self {
        ChunkMap {
            used: BitVec::new(),
            max_units,
        }
    }

    /// Upper bound on allocatable units.
    pub fn max_units(&self) -> usize {
        self.max_units
    }

    /// One past the highest unit ever tracked.
    pub fn end_unit(&self) -> usize {
        self.used.len()
    }

    /// Number of units currently allocated.
    pub fn units_in_use(&self) -> usize {
        self.used.iter().filter(|b| *b).count()
    }

    /// Allocate a first-fit run large enough for `size` bytes.
    pub fn allocate(&mut self, size: usize) -> Result<u32> {
        let n = units_for(size).max(1);
        let mut run = 0;
        let mut start = 0;
        for (i, used) in self.used.iter().enumerate() {
            if used {
                run = 0;
                start = i + 1;
            } else {
                run += 1;
                if run == n {
                    break;
                }
            }
        }
        if run < n && start + n > self.max_units {
            error!("index full: no run of {n} chunk units left");
            return Err(GlaiveError::memory_exhausted("index full"));
        }
        if self.used.len() < start + n {
            self.used.grow(start + n - self.used.len(), false);
        }
        for i in start..start + n {
            self.used.set(i, true);
        }
        Ok(start as u32)
    }

    /// Release the units holding a chunk of `size` bytes.
    pub fn free(&mut self, chunk: u32, size: usize) {
        let start = chunk as usize;
        let end = (start + units_for(size).max(1)).min(self.used.len());
        for i in start..end {
            self.used.set(i, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::file::{FileStorage, FileStorageConfig};
    use tempfile::TempDir;

    #[test]
    fn test_chunk_map_first_fit() {
        let mut map = ChunkMap::new(8);
        assert_eq!(map.allocate(10).unwrap(), 0);
        assert_eq!(map.allocate(CHUNK_UNIT + 1).unwrap(), 1);
        assert_eq!(map.allocate(1).unwrap(), 3);
        assert_eq!(map.units_in_use(), 4);

        map.free(1, CHUNK_UNIT + 1);
        assert_eq!(map.allocate(CHUNK_UNIT).unwrap(), 1);
        assert_eq!(map.allocate(CHUNK_UNIT * 2).unwrap(), 4);
        assert_eq!(map.end_unit(), 6);
    }

    #[test]
    fn test_chunk_map_full() {
        let mut map = ChunkMap::new(2);
        map.allocate(CHUNK_UNIT).unwrap();
        let err = map.allocate(CHUNK_UNIT * 2).unwrap_err();
        assert!(err.is_memory_exhausted());
        assert_eq!(map.allocate(1).unwrap(), 1);
    }

    #[test]
    fn test_heap_arena_grows() {
        let mut arena = ChunkArena::new(Backing::Heap).unwrap();
        assert!(arena.is_empty());
        assert!(arena.write(0, b"x").is_err());

        arena.ensure_units(2).unwrap();
        arena.write(CHUNK_UNIT + 3, b"abc").unwrap();
        assert_eq!(arena.bytes(CHUNK_UNIT + 3, 3).unwrap(), b"abc");
        assert!(arena.bytes(2 * CHUNK_UNIT - 1, 2).is_err());
    }

    #[test]
    fn test_file_arena_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(dir.path())).unwrap();
        {
            let mut arena = ChunkArena::new(storage.open_backing("c").unwrap()).unwrap();
            arena.ensure_units(1).unwrap();
            arena.write(7, b"chunk").unwrap();
            arena.ensure_units(2).unwrap();
            arena.flush().unwrap();
        }
        let arena = ChunkArena::new(storage.open_backing("c").unwrap()).unwrap();
        assert_eq!(arena.len(), 2 * CHUNK_UNIT);
        assert_eq!(arena.bytes(7, 5).unwrap(), b"chunk");
    }
}
