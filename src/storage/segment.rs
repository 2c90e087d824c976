//! Fixed-size segments and the pool that maps them.
//!
//! A [`SegmentPool`] addresses a region file as an array of 256 KiB physical
//! segments. Segments are mapped lazily on first use and handed out as
//! `Arc<Segment>`: holding the `Arc` pins the mapping, and the pool only
//! unmaps segments nobody else holds.

use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;

use crate::error::{GlaiveError, Result};
use crate::storage::{Backing, StorageError};

/// Bits in a segment offset.
pub const W_OF_SEGMENT: u32 = 18;

/// Size of one segment in bytes.
pub const SEGMENT_SIZE: usize = 1 << W_OF_SEGMENT;

/// The bytes of one mapped segment.
pub enum Segment {
    Heap(Box<[u8]>),
    Mapped(MmapMut),
}

impl Deref for Segment {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Segment::Heap(bytes) => bytes,
            Segment::Mapped(map) => map,
        }
    }
}

impl DerefMut for Segment {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Segment::Heap(bytes) => bytes,
            Segment::Mapped(map) => map,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Segment::Heap(_) => "heap",
            Segment::Mapped(_) => "mapped",
        };
        f.debug_struct("Segment").field("kind", &kind).finish()
    }
}

/// Lazily mapped array of physical segments.
#[derive(Debug)]
pub struct SegmentPool {
    backing: Backing,
    slots: RwLock<Vec<Option<Arc<Segment>>>>,
    max_segments: usize,
}

impl SegmentPool {
    /// Create a pool over `backing` holding at most `max_segments` segments.
    pub fn new(backing: Backing, max_segments: usize) -> Self {
        SegmentPool {
            backing,
            slots: RwLock::new(Vec::new()),
            max_segments,
        }
    }

    /// Largest number of physical segments the pool can address.
    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Number of segments currently mapped.
    pub fn mapped_count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }

    /// Pin segment `pseg`, mapping it if needed.
    pub fn pin(&self, pseg: u32) -> Result<Arc<Segment>> {
        let idx = self.check_index(pseg)?;
        {
            let slots = self.slots.read();
            if let Some(Some(seg)) = slots.get(idx) {
                return Ok(Arc::clone(seg));
            }
        }

        let mut slots = self.slots.write();
        if slots.len() <= idx {
            slots.resize_with(idx + 1, || None);
        }
        if let Some(seg) = &slots[idx] {
            return Ok(Arc::clone(seg));
        }
        let seg = Arc::new(self.map_with_retry(&mut slots, pseg)?);
        slots[idx] = Some(Arc::clone(&seg));
        Ok(seg)
    }

    /// Mutable access to segment `pseg`. Fails if the segment is pinned.
    pub fn segment_mut(&mut self, pseg: u32) -> Result<&mut [u8]> {
        let idx = self.check_index(pseg)?;
        drop(self.pin(pseg)?);
        let slot = self
            .slots
            .get_mut()
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| GlaiveError::internal(format!("segment {pseg} vanished")))?;
        Arc::get_mut(slot)
            .map(|seg| &mut **seg)
            .ok_or_else(|| GlaiveError::internal(format!("segment {pseg} is pinned")))
    }

    /// Forget the mapping of a segment that no longer holds live data.
    pub fn release(&mut self, pseg: u32) {
        if let Some(slot) = self.slots.get_mut().get_mut(pseg as usize) {
            *slot = None;
        }
    }

    /// Unmap unpinned segments, visiting `order` front to back, until at
    /// most `limit` remain mapped. Returns the number unmapped.
    pub fn expire(&self, order: &[u32], limit: usize) -> usize {
        if !self.backing.is_evictable() {
            return 0;
        }
        let mut slots = self.slots.write();
        let mut mapped = slots.iter().filter(|s| s.is_some()).count();
        let mut evicted = 0;
        for &pseg in order {
            if mapped <= limit {
                break;
            }
            if let Some(slot) = slots.get_mut(pseg as usize) {
                if slot.as_ref().is_some_and(|seg| Arc::strong_count(seg) == 1) {
                    *slot = None;
                    mapped -= 1;
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            debug!("expired {evicted} segment mappings ({mapped} still mapped)");
        }
        evicted
    }

    /// Write dirty mapped segments back to the file.
    pub fn flush(&self) -> Result<()> {
        for seg in self.slots.read().iter().flatten() {
            if let Segment::Mapped(map) = &**seg {
                map.flush()?;
            }
        }
        Ok(())
    }

    fn check_index(&self, pseg: u32) -> Result<usize> {
        let idx = pseg as usize;
        if idx >= self.max_segments {
            return Err(GlaiveError::invalid_argument(format!(
                "segment {pseg} beyond limit {}",
                self.max_segments
            )));
        }
        Ok(idx)
    }

    fn map_with_retry(&self, slots: &mut [Option<Arc<Segment>>], pseg: u32) -> Result<Segment> {
        match self.map(pseg) {
            Ok(seg) => Ok(seg),
            Err(first) => {
                warn!("mapping segment {pseg} failed ({first}); evicting and retrying");
                for slot in slots.iter_mut() {
                    if slot.as_ref().is_some_and(|seg| Arc::strong_count(seg) == 1) {
                        *slot = None;
                    }
                }
                self.map(pseg).map_err(|e| {
                    StorageError::MapFailed(format!("segment {pseg}: {e}")).into()
                })
            }
        }
    }

    fn map(&self, pseg: u32) -> io::Result<Segment> {
        match &self.backing {
            Backing::Heap => Ok(Segment::Heap(vec![0u8; SEGMENT_SIZE].into_boxed_slice())),
            Backing::File(file) => {
                let offset = pseg as u64 * SEGMENT_SIZE as u64;
                let needed = offset + SEGMENT_SIZE as u64;
                if file.metadata()?.len() < needed {
                    file.set_len(needed)?;
                }
                let map = unsafe {
                    MmapOptions::new()
                        .offset(offset)
                        .len(SEGMENT_SIZE)
                        .map_mut(&**file)?
                };
                Ok(Segment::Mapped(map))
            }
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
    fn test_heap_segments_start_zeroed() {
        let mut pool = SegmentPool::new(Backing::Heap, 4);
        assert!(pool.pin(3).unwrap().iter().all(|&b| b == 0));
        assert!(pool.pin(4).is_err());

        pool.segment_mut(1).unwrap()[10] = 7;
        assert_eq!(pool.pin(1).unwrap()[10], 7);
        assert_eq!(pool.mapped_count(), 2);
    }

    #[test]
    fn test_pinned_segment_is_not_writable() {
        let mut pool = SegmentPool::new(Backing::Heap, 2);
        let pinned = pool.pin(0).unwrap();
        assert!(pool.segment_mut(0).is_err());
        drop(pinned);
        assert!(pool.segment_mut(0).is_ok());
    }

    #[test]
    fn test_heap_pool_never_expires() {
        let pool = SegmentPool::new(Backing::Heap, 8);
        for i in 0..4 {
            pool.pin(i).unwrap();
        }
        assert_eq!(pool.expire(&[3, 2, 1, 0], 0), 0);
        assert_eq!(pool.mapped_count(), 4);
    }

    #[test]
    fn test_file_pool_expire_keeps_data() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(dir.path())).unwrap();
        let mut pool = SegmentPool::new(storage.open_backing("seg").unwrap(), 8);

        pool.segment_mut(2).unwrap()[5] = 42;
        let pinned = pool.pin(0).unwrap();
        pool.pin(1).unwrap();

        let evicted = pool.expire(&[2, 1, 0], 0);
        assert_eq!(evicted, 2);
        assert_eq!(pool.mapped_count(), 1);
        drop(pinned);

        assert_eq!(pool.pin(2).unwrap()[5], 42);
        assert_eq!(storage.file_size("seg").unwrap(), 3 * SEGMENT_SIZE as u64);
    }
}
