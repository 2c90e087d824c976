//! The postings store proper.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PostingsConfig;
use crate::error::{GlaiveError, Result};
use crate::lexicon::SymbolTable;
use crate::postings::buffer::{
    self, BufferHeader, BufferTerm, HEADER_SIZE, TERM_SIZE, encode_payload, record_size,
    term_index, term_offset,
};
use crate::postings::chunk::ChunkWriter;
use crate::postings::cursor::PostingCursor;
use crate::postings::merge::PostingMerge;
use crate::postings::slot::Slot;
use crate::postings::update_spec::{PendingSpecs, UpdateSpec};
use crate::postings::{DocId, Posting};
use crate::storage::Storage;
use crate::storage::chunk::{CHUNK_NOT_ASSIGNED, CHUNK_UNIT, ChunkArena, ChunkMap, units_for};
use crate::storage::segment::{SEGMENT_SIZE, SegmentPool, W_OF_SEGMENT};
use crate::storage::structured::{self, BlobKind};

/// File holding array and buffer segments.
pub const SEGMENT_FILE: &str = "postings.seg";

/// File holding chunk data.
pub const CHUNK_FILE: &str = "postings.chunk";

/// File holding the store header.
pub const HEADER_FILE: &str = "postings.hdr";

const IDSTR: &str = "GLAIVE:POSTINGS:01";

/// Logical segment without a physical one.
pub const SEG_NOT_ASSIGNED: u32 = 0xffff;

/// Bits of a term id addressing a slot inside one array segment.
const W_OF_ARRAY: u32 = 16;
const ARRAY_MASK: u32 = (1 << W_OF_ARRAY) - 1;

/// Live terms a buffer segment takes before its chunk size starts to matter.
const MAX_TERMS_PER_BUFFER: u16 = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreHeader {
    idstr: String,
    initial_n_segments: usize,
    /// Sum of chunk sizes in KiB.
    total_chunk_size: u64,
    amax: u32,
    bmax: u32,
    smax: u32,
    /// Physical segment of each logical array segment.
    ainfo: Vec<u32>,
    /// Physical segment of each logical buffer segment.
    binfo: Vec<u32>,
    chunks: ChunkMap,
}

impl StoreHeader {
    fn new(config: &PostingsConfig) -> Self {
        StoreHeader {
            idstr: IDSTR.to_string(),
            initial_n_segments: config.initial_n_segments,
            total_chunk_size: 0,
            amax: 0,
            bmax: 0,
            smax: 0,
            ainfo: vec![SEG_NOT_ASSIGNED; config.max_segments],
            binfo: vec![SEG_NOT_ASSIGNED; config.max_segments],
            chunks: ChunkMap::new(config.max_chunk_units()),
        }
    }
}

/// Diagnostic view of one term's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub slot: u32,
    pub pocket: u32,
    /// Buffer header and term entry, for terms held in a buffer.
    pub buffer: Option<(BufferHeader, BufferTerm)>,
}

impl EntryInfo {
    pub fn is_empty(&self) -> bool {
        self.slot == 0
    }

    pub fn is_inline(&self) -> bool {
        self.slot & 1 == 1
    }
}

/// Segmented, buffered postings store.
///
/// Mutating calls take the lexicon explicitly: inline postings keep their
/// position in the term's pocket, and terms whose postings all vanish are
/// removed from it.
#[derive(Debug)]
pub struct PostingStore {
    config: PostingsConfig,
    storage: Arc<dyn Storage>,
    header: StoreHeader,
    segments: SegmentPool,
    arena: ChunkArena,
}

impl PostingStore {
    /// Create an empty store in `storage`.
    pub fn create(storage: Arc<dyn Storage>, config: PostingsConfig) -> Result<Self> {
        let segments = SegmentPool::new(storage.open_backing(SEGMENT_FILE)?, config.max_segments);
        let arena = ChunkArena::new(storage.open_backing(CHUNK_FILE)?)?;
        let store = PostingStore {
            header: StoreHeader::new(&config),
            config,
            storage,
            segments,
            arena,
        };
        store.save_header()?;
        info!(
            "created postings store ({} initial segments)",
            config.initial_n_segments
        );
        Ok(store)
    }

    /// Open a store previously created in `storage`.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let header: StoreHeader =
            structured::read_blob(storage.as_ref(), HEADER_FILE, BlobKind::PostingsHeader)?;
        if header.idstr != IDSTR {
            return Err(GlaiveError::invalid_format(format!(
                "postings header id {:?} is not {IDSTR:?}",
                header.idstr
            )));
        }
        let config = PostingsConfig::new(header.initial_n_segments);
        if header.ainfo.len() != config.max_segments || header.binfo.len() != config.max_segments
        {
            return Err(GlaiveError::invalid_format("postings segment tables truncated"));
        }
        let segments = SegmentPool::new(storage.open_backing(SEGMENT_FILE)?, config.max_segments);
        let arena = ChunkArena::new(storage.open_backing(CHUNK_FILE)?)?;
        Ok(PostingStore {
            config,
            storage,
            header,
            segments,
            arena,
        })
    }

    /// Persist the header and write mapped contents back.
    pub fn sync(&self) -> Result<()> {
        self.segments.flush()?;
        self.arena.flush()?;
        self.save_header()
    }

    fn save_header(&self) -> Result<()> {
        structured::write_blob(
            self.storage.as_ref(),
            HEADER_FILE,
            BlobKind::PostingsHeader,
            &self.header,
        )
    }

    pub fn config(&self) -> &PostingsConfig {
        &self.config
    }

    pub fn initial_n_segments(&self) -> usize {
        self.header.initial_n_segments
    }

    /// Largest section id ever stored.
    pub fn max_section(&self) -> u32 {
        self.header.smax
    }

    /// Sum of chunk sizes in KiB.
    pub fn total_chunk_size(&self) -> u64 {
        self.header.total_chunk_size
    }

    /// Bytes of segment storage in use.
    pub fn segment_bytes(&self) -> usize {
        let used = self
            .header
            .ainfo
            .iter()
            .chain(self.header.binfo.iter())
            .filter(|&&p| p != SEG_NOT_ASSIGNED)
            .count();
        used * SEGMENT_SIZE
    }

    /// Bytes of chunk storage allocated.
    pub fn chunk_bytes(&self) -> usize {
        self.header.chunks.units_in_use() * CHUNK_UNIT
    }

    /// Number of segments currently mapped.
    pub fn mapped_segments(&self) -> usize {
        self.segments.mapped_count()
    }

    // ---- array ----

    fn array_location(&self, tid: u32) -> Result<(usize, usize)> {
        let lseg = (tid >> W_OF_ARRAY) as usize;
        if tid == 0 || lseg >= self.config.max_segments {
            return Err(GlaiveError::invalid_argument(format!("term id {tid} out of range")));
        }
        Ok((lseg, (tid & ARRAY_MASK) as usize * 4))
    }

    /// Raw slot of `tid`; 0 when its array segment does not exist.
    fn slot_raw(&self, tid: u32) -> Result<u32> {
        let (lseg, offset) = self.array_location(tid)?;
        let pseg = self.header.ainfo[lseg];
        if pseg == SEG_NOT_ASSIGNED {
            return Ok(0);
        }
        let seg = self.segments.pin(pseg)?;
        Ok(LittleEndian::read_u32(&seg[offset..offset + 4]))
    }

    fn slot(&self, lexicon: &SymbolTable, tid: u32) -> Result<Slot> {
        let raw = self.slot_raw(tid)?;
        Ok(Slot::decode(raw, lexicon.pocket(tid).unwrap_or(0)))
    }

    fn set_slot(&mut self, tid: u32, raw: u32) -> Result<()> {
        let (lseg, offset) = self.array_location(tid)?;
        let pseg = self.array_segment(lseg)?;
        let seg = self.segments.segment_mut(pseg)?;
        LittleEndian::write_u32(&mut seg[offset..offset + 4], raw);
        Ok(())
    }

    /// Physical segment of array segment `lseg`, creating it if needed.
    fn array_segment(&mut self, lseg: usize) -> Result<u32> {
        let pseg = self.header.ainfo[lseg];
        if pseg != SEG_NOT_ASSIGNED {
            return Ok(pseg);
        }
        let pseg = self.free_physical_segment()?;
        self.segments.segment_mut(pseg)?.fill(0);
        self.header.ainfo[lseg] = pseg;
        self.header.amax = self.header.amax.max(lseg as u32);
        debug!("array segment {lseg} -> physical {pseg}");
        Ok(pseg)
    }

    fn free_physical_segment(&self) -> Result<u32> {
        let mut used = vec![false; self.config.max_segments];
        for &p in self.header.ainfo.iter().chain(self.header.binfo.iter()) {
            if let Some(u) = used.get_mut(p as usize) {
                *u = true;
            }
        }
        used.iter()
            .position(|&u| !u)
            .map(|p| p as u32)
            .ok_or_else(|| GlaiveError::memory_exhausted("no free segment"))
    }

    // ---- buffers ----

    /// Logical segment and term index an indirect slot points at.
    fn locate(&self, offset: u32) -> Result<(usize, u32, usize)> {
        let lseg = (offset >> W_OF_SEGMENT) as usize;
        let within = (offset as usize) & (SEGMENT_SIZE - 1);
        let pseg = self
            .header
            .binfo
            .get(lseg)
            .copied()
            .filter(|&p| p != SEG_NOT_ASSIGNED)
            .ok_or_else(|| {
                GlaiveError::invalid_format(format!("slot {offset:#x} names no buffer segment"))
            })?;
        let idx = term_index(within).ok_or_else(|| {
            GlaiveError::invalid_format(format!("slot {offset:#x} is not a term entry"))
        })?;
        Ok((lseg, pseg, idx))
    }

    fn is_capable(&self, lseg: usize, size: usize) -> Result<bool> {
        let seg = self.segments.pin(self.header.binfo[lseg])?;
        let header = BufferHeader::read(&seg);
        let live = header.live_terms();
        let roomy_chunk = live < MAX_TERMS_PER_BUFFER
            || self
                .header
                .total_chunk_size
                .checked_shr(((live >> 8) - 6) as u32)
                .unwrap_or(0)
                > header.chunk_size as u64;
        Ok(roomy_chunk && header.buffer_free as usize >= size + TERM_SIZE)
    }

    /// Pick the logical buffer segment for a new term with `size` bytes of
    /// records, creating one if nothing suitable exists.
    fn choose_buffer_segment(&mut self, size: usize, hint: u32) -> Result<usize> {
        if size + HEADER_SIZE + TERM_SIZE > SEGMENT_SIZE {
            return Err(GlaiveError::invalid_argument(format!(
                "posting of {size} bytes does not fit a buffer segment"
            )));
        }
        let max = self.config.max_segments;
        let nseg0 = self.header.initial_n_segments.min(max);
        let seg0 = hint as usize % nseg0;
        let segmax = ((self.header.total_chunk_size >> 7) as usize + nseg0).min(max);

        let strided = (seg0..segmax).step_by(nseg0);
        let round_robin = (1..nseg0).map(|i| (seg0 + i) % nseg0);
        let overflow = nseg0..max;
        for lseg in strided.chain(round_robin).chain(overflow) {
            if self.header.binfo[lseg] == SEG_NOT_ASSIGNED {
                self.new_buffer_segment(lseg)?;
                return Ok(lseg);
            }
            if self.is_capable(lseg, size)? {
                return Ok(lseg);
            }
        }
        Err(GlaiveError::memory_exhausted("no buffer segment available"))
    }

    fn new_buffer_segment(&mut self, lseg: usize) -> Result<u32> {
        let pseg = self.free_physical_segment()?;
        let seg = self.segments.segment_mut(pseg)?;
        seg.fill(0);
        BufferHeader::empty().write(seg);
        self.header.binfo[lseg] = pseg;
        self.header.bmax = self.header.bmax.max(lseg as u32);
        debug!("buffer segment {lseg} -> physical {pseg}");
        Ok(pseg)
    }

    /// Allocate a term entry for `tid` with `size` bytes of records.
    ///
    /// Returns the indirect slot value, the physical segment, the term index
    /// and the record position where the records start.
    fn buffer_new(&mut self, tid: u32, size: usize, hint: u32) -> Result<(u32, u32, usize, u16)> {
        let lseg = self.choose_buffer_segment(size, hint)?;
        let pseg = self.header.binfo[lseg];
        let seg = self.segments.segment_mut(pseg)?;
        let mut header = BufferHeader::read(seg);

        let reused = if header.nterms_void > 0 {
            let void = (0..header.nterms as usize).find(|&i| BufferTerm::read(seg, i).tid == 0);
            if void.is_none() {
                warn!("inconsistent void term count in buffer segment {lseg}");
                header.nterms_void = 0;
            }
            void
        } else {
            None
        };
        let idx = match reused {
            Some(idx) => {
                header.nterms_void -= 1;
                header.buffer_free -= size as u32;
                idx
            }
            None => {
                let idx = header.nterms as usize;
                header.nterms += 1;
                header.buffer_free -= (size + TERM_SIZE) as u32;
                idx
            }
        };
        header.write(seg);
        BufferTerm::new(tid).write(seg, idx);

        let slot = ((lseg as u32) << W_OF_SEGMENT) + term_offset(idx) as u32;
        let rec = (header.records_start() / 4) as u16;
        Ok((slot, pseg, idx, rec))
    }

    /// Make room for a `size` byte record in the buffer `slot` points at,
    /// flushing the segment if needed. Returns false if the flush moved the
    /// term elsewhere.
    fn make_room(
        &mut self,
        lexicon: &mut SymbolTable,
        pending: &PendingSpecs,
        tid: u32,
        slot: u32,
        size: usize,
    ) -> Result<bool> {
        let (lseg, pseg, _) = self.locate(slot)?;
        let free = BufferHeader::read(&self.segments.pin(pseg)?).buffer_free as usize;
        if free >= size {
            return Ok(true);
        }
        debug!("flushing buffer segment {lseg} ({free} bytes free, {size} needed)");
        self.flush(lexicon, pending, lseg)?;
        if self.slot_raw(tid)? != slot {
            return Ok(false);
        }
        let (_, pseg, _) = self.locate(slot)?;
        let free = BufferHeader::read(&self.segments.pin(pseg)?).buffer_free as usize;
        if free < size {
            error!("buffer segment {lseg} is full ({free} < {size}) after flush");
            return Err(GlaiveError::memory_exhausted("buffer is full"));
        }
        Ok(true)
    }

    /// Append a record to the buffer `slot` points at. Room must exist.
    fn put_record(&mut self, slot: u32, payload: &[u8], key: DocId) -> Result<()> {
        let (_, pseg, idx) = self.locate(slot)?;
        let seg = self.segments.segment_mut(pseg)?;
        let mut header = BufferHeader::read(seg);
        header.buffer_free -= record_size(payload) as u32;
        header.write(seg);
        let rec = (header.records_start() / 4) as u16;
        buffer::write_record(seg, rec, payload)?;
        buffer::put(seg, idx, rec, key)
    }

    // ---- write path ----

    /// Add the postings of `spec` to term `tid`.
    ///
    /// A spec with `tf == 0` or `sid == 0` deletes instead. `hint` steers
    /// which buffer segment a new term lands in.
    pub fn update(
        &mut self,
        lexicon: &mut SymbolTable,
        pending: &PendingSpecs,
        tid: u32,
        spec: &UpdateSpec,
        hint: u32,
    ) -> Result<()> {
        if spec.is_delete() {
            return self.delete(lexicon, pending, tid, spec);
        }
        if spec.tf != spec.atf {
            warn!(
                "too many postings of term {tid} in ({}:{}): {} kept of {}",
                spec.rid, spec.sid, spec.tf, spec.atf
            );
        }
        self.header.smax = self.header.smax.max(spec.sid);
        let payload = encode_payload(spec, false);
        let size = record_size(&payload);

        loop {
            // Creates the array segment on first use.
            self.array_segment(self.array_location(tid)?.0)?;
            match self.slot(lexicon, tid)? {
                Slot::Indirect(slot) => {
                    if !self.make_room(lexicon, pending, tid, slot, size)? {
                        continue;
                    }
                    return self.put_record(slot, &payload, spec.id());
                }
                Slot::Inline { rid, sid, pos } if DocId::new(rid, sid) != spec.id() => {
                    let mut old = UpdateSpec::new(rid, sid);
                    old.add(pos, 0);
                    let old_payload = encode_payload(&old, false);
                    let old_size = record_size(&old_payload);

                    let (slot, pseg, idx, rec) = self.buffer_new(tid, size + old_size, hint)?;
                    let seg = self.segments.segment_mut(pseg)?;
                    let rec_new = rec + (old_size / 4) as u16;
                    buffer::write_record(seg, rec, &old_payload)?;
                    buffer::put(seg, idx, rec, old.id())?;
                    buffer::write_record(seg, rec_new, &payload)?;
                    buffer::put(seg, idx, rec_new, spec.id())?;
                    self.set_slot(tid, slot)?;
                    lexicon.set_pocket(tid, 0)?;
                    return Ok(());
                }
                _ => {
                    let first = spec.positions.first().copied().unwrap_or(0);
                    if crate::postings::slot::inline_eligible(spec.id(), spec.tf, spec.score, first)
                    {
                        let slot = Slot::Inline {
                            rid: spec.rid,
                            sid: spec.sid,
                            pos: first,
                        };
                        self.set_slot(tid, slot.raw())?;
                        lexicon.set_pocket(tid, first)?;
                        return Ok(());
                    }
                    let (slot, pseg, idx, rec) = self.buffer_new(tid, size, hint)?;
                    let seg = self.segments.segment_mut(pseg)?;
                    buffer::write_record(seg, rec, &payload)?;
                    buffer::put(seg, idx, rec, spec.id())?;
                    self.set_slot(tid, slot)?;
                    lexicon.set_pocket(tid, 0)?;
                    return Ok(());
                }
            }
        }
    }

    /// Remove the posting of `tid` at `(spec.rid, spec.sid)`, or every
    /// section of `spec.rid` when `spec.sid == 0`.
    pub fn delete(
        &mut self,
        lexicon: &mut SymbolTable,
        pending: &PendingSpecs,
        tid: u32,
        spec: &UpdateSpec,
    ) -> Result<()> {
        let payload = encode_payload(spec, true);
        let size = record_size(&payload);
        loop {
            match self.slot(lexicon, tid)? {
                Slot::Empty => return Ok(()),
                Slot::Inline { rid, sid, .. } => {
                    if rid == spec.rid && (spec.sid == 0 || spec.sid == sid) {
                        self.set_slot(tid, 0)?;
                        release_term(lexicon, pending, tid);
                    }
                    return Ok(());
                }
                Slot::Indirect(slot) => {
                    if !self.make_room(lexicon, pending, tid, slot, size)? {
                        continue;
                    }
                    return self.put_record(slot, &payload, DocId::new(spec.rid, spec.sid));
                }
            }
        }
    }

    /// Merge every term of buffer segment `lseg` into a new chunk and rebuild
    /// the segment empty.
    ///
    /// Allocation failures leave the store untouched. A corrupt term list is
    /// cut at the first bad record; the flush still completes and then
    /// reports [`GlaiveError::InvalidFormat`].
    pub fn flush(
        &mut self,
        lexicon: &mut SymbolTable,
        pending: &PendingSpecs,
        lseg: usize,
    ) -> Result<()> {
        let pseg = self
            .header
            .binfo
            .get(lseg)
            .copied()
            .filter(|&p| p != SEG_NOT_ASSIGNED)
            .ok_or_else(|| GlaiveError::invalid_argument(format!("no buffer segment {lseg}")))?;
        let old = self.segments.pin(pseg)?;
        let header = BufferHeader::read(&old);
        header.check()?;

        let ds = self.free_physical_segment()?;
        let max_dest = header.chunk_size as usize + SEGMENT_SIZE;
        let dcn = self.header.chunks.allocate(max_dest)?;
        let dest_units = units_for(max_dest);
        if let Err(e) = self.arena.ensure_units(dcn as usize + dest_units) {
            self.header.chunks.free(dcn, max_dest);
            return Err(e);
        }

        let old_chunk: &[u8] = if header.chunk != CHUNK_NOT_ASSIGNED && header.chunk_size > 0 {
            match self
                .arena
                .bytes(header.chunk as usize * CHUNK_UNIT, header.chunk_size as usize)
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.header.chunks.free(dcn, max_dest);
                    return Err(e);
                }
            }
        } else {
            &[]
        };

        let table_end = term_offset(header.nterms as usize);
        let mut image = vec![0u8; SEGMENT_SIZE];
        image[..table_end].copy_from_slice(&old[..table_end]);

        let mut out: Vec<u8> = Vec::new();
        let mut new_slots: Vec<(u32, Slot)> = Vec::new();
        let mut nvoid: u16 = 0;
        let mut failure: Option<GlaiveError> = None;

        for idx in 0..header.nterms as usize {
            let mut term = BufferTerm::read(&old, idx);
            if term.tid == 0 {
                nvoid += 1;
                continue;
            }
            let start = term.pos_in_chunk as usize;
            let chunk_part = match old_chunk.get(start..start + term.size_in_chunk as usize) {
                Some(part) => part,
                None => {
                    error!("chunk range of term {} lies outside its chunk", term.tid);
                    failure.get_or_insert(GlaiveError::invalid_format("chunk range out of bounds"));
                    &[]
                }
            };

            let mut merge = PostingMerge::new(chunk_part, term.pos_in_buffer);
            let mut writer = ChunkWriter::new();
            let mut ndf = 0usize;
            let mut first: Option<Posting> = None;
            loop {
                match merge.next(&old) {
                    Ok(Some(posting)) => {
                        if let Err(e) = writer.push(&posting) {
                            failure.get_or_insert(e);
                            break;
                        }
                        ndf += 1;
                        if ndf == 1 {
                            first = Some(posting);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("flush of term {} in segment {lseg} cut short: {e}", term.tid);
                        failure.get_or_insert(e);
                        break;
                    }
                }
            }

            let inline = if ndf == 1 {
                first.as_ref().and_then(Slot::inline_for)
            } else {
                None
            };
            if ndf == 0 {
                new_slots.push((term.tid, Slot::Empty));
                BufferTerm::default().write(&mut image, idx);
                nvoid += 1;
            } else if let Some(slot) = inline {
                new_slots.push((term.tid, slot));
                BufferTerm::default().write(&mut image, idx);
                nvoid += 1;
            } else {
                term.pos_in_chunk = out.len() as u32;
                term.size_in_chunk = writer.len() as u32;
                term.pos_in_buffer = 0;
                term.size_in_buffer = 0;
                term.write(&mut image, idx);
                out.extend_from_slice(&writer.into_bytes());
            }
        }
        drop(old);

        let chunk_size = out.len();
        if chunk_size > max_dest {
            self.header.chunks.free(dcn, max_dest);
            return Err(GlaiveError::internal(format!(
                "flushed chunk of {chunk_size} bytes exceeds {max_dest}"
            )));
        }

        let new_header = BufferHeader {
            chunk: if chunk_size > 0 { dcn } else { CHUNK_NOT_ASSIGNED },
            chunk_size: chunk_size as u32,
            buffer_free: (SEGMENT_SIZE - table_end) as u32,
            nterms: header.nterms,
            nterms_void: nvoid,
        };
        new_header.write(&mut image);
        let written = self
            .segments
            .segment_mut(ds)
            .map(|seg| seg.copy_from_slice(&image))
            .and_then(|()| self.arena.write(dcn as usize * CHUNK_UNIT, &out));
        if let Err(e) = written {
            self.header.chunks.free(dcn, max_dest);
            self.segments.release(ds);
            return Err(e);
        }

        // Commit.
        let used_units = units_for(chunk_size);
        if dest_units > used_units {
            self.header.chunks.free(
                dcn + used_units as u32,
                (dest_units - used_units) * CHUNK_UNIT,
            );
        }
        self.header.binfo[lseg] = ds;
        self.segments.release(pseg);

        if header.chunk != CHUNK_NOT_ASSIGNED {
            self.header.chunks.free(header.chunk, header.chunk_size as usize);
            self.header.total_chunk_size = self
                .header
                .total_chunk_size
                .saturating_sub((header.chunk_size >> 10) as u64);
        }
        self.header.total_chunk_size += (chunk_size >> 10) as u64;

        for (tid, slot) in new_slots {
            self.set_slot(tid, slot.raw())?;
            match slot {
                Slot::Inline { pos, .. } => lexicon.set_pocket(tid, pos)?,
                _ => release_term(lexicon, pending, tid),
            }
        }
        debug!(
            "flushed buffer segment {lseg}: physical {pseg} -> {ds}, chunk {} -> {} bytes, {nvoid} void terms",
            header.chunk_size, chunk_size
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush every buffer segment.
    pub fn flush_all(&mut self, lexicon: &mut SymbolTable, pending: &PendingSpecs) -> Result<()> {
        for lseg in 0..=self.header.bmax as usize {
            if self.header.binfo[lseg] != SEG_NOT_ASSIGNED {
                self.flush(lexicon, pending, lseg)?;
            }
        }
        Ok(())
    }

    // ---- read path ----

    /// Open a cursor over `tid`. `None` when the term has no postings.
    pub fn cursor(&self, lexicon: &SymbolTable, tid: u32) -> Result<Option<PostingCursor<'_>>> {
        match self.slot(lexicon, tid)? {
            Slot::Empty => Ok(None),
            slot @ Slot::Inline { .. } => Ok(slot
                .inline_posting()
                .map(|posting| PostingCursor::sole(tid, posting))),
            Slot::Indirect(offset) => {
                let (_, pseg, idx) = self.locate(offset)?;
                let seg = self.segments.pin(pseg)?;
                let header = BufferHeader::read(&seg);
                let term = BufferTerm::read(&seg, idx);
                if term.tid != tid {
                    return Err(GlaiveError::internal(format!(
                        "slot of term {tid} points at entry of term {}",
                        term.tid
                    )));
                }
                let chunk = if term.size_in_chunk > 0 && header.chunk != CHUNK_NOT_ASSIGNED {
                    self.arena.bytes(
                        header.chunk as usize * CHUNK_UNIT + term.pos_in_chunk as usize,
                        term.size_in_chunk as usize,
                    )?
                } else {
                    &[]
                };
                Ok(Some(PostingCursor::merged(tid, seg, chunk, term.pos_in_buffer)))
            }
        }
    }

    /// Every posting of `tid`, in key order.
    pub fn postings(&self, lexicon: &SymbolTable, tid: u32) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        if let Some(mut cursor) = self.cursor(lexicon, tid)? {
            while cursor.next()? {
                if let Some(posting) = cursor.posting() {
                    out.push(posting.clone());
                }
            }
        }
        Ok(out)
    }

    /// Cheap proxy for the number of postings of `tid`.
    pub fn estimate_size(&self, tid: u32) -> Result<u32> {
        match Slot::decode(self.slot_raw(tid)?, 0) {
            Slot::Empty => Ok(0),
            Slot::Inline { .. } => Ok(1),
            Slot::Indirect(offset) => {
                let (_, pseg, idx) = self.locate(offset)?;
                let term = BufferTerm::read(&self.segments.pin(pseg)?, idx);
                Ok((term.size_in_chunk >> 2) + term.size_in_buffer as u32 + 2)
            }
        }
    }

    /// Diagnostic view of `tid`'s slot.
    pub fn entry_info(&self, lexicon: &SymbolTable, tid: u32) -> Result<EntryInfo> {
        let slot = self.slot_raw(tid)?;
        let pocket = lexicon.pocket(tid).unwrap_or(0);
        let buffer = match Slot::decode(slot, pocket) {
            Slot::Indirect(offset) => {
                let (_, pseg, idx) = self.locate(offset)?;
                let seg = self.segments.pin(pseg)?;
                Some((BufferHeader::read(&seg), BufferTerm::read(&seg, idx)))
            }
            _ => None,
        };
        Ok(EntryInfo {
            slot,
            pocket,
            buffer,
        })
    }

    /// Unmap unpinned segments once more than the configured threshold are
    /// mapped. Buffer segments go first, highest logical number first.
    pub fn expire(&self) -> usize {
        let threshold = self.config.expire_threshold();
        let before = self.segments.mapped_count();
        if before <= threshold {
            return 0;
        }
        let buffers = (0..=self.header.bmax as usize).rev().map(|l| self.header.binfo[l]);
        let arrays = (0..=self.header.amax as usize).rev().map(|l| self.header.ainfo[l]);
        let order: Vec<u32> = buffers
            .chain(arrays)
            .filter(|&p| p != SEG_NOT_ASSIGNED)
            .collect();
        let evicted = self.segments.expire(&order, 0);
        info!("expired {evicted} of {before} mapped segments");
        evicted
    }
}

/// Drop `tid` from the lexicon unless the update in flight is about to give
/// it postings again.
fn release_term(lexicon: &mut SymbolTable, pending: &PendingSpecs, tid: u32) {
    let deletable = pending.get(&tid).is_none_or(UpdateSpec::is_delete);
    if deletable {
        lexicon.delete(tid);
    }
}
