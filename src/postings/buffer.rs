//! Buffer segment layout.
//!
//! ```text
//! +--------+--------+--------+-----+ - - free - - +-------------------+
//! | header | term 0 | term 1 | ... |              | <- records        |
//! +--------+--------+--------+-----+ - - - - - - -+-------------------+
//! ```
//!
//! - header (16 bytes): `chunk u32, chunk_size u32, buffer_free u32,
//!   nterms u16, nterms_void u16`
//! - term (16 bytes): `tid u32, size_in_chunk u32, pos_in_chunk u32,
//!   size_in_buffer u16, pos_in_buffer u16`
//! - record: `step u16, jump u16` followed by the varint payload
//!   `rid, sid, tf*2 [+1, score], position gaps`, zero padded to 4 bytes
//!
//! The term table grows up from the header and records grow down from the
//! end of the segment. A record position counts 4-byte units from the start
//! of the segment, so position 0 never names a record. Each term's records
//! form a list sorted by `(rid, sid)` through `step`; `jump` is a skip hint
//! to some later record, or [`DELETED`] for a record superseded in place.

use byteorder::{ByteOrder, LittleEndian};
use log::error;

use crate::error::{GlaiveError, Result};
use crate::postings::update_spec::UpdateSpec;
use crate::postings::{DocId, Posting, encode_tail};
use crate::storage::chunk::CHUNK_NOT_ASSIGNED;
use crate::storage::segment::SEGMENT_SIZE;
use crate::util::varint;

pub const HEADER_SIZE: usize = 16;
pub const TERM_SIZE: usize = 16;
pub const REC_HEADER_SIZE: usize = 4;

/// `jump` value of a record that was superseded.
pub const DELETED: u16 = 1;

/// Fixed header of a buffer segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHeader {
    /// First chunk unit of the segment's chunk.
    pub chunk: u32,
    /// Bytes of chunk data.
    pub chunk_size: u32,
    /// Bytes left between the term table and the records.
    pub buffer_free: u32,
    pub nterms: u16,
    /// Term entries with `tid == 0`, available for reuse.
    pub nterms_void: u16,
}

impl BufferHeader {
    /// Header of a freshly created segment.
    pub fn empty() -> Self {
        BufferHeader {
            chunk: CHUNK_NOT_ASSIGNED,
            chunk_size: 0,
            buffer_free: (SEGMENT_SIZE - HEADER_SIZE) as u32,
            nterms: 0,
            nterms_void: 0,
        }
    }

    pub fn read(seg: &[u8]) -> Self {
        BufferHeader {
            chunk: LittleEndian::read_u32(&seg[0..4]),
            chunk_size: LittleEndian::read_u32(&seg[4..8]),
            buffer_free: LittleEndian::read_u32(&seg[8..12]),
            nterms: LittleEndian::read_u16(&seg[12..14]),
            nterms_void: LittleEndian::read_u16(&seg[14..16]),
        }
    }

    pub fn write(&self, seg: &mut [u8]) {
        LittleEndian::write_u32(&mut seg[0..4], self.chunk);
        LittleEndian::write_u32(&mut seg[4..8], self.chunk_size);
        LittleEndian::write_u32(&mut seg[8..12], self.buffer_free);
        LittleEndian::write_u16(&mut seg[12..14], self.nterms);
        LittleEndian::write_u16(&mut seg[14..16], self.nterms_void);
    }

    pub fn live_terms(&self) -> u16 {
        self.nterms.saturating_sub(self.nterms_void)
    }

    /// Byte offset of the most recently allocated record.
    pub fn records_start(&self) -> usize {
        term_offset(self.nterms as usize) + self.buffer_free as usize
    }

    /// Whether the header describes a usable segment.
    pub fn check(&self) -> Result<()> {
        if self.records_start() > SEGMENT_SIZE {
            return Err(GlaiveError::invalid_format(format!(
                "buffer header out of range: {} terms, {} bytes free",
                self.nterms, self.buffer_free
            )));
        }
        Ok(())
    }
}

/// Per-term entry of a buffer segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferTerm {
    pub tid: u32,
    pub size_in_chunk: u32,
    pub pos_in_chunk: u32,
    pub size_in_buffer: u16,
    pub pos_in_buffer: u16,
}

impl BufferTerm {
    pub fn new(tid: u32) -> Self {
        BufferTerm {
            tid,
            ..Default::default()
        }
    }

    pub fn read(seg: &[u8], idx: usize) -> Self {
        let b = &seg[term_offset(idx)..term_offset(idx) + TERM_SIZE];
        BufferTerm {
            tid: LittleEndian::read_u32(&b[0..4]),
            size_in_chunk: LittleEndian::read_u32(&b[4..8]),
            pos_in_chunk: LittleEndian::read_u32(&b[8..12]),
            size_in_buffer: LittleEndian::read_u16(&b[12..14]),
            pos_in_buffer: LittleEndian::read_u16(&b[14..16]),
        }
    }

    pub fn write(&self, seg: &mut [u8], idx: usize) {
        let b = &mut seg[term_offset(idx)..term_offset(idx) + TERM_SIZE];
        LittleEndian::write_u32(&mut b[0..4], self.tid);
        LittleEndian::write_u32(&mut b[4..8], self.size_in_chunk);
        LittleEndian::write_u32(&mut b[8..12], self.pos_in_chunk);
        LittleEndian::write_u16(&mut b[12..14], self.size_in_buffer);
        LittleEndian::write_u16(&mut b[14..16], self.pos_in_buffer);
    }
}

/// Byte offset of term entry `idx`.
pub fn term_offset(idx: usize) -> usize {
    HEADER_SIZE + TERM_SIZE * idx
}

/// Term index of the entry at byte offset `offset`, if it is one.
pub fn term_index(offset: usize) -> Option<usize> {
    let rel = offset.checked_sub(HEADER_SIZE)?;
    (rel % TERM_SIZE == 0 && offset + TERM_SIZE <= SEGMENT_SIZE).then_some(rel / TERM_SIZE)
}

/// Encode the record payload for `spec`. A delete drops tf, score and
/// positions. The result is padded to a multiple of 4 bytes.
pub fn encode_payload(spec: &UpdateSpec, delete: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity((spec.tf as usize + 4) * varint::MAX_U32_LEN);
    varint::push_u32(&mut out, spec.rid);
    varint::push_u32(&mut out, spec.sid);
    if delete {
        encode_tail(&mut out, 0, 0, &[]);
    } else {
        encode_tail(&mut out, spec.tf, spec.score, &spec.positions);
    }
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

/// Bytes a record with `payload` occupies.
pub fn record_size(payload: &[u8]) -> usize {
    payload.len() + REC_HEADER_SIZE
}

fn rec_offset(pos: u16) -> Result<usize> {
    let offset = pos as usize * 4;
    if pos == 0 || offset + REC_HEADER_SIZE > SEGMENT_SIZE {
        return Err(GlaiveError::invalid_format(format!(
            "buffer record position {pos} out of range"
        )));
    }
    Ok(offset)
}

pub fn step(seg: &[u8], pos: u16) -> Result<u16> {
    let off = rec_offset(pos)?;
    Ok(LittleEndian::read_u16(&seg[off..off + 2]))
}

pub fn jump(seg: &[u8], pos: u16) -> Result<u16> {
    let off = rec_offset(pos)?;
    Ok(LittleEndian::read_u16(&seg[off + 2..off + 4]))
}

fn set_step(seg: &mut [u8], pos: u16, value: u16) -> Result<()> {
    let off = rec_offset(pos)?;
    LittleEndian::write_u16(&mut seg[off..off + 2], value);
    Ok(())
}

fn set_jump(seg: &mut [u8], pos: u16, value: u16) -> Result<()> {
    let off = rec_offset(pos)?;
    LittleEndian::write_u16(&mut seg[off + 2..off + 4], value);
    Ok(())
}

/// Key of the record at `pos`.
pub fn record_key(seg: &[u8], pos: u16) -> Result<DocId> {
    let mut at = rec_offset(pos)? + REC_HEADER_SIZE;
    let rid = varint::read_u32_at(seg, &mut at)?;
    let sid = varint::read_u32_at(seg, &mut at)?;
    Ok(DocId::new(rid, sid))
}

/// Decode the record at `pos` into `posting`.
pub fn read_record(seg: &[u8], pos: u16, posting: &mut Posting) -> Result<()> {
    let mut at = rec_offset(pos)? + REC_HEADER_SIZE;
    posting.rid = varint::read_u32_at(seg, &mut at)?;
    posting.sid = varint::read_u32_at(seg, &mut at)?;
    crate::postings::decode_tail(seg, &mut at, posting)
}

/// Store `payload` at record position `pos` with cleared links.
pub fn write_record(seg: &mut [u8], pos: u16, payload: &[u8]) -> Result<()> {
    let off = rec_offset(pos)?;
    let end = off + REC_HEADER_SIZE + payload.len();
    let target = seg.get_mut(off..end).ok_or_else(|| {
        GlaiveError::internal(format!("record of {} bytes at {pos} overruns segment", payload.len()))
    })?;
    target[..REC_HEADER_SIZE].fill(0);
    target[REC_HEADER_SIZE..].copy_from_slice(payload);
    Ok(())
}

/// Link the record already written at `new_pos` with key `key` into the list
/// of term `idx`.
///
/// An existing record with the same key is marked deleted and unlinked; a
/// key with `sid == 0` supersedes every record of its `rid`. A list found
/// out of order is abandoned: the new record becomes its only element and
/// the call reports [`GlaiveError::InvalidFormat`] after linking it.
///
/// Jumps are rebuilt on the way: appends re-point a record picked by the
/// population count of the new list size, and long walks re-point the
/// record where the walk should have landed.
pub fn put(seg: &mut [u8], idx: usize, new_pos: u16, key: DocId) -> Result<()> {
    let mut term = BufferTerm::read(seg, idx);
    let mut prev: Option<u16> = None;
    let mut last: Option<DocId> = None;
    let mut hops = Hops::new();
    let mut corrupt = false;

    loop {
        let curr = match prev {
            None => term.pos_in_buffer,
            Some(p) => step(seg, p)?,
        };

        if curr == 0 {
            set_step(seg, new_pos, 0)?;
            set_jump(seg, new_pos, 0)?;
            link(seg, &mut term, prev, new_pos)?;
            let head = term.pos_in_buffer;
            if term.size_in_buffer > 1 && head != new_pos {
                set_jump(seg, head, new_pos)?;
                let size = term.size_in_buffer.saturating_add(1);
                if let (0, Some(tail)) = (size & 1, prev) {
                    rebuild_on_append(seg, head, new_pos, tail, size)?;
                }
            }
            break;
        }

        let curr_key = record_key(seg, curr)?;
        if last.is_some_and(|l| curr_key <= l) {
            error!(
                "buffer list of term {} out of order at ({}:{}); abandoning it",
                term.tid, curr_key.rid, curr_key.sid
            );
            term.pos_in_buffer = 0;
            term.size_in_buffer = 0;
            prev = None;
            last = None;
            hops = Hops::new();
            corrupt = true;
            continue;
        }
        last = Some(curr_key);

        if key <= curr_key {
            let curr_jump = jump(seg, curr)?;
            let mut next = curr;
            if key.rid == curr_key.rid {
                if key.sid == 0 {
                    let mut r = curr;
                    loop {
                        set_jump(seg, r, DELETED)?;
                        next = step(seg, r)?;
                        if next == 0 || record_key(seg, next)?.rid != key.rid {
                            break;
                        }
                        r = next;
                    }
                } else if key.sid == curr_key.sid {
                    set_jump(seg, curr, DELETED)?;
                    next = step(seg, curr)?;
                }
            }
            let inherited = if jump_is_valid(seg, curr_jump, key)? {
                curr_jump
            } else {
                0
            };
            set_step(seg, new_pos, next)?;
            set_jump(seg, new_pos, inherited)?;
            link(seg, &mut term, prev, new_pos)?;
            break;
        }

        if let Some(start) = hops.visit(curr, curr_key, key) {
            set_jump_r(seg, start, curr)?;
        }

        prev = Some(curr);
        let j = jump(seg, curr)?;
        if j > DELETED && j != curr && jump(seg, j)? != DELETED {
            let jump_key = record_key(seg, j)?;
            if curr_key < jump_key && jump_key < key {
                prev = Some(j);
                last = Some(jump_key);
            } else if jump_key >= key {
                hops.reset = true;
            }
        }
    }

    term.size_in_buffer = term.size_in_buffer.saturating_add(1);
    term.write(seg, idx);
    if corrupt {
        return Err(GlaiveError::invalid_format(format!(
            "buffer list of term {} was out of order",
            term.tid
        )));
    }
    Ok(())
}

/// Most records a single jump rebuild rewrites.
const MAX_JUMP_REBUILD: usize = 100;

/// Walk state deciding when an insert walk has hopped too often.
///
/// `delta0` is the key distance from the walk's start to the new key; the
/// expected landing point `start` moves forward as halving fractions of it
/// are passed, and once the walk has made more hops than halvings the
/// landing point is re-pointed at the current record.
#[derive(Debug)]
struct Hops {
    reset: bool,
    start: u16,
    start_key: DocId,
    delta0: i64,
    vdelta: i64,
    vhops: u32,
    nhops: u32,
}

impl Hops {
    fn new() -> Self {
        Hops {
            reset: true,
            start: 0,
            start_key: DocId::new(0, 0),
            delta0: 0,
            vdelta: 0,
            vhops: 0,
            nhops: 0,
        }
    }

    /// Account for stepping over `pos` on the way to `target`. Returns the
    /// record whose jump should now point at `pos`.
    fn visit(&mut self, pos: u16, pos_key: DocId, target: DocId) -> Option<u16> {
        if self.reset {
            self.reset = false;
            self.start = pos;
            self.start_key = pos_key;
            self.delta0 = key_distance(pos_key, target);
            self.vdelta = self.delta0 >> 1;
            self.vhops = 1;
            self.nhops = 0;
            return None;
        }
        if self.vdelta < key_distance(self.start_key, pos_key) {
            self.vhops += 1;
            self.vdelta += self.delta0.checked_shr(self.vhops).unwrap_or(0);
            self.start = pos;
        }
        if self.nhops > self.vhops {
            Some(self.start)
        } else {
            self.nhops += 1;
            None
        }
    }
}

/// Distance between two keys: in rids, or in sids within one rid.
fn key_distance(from: DocId, to: DocId) -> i64 {
    if from.rid == to.rid {
        i64::from(to.sid) - i64::from(from.sid)
    } else {
        i64::from(to.rid) - i64::from(from.rid)
    }
}

/// After appending `new_pos` behind `tail`, follow `popcount(size)` jumps
/// from the record after `head` and re-point the record reached at `tail`.
fn rebuild_on_append(seg: &mut [u8], head: u16, new_pos: u16, tail: u16, size: u16) -> Result<()> {
    let mut r = step(seg, head)?;
    if r == 0 {
        return Ok(());
    }
    for _ in 0..size.count_ones() {
        let j = jump(seg, r)?;
        if j <= DELETED || jump(seg, j)? == DELETED {
            break;
        }
        r = j;
    }
    if r != new_pos {
        set_jump_r(seg, r, tail)?;
    }
    Ok(())
}

/// Point the jump of `from` at `to` and hand each displaced jump on to the
/// following record, stopping at the first link that would not move
/// forward.
fn set_jump_r(seg: &mut [u8], from: u16, to: u16) -> Result<()> {
    let (mut r, mut j) = (from, to);
    for _ in 0..MAX_JUMP_REBUILD {
        if j <= DELETED || r == j || jump(seg, j)? == DELETED {
            break;
        }
        let displaced = jump(seg, r)?;
        let next = step(seg, r)?;
        if j == displaced || j == next || !forward_jump(seg, r, j)? {
            break;
        }
        set_jump(seg, r, j)?;
        if next == 0 {
            break;
        }
        r = next;
        j = displaced;
    }
    Ok(())
}

/// Whether a jump from `from` to `target` moves forward without a cycle.
fn forward_jump(seg: &[u8], from: u16, target: u16) -> Result<bool> {
    if step(seg, target)? == from {
        error!("buffer jump cycle between records {from} and {target}");
        return Ok(false);
    }
    Ok(record_key(seg, target)? > record_key(seg, from)?)
}

fn link(seg: &mut [u8], term: &mut BufferTerm, prev: Option<u16>, pos: u16) -> Result<()> {
    match prev {
        None => term.pos_in_buffer = pos,
        Some(p) => set_step(seg, p, pos)?,
    }
    Ok(())
}

/// A jump is kept only if it leads to a live record past `from`.
fn jump_is_valid(seg: &[u8], target: u16, from: DocId) -> Result<bool> {
    if target <= DELETED || jump(seg, target)? == DELETED {
        return Ok(false);
    }
    Ok(record_key(seg, target)? > from)
}

/// Forward reader over one term's record list.
#[derive(Debug, Clone)]
pub struct BufferReader {
    next: u16,
    last: Option<DocId>,
}

impl BufferReader {
    pub fn new(head: u16) -> Self {
        BufferReader {
            next: head,
            last: None,
        }
    }

    /// Decode the next record, failing if keys stop increasing.
    pub fn next(&mut self, seg: &[u8]) -> Result<Option<Posting>> {
        if self.next == 0 {
            return Ok(None);
        }
        let mut posting = Posting::default();
        read_record(seg, self.next, &mut posting)?;
        let id = posting.id();
        if let Some(last) = self.last.filter(|&l| id <= l) {
            self.next = 0;
            return Err(GlaiveError::invalid_format(format!(
                "buffer records out of order: ({}:{}) -> ({}:{})",
                last.rid, last.sid, id.rid, id.sid
            )));
        }
        self.last = Some(id);
        self.next = step(seg, self.next)?;
        Ok(Some(posting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Vec<u8> {
        let mut seg = vec![0u8; SEGMENT_SIZE];
        let mut header = BufferHeader::empty();
        header.nterms = 1;
        header.buffer_free -= TERM_SIZE as u32;
        header.write(&mut seg);
        BufferTerm::new(42).write(&mut seg, 0);
        seg
    }

    /// Allocate and link a record the way the store does.
    fn insert(seg: &mut [u8], rid: u32, sid: u32, pos: &[u32]) -> Result<()> {
        let mut spec = UpdateSpec::new(rid, sid);
        for &p in pos {
            spec.add(p, 0);
        }
        let payload = encode_payload(&spec, spec.is_delete());
        let mut header = BufferHeader::read(seg);
        header.buffer_free -= record_size(&payload) as u32;
        header.write(seg);
        let rec = (header.records_start() / 4) as u16;
        write_record(seg, rec, &payload)?;
        put(seg, 0, rec, spec.id())
    }

    fn keys(seg: &[u8]) -> Vec<(u32, u32, u32)> {
        let mut reader = BufferReader::new(BufferTerm::read(seg, 0).pos_in_buffer);
        let mut out = Vec::new();
        while let Some(p) = reader.next(seg).unwrap() {
            out.push((p.rid, p.sid, p.tf));
        }
        out
    }

    #[test]
    fn test_header_roundtrip() {
        let mut seg = vec![0u8; 64];
        let header = BufferHeader {
            chunk: 3,
            chunk_size: 1000,
            buffer_free: 77,
            nterms: 5,
            nterms_void: 2,
        };
        header.write(&mut seg);
        assert_eq!(BufferHeader::read(&seg), header);
        assert_eq!(header.live_terms(), 3);
    }

    #[test]
    fn test_term_index() {
        assert_eq!(term_index(term_offset(3)), Some(3));
        assert_eq!(term_index(HEADER_SIZE + 4), None);
        assert_eq!(term_index(0), None);
    }

    #[test]
    fn test_payload_is_padded() {
        let mut spec = UpdateSpec::new(1, 1);
        spec.add(3, 0);
        let payload = encode_payload(&spec, false);
        assert_eq!(payload.len() % 4, 0);
        assert_eq!(&payload[..4], &[1, 1, 2, 3]);
        assert_eq!(encode_payload(&spec, true), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_put_keeps_order() {
        let mut seg = segment();
        insert(&mut seg, 5, 1, &[0]).unwrap();
        insert(&mut seg, 1, 1, &[0]).unwrap();
        insert(&mut seg, 9, 1, &[0]).unwrap();
        insert(&mut seg, 7, 2, &[0]).unwrap();
        insert(&mut seg, 7, 1, &[0]).unwrap();
        assert_eq!(
            keys(&seg),
            vec![(1, 1, 1), (5, 1, 1), (7, 1, 1), (7, 2, 1), (9, 1, 1)]
        );
        assert_eq!(BufferTerm::read(&seg, 0).size_in_buffer, 5);
    }

    #[test]
    fn test_put_replaces_same_key() {
        let mut seg = segment();
        insert(&mut seg, 1, 1, &[0]).unwrap();
        insert(&mut seg, 2, 1, &[0]).unwrap();
        insert(&mut seg, 1, 1, &[4, 8]).unwrap();
        assert_eq!(keys(&seg), vec![(1, 1, 2), (2, 1, 1)]);
    }

    #[test]
    fn test_put_whole_document_delete() {
        let mut seg = segment();
        insert(&mut seg, 3, 1, &[0]).unwrap();
        insert(&mut seg, 3, 2, &[0]).unwrap();
        insert(&mut seg, 4, 1, &[0]).unwrap();
        insert(&mut seg, 3, 0, &[]).unwrap();
        assert_eq!(keys(&seg), vec![(3, 0, 0), (4, 1, 1)]);
    }

    #[test]
    fn test_appends_use_head_jump() {
        let mut seg = segment();
        for rid in 1..=50 {
            insert(&mut seg, rid, 1, &[rid]).unwrap();
        }
        let head = BufferTerm::read(&seg, 0).pos_in_buffer;
        let tail = jump(&seg, head).unwrap();
        assert_eq!(record_key(&seg, tail).unwrap(), DocId::new(50, 1));
        assert_eq!(keys(&seg).len(), 50);
    }

    /// `(key, jump target key)` of every listed record that has a jump.
    fn jumps(seg: &[u8]) -> Vec<(DocId, DocId)> {
        let mut out = Vec::new();
        let mut pos = BufferTerm::read(seg, 0).pos_in_buffer;
        while pos != 0 {
            let j = jump(seg, pos).unwrap();
            if j > DELETED {
                out.push((record_key(seg, pos).unwrap(), record_key(seg, j).unwrap()));
            }
            pos = step(seg, pos).unwrap();
        }
        out
    }

    #[test]
    fn test_interior_inserts_rebuild_jumps() {
        let mut seg = segment();
        for rid in (1..=399).step_by(2) {
            insert(&mut seg, rid, 1, &[0]).unwrap();
        }
        for rid in (2..=400).step_by(2) {
            insert(&mut seg, rid, 1, &[0]).unwrap();
        }

        let listed: Vec<u32> = keys(&seg).iter().map(|&(rid, _, _)| rid).collect();
        assert_eq!(listed, (1..=400).collect::<Vec<_>>());

        let head = record_key(&seg, BufferTerm::read(&seg, 0).pos_in_buffer).unwrap();
        let jumps = jumps(&seg);
        let interior = jumps.iter().filter(|(from, _)| *from != head).count();
        assert!(interior > 10, "only {interior} interior jumps");
        for (from, to) in &jumps {
            assert!(from < to, "jump ({from:?}) -> ({to:?}) goes backwards");
            assert!(listed.contains(&to.rid));
        }
    }

    #[test]
    fn test_hops_repoint_after_long_walk() {
        let mut hops = Hops::new();
        let target = DocId::new(100, 1);
        assert_eq!(hops.visit(1, DocId::new(1, 1), target), None);
        let mut repointed = None;
        for (i, rid) in (2..40).enumerate() {
            if let Some(start) = hops.visit(i as u16 + 2, DocId::new(rid, 1), target) {
                repointed = Some(start);
                break;
            }
        }
        assert!(repointed.is_some());
        assert_eq!(key_distance(DocId::new(3, 2), DocId::new(3, 7)), 5);
        assert_eq!(key_distance(DocId::new(3, 2), DocId::new(9, 1)), 6);
    }

    #[test]
    fn test_corrupt_list_is_abandoned() {
        let mut seg = segment();
        insert(&mut seg, 1, 1, &[0]).unwrap();
        insert(&mut seg, 2, 1, &[0]).unwrap();
        // Point the second record back at the first.
        let head = BufferTerm::read(&seg, 0).pos_in_buffer;
        let second = step(&seg, head).unwrap();
        set_step(&mut seg, second, head).unwrap();
        set_jump(&mut seg, head, 0).unwrap();

        let err = insert(&mut seg, 3, 1, &[0]).unwrap_err();
        assert!(matches!(err, GlaiveError::InvalidFormat(_)));
        assert_eq!(keys(&seg), vec![(3, 1, 1)]);
    }
}
