//! Chunk encoding of a term's postings.
//!
//! A term's chunk data is a plain sequence of postings, each delta encoded
//! against the one before it:
//!
//! ```text
//! rid_gap  sid (absolute if rid_gap > 0, else gap)  tf*2[+1]  [score]  position gaps
//! ```
//!
//! Keys must strictly increase; a reader reports anything else as
//! [`GlaiveError::InvalidFormat`].

use crate::error::{GlaiveError, Result};
use crate::postings::{DocId, Posting, decode_tail, encode_tail};
use crate::util::varint;

/// Appends postings in key order.
#[derive(Debug, Default)]
pub struct ChunkWriter {
    out: Vec<u8>,
    last: DocId,
}

impl ChunkWriter {
    pub fn new() -> Self {
        ChunkWriter::default()
    }

    pub fn push(&mut self, posting: &Posting) -> Result<()> {
        let id = posting.id();
        if id <= self.last {
            return Err(GlaiveError::internal(format!(
                "chunk keys must increase: ({}:{}) after ({}:{})",
                id.rid, id.sid, self.last.rid, self.last.sid
            )));
        }
        let rid_gap = id.rid - self.last.rid;
        varint::push_u32(&mut self.out, rid_gap);
        if rid_gap == 0 {
            varint::push_u32(&mut self.out, id.sid - self.last.sid);
        } else {
            varint::push_u32(&mut self.out, id.sid);
        }
        encode_tail(&mut self.out, posting.tf, posting.score, &posting.positions);
        self.last = id;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// Forward reader over one term's chunk data.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    at: usize,
    last: DocId,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ChunkReader {
            data,
            at: 0,
            last: DocId::default(),
        }
    }

    pub fn next(&mut self) -> Result<Option<Posting>> {
        if self.at >= self.data.len() {
            return Ok(None);
        }
        let rid_gap = varint::read_u32_at(self.data, &mut self.at)?;
        let sid = varint::read_u32_at(self.data, &mut self.at)?;
        let id = if rid_gap == 0 {
            if sid == 0 {
                self.at = self.data.len();
                return Err(GlaiveError::invalid_format(format!(
                    "repeated chunk key ({}:{})",
                    self.last.rid, self.last.sid
                )));
            }
            self.last.sid.checked_add(sid).map(|s| DocId::new(self.last.rid, s))
        } else {
            self.last.rid.checked_add(rid_gap).map(|r| DocId::new(r, sid))
        }
        .ok_or_else(|| GlaiveError::invalid_format("chunk key overflow"))?;
        let mut posting = Posting {
            rid: id.rid,
            sid: id.sid,
            ..Default::default()
        };
        decode_tail(self.data, &mut self.at, &mut posting)?;
        self.last = id;
        Ok(Some(posting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(rid: u32, sid: u32, positions: &[u32]) -> Posting {
        Posting {
            rid,
            sid,
            tf: positions.len() as u32,
            score: 0,
            positions: positions.to_vec(),
        }
    }

    #[test]
    fn test_chunk_sequence() {
        let input = vec![
            posting(1, 1, &[0, 4]),
            posting(1, 3, &[2]),
            posting(200, 1, &[1, 2, 3]),
        ];
        let mut writer = ChunkWriter::new();
        for p in &input {
            writer.push(p).unwrap();
        }
        let bytes = writer.into_bytes();
        let mut reader = ChunkReader::new(&bytes);
        let mut output = Vec::new();
        while let Some(p) = reader.next().unwrap() {
            output.push(p);
        }
        assert_eq!(output, input);
    }

    #[test]
    fn test_writer_rejects_unordered() {
        let mut writer = ChunkWriter::new();
        writer.push(&posting(5, 1, &[0])).unwrap();
        assert!(writer.push(&posting(5, 1, &[0])).is_err());
        assert!(writer.push(&posting(4, 9, &[0])).is_err());
    }

    #[test]
    fn test_delta_encoding_is_compact() {
        let mut writer = ChunkWriter::new();
        for rid in 1..=1000 {
            writer.push(&posting(rid, 1, &[0])).unwrap();
        }
        // rid gap, sid, tf*2, one position gap: one byte each.
        assert_eq!(writer.len(), 4000);
    }

    #[test]
    fn test_reader_rejects_repeated_key() {
        let bytes = [1, 1, 2, 0, 0, 0, 2, 0];
        let mut reader = ChunkReader::new(&bytes);
        assert!(reader.next().unwrap().is_some());
        assert!(reader.next().is_err());
        assert!(reader.next().unwrap().is_none());
    }
}
