//! Merged view of a term's chunk and buffer.
//!
//! Both streams are sorted by key. On equal keys the buffer record wins, a
//! buffer record with `sid == 0` hides every chunk posting of its `rid`, and
//! tombstones (`tf == 0` or `sid == 0`) are consumed without being emitted.

use crate::error::Result;
use crate::postings::Posting;
use crate::postings::buffer::BufferReader;
use crate::postings::chunk::ChunkReader;

enum Side {
    Chunk,
    Buffer,
}

#[derive(Debug)]
pub(crate) struct PostingMerge<'a> {
    chunk: ChunkReader<'a>,
    buffer: BufferReader,
    pc: Option<Posting>,
    pb: Option<Posting>,
    advance_chunk: bool,
    advance_buffer: bool,
}

impl<'a> PostingMerge<'a> {
    pub(crate) fn new(chunk: &'a [u8], buffer_head: u16) -> Self {
        PostingMerge {
            chunk: ChunkReader::new(chunk),
            buffer: BufferReader::new(buffer_head),
            pc: None,
            pb: None,
            advance_chunk: true,
            advance_buffer: true,
        }
    }

    /// Next live posting. `seg` is the buffer segment the records live in.
    pub(crate) fn next(&mut self, seg: &[u8]) -> Result<Option<Posting>> {
        loop {
            if self.advance_chunk {
                self.pc = self.chunk.next()?;
            }
            if self.advance_buffer {
                self.pb = self.buffer.next(seg)?;
            }

            let (chunk, buffer, emit) = match (&self.pc, &self.pb) {
                (None, None) => (false, false, None),
                (Some(c), None) => (true, false, c.is_live().then_some(Side::Chunk)),
                (None, Some(b)) => (false, true, b.is_live().then_some(Side::Buffer)),
                (Some(c), Some(b)) => {
                    if c.rid < b.rid {
                        (true, false, c.is_live().then_some(Side::Chunk))
                    } else if b.rid < c.rid {
                        (false, true, b.is_live().then_some(Side::Buffer))
                    } else if b.sid == 0 {
                        (true, false, None)
                    } else if c.sid < b.sid {
                        (true, false, c.is_live().then_some(Side::Chunk))
                    } else {
                        let emit = (b.tf > 0).then_some(Side::Buffer);
                        (c.sid == b.sid, true, emit)
                    }
                }
            };
            self.advance_chunk = chunk;
            self.advance_buffer = buffer;

            match emit {
                Some(Side::Chunk) => return Ok(self.pc.take()),
                Some(Side::Buffer) => return Ok(self.pb.take()),
                None if !chunk && !buffer => return Ok(None),
                None => {}
            }
        }
    }
}
