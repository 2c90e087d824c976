//! Variable-length integer encoding utilities.
//!
//! Buffer records and chunks store every integer (document ids, gaps,
//! frequencies, positions) as a LEB128 varint: 7 bits per byte with the high
//! bit as continuation flag. All helpers here work on byte slices with an
//! explicit read offset, since callers walk packed records in place.

use crate::error::{GlaiveError, Result};

/// Largest number of bytes a `u32` occupies once encoded.
pub const MAX_U32_LEN: usize = 5;

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_U32_LEN);
    push_u32(&mut bytes, value);
    bytes
}

/// Append the encoding of `value` to `out`.
pub fn push_u32(out: &mut Vec<u8>, value: u32) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        out.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

/// Decode a u32 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 32 {
            return Err(GlaiveError::invalid_format("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(GlaiveError::invalid_format("Incomplete VarInt"))
}

/// Decode the value at `*pos` and advance `*pos` past it.
pub fn read_u32_at(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let tail = bytes
        .get(*pos..)
        .ok_or_else(|| GlaiveError::invalid_format("VarInt offset out of range"))?;
    let (value, len) = decode_u32(tail)?;
    *pos += len;
    Ok(value)
}

/// Advance `*pos` past one encoded value without decoding it.
pub fn skip_at(bytes: &[u8], pos: &mut usize) -> Result<()> {
    while let Some(&byte) = bytes.get(*pos) {
        *pos += 1;
        if byte & 0x80 == 0 {
            return Ok(());
        }
    }
    Err(GlaiveError::invalid_format("Incomplete VarInt"))
}

/// Copy one encoded value from `src[*pos..]` to `out`, advancing `*pos`.
pub fn copy_at(src: &[u8], pos: &mut usize, out: &mut Vec<u8>) -> Result<()> {
    let start = *pos;
    skip_at(src, pos)?;
    out.extend_from_slice(&src[start..*pos]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_u32() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u32::MAX];

        for &value in &test_values {
            let encoded = encode_u32(value);
            let (decoded, bytes_read) = decode_u32(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
            assert_eq!(encoded.len(), encoded_len(value));
        }
    }

    #[test]
    fn test_read_and_skip_at_offset() {
        let mut buffer = Vec::new();
        push_u32(&mut buffer, 300);
        push_u32(&mut buffer, 5);
        push_u32(&mut buffer, 70000);

        let mut pos = 0;
        skip_at(&buffer, &mut pos).unwrap();
        assert_eq!(read_u32_at(&buffer, &mut pos).unwrap(), 5);
        assert_eq!(read_u32_at(&buffer, &mut pos).unwrap(), 70000);
        assert_eq!(pos, buffer.len());
        assert!(read_u32_at(&buffer, &mut pos).is_err());
    }

    #[test]
    fn test_copy_at() {
        let src = encode_u32(123_456);
        let mut out = vec![9];
        let mut pos = 0;
        copy_at(&src, &mut pos, &mut out).unwrap();
        assert_eq!(&out[1..], &src[..]);
        assert_eq!(pos, src.len());
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u32(0).len(), 1);
        assert_eq!(encode_u32(127).len(), 1);
        assert_eq!(encode_u32(128).len(), 2);
        assert_eq!(encode_u32(16383).len(), 2);
        assert_eq!(encode_u32(16384).len(), 3);
        assert!(encode_u32(u32::MAX).len() <= MAX_U32_LEN);
    }

    #[test]
    fn test_incomplete_varint() {
        // Continuation bit set but no more data
        let incomplete = vec![0x80];
        assert!(decode_u32(&incomplete).is_err());
        let mut pos = 0;
        assert!(skip_at(&incomplete, &mut pos).is_err());
    }

    #[test]
    fn test_overflow() {
        let overflow_data = vec![0xFF; 10];
        assert!(decode_u32(&overflow_data).is_err());
    }
}
