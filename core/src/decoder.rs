// Declared-layout field decoding
// Structures are never aliased over byte buffers: every field is read at an explicit
// offset with an endianness chosen at decode time, after checking the declared size.

use crate::error::{RelicError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn swap(self) -> Self {
        match self {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        }
    }

    /// Which byte order makes `raw` read as `magic`, if any.
    pub fn of_magic_u32(raw: [u8; 4], magic: u32) -> Option<Self> {
        if u32::from_le_bytes(raw) == magic {
            Some(Endianness::Little)
        } else if u32::from_be_bytes(raw) == magic {
            Some(Endianness::Big)
        } else {
            None
        }
    }

    /// `of_magic_u32` applied to the four bytes at `offset`; `None` if they are absent.
    pub fn probe_u32(bytes: &[u8], offset: usize, magic: u32) -> Option<Self> {
        let raw = bytes.get(offset..offset.checked_add(4)?)?;
        Self::of_magic_u32([raw[0], raw[1], raw[2], raw[3]], magic)
    }

    pub fn probe_u16(bytes: &[u8], offset: usize, magic: u16) -> Option<Self> {
        let raw = bytes.get(offset..offset.checked_add(2)?)?;
        Self::of_magic_u16([raw[0], raw[1]], magic)
    }

    pub fn of_magic_u16(raw: [u8; 2], magic: u16) -> Option<Self> {
        if u16::from_le_bytes(raw) == magic {
            Some(Endianness::Little)
        } else if u16::from_be_bytes(raw) == magic {
            Some(Endianness::Big)
        } else {
            None
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => f.write_str("little-endian"),
            Endianness::Big => f.write_str("big-endian"),
        }
    }
}

/// A fixed-layout on-disk record
pub trait Decode: Sized {
    /// Bytes the layout occupies; shorter inputs are rejected.
    const SIZE: usize;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self>;
}

macro_rules! read_int {
    ($name:ident, $ty:ty, $width:expr, $read:ident) => {
        pub fn $name(&self, offset: usize) -> Result<$ty> {
            let field = self.field(offset, $width)?;
            Ok(match self.endianness {
                Endianness::Little => LittleEndian::$read(field),
                Endianness::Big => BigEndian::$read(field),
            })
        }
    };
}

macro_rules! write_int {
    ($name:ident, $ty:ty, $width:expr, $write:ident) => {
        pub fn $name(&mut self, offset: usize, value: $ty) -> &mut Self {
            let endianness = self.endianness;
            let field = &mut self.buffer[offset..offset + $width];
            match endianness {
                Endianness::Little => LittleEndian::$write(field, value),
                Endianness::Big => BigEndian::$write(field, value),
            }
            self
        }
    };
}

/// Bounds-checked reader over a declared-size record
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    endianness: Endianness,
}

impl<'a> FieldReader<'a> {
    /// Fails with `Truncated` when fewer than `declared_size` bytes are present.
    /// Bytes past the declared size are never visible to accessors.
    pub fn new(bytes: &'a [u8], declared_size: usize, endianness: Endianness) -> Result<Self> {
        if bytes.len() < declared_size {
            return Err(RelicError::Truncated { needed: declared_size, available: bytes.len() });
        }
        Ok(Self { bytes: &bytes[..declared_size], endianness })
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn field(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(width).ok_or(RelicError::Truncated {
            needed: usize::MAX,
            available: self.bytes.len(),
        })?;
        self.bytes
            .get(offset..end)
            .ok_or(RelicError::Truncated { needed: end, available: self.bytes.len() })
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.field(offset, 1)?[0])
    }

    pub fn i8(&self, offset: usize) -> Result<i8> {
        Ok(self.field(offset, 1)?[0] as i8)
    }

    read_int!(u16, u16, 2, read_u16);
    read_int!(u32, u32, 4, read_u32);
    read_int!(u64, u64, 8, read_u64);
    read_int!(i16, i16, 2, read_i16);
    read_int!(i32, i32, 4, read_i32);
    read_int!(i64, i64, 8, read_i64);

    /// Fixed-length binary field, copied verbatim.
    pub fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.field(offset, N)?);
        Ok(out)
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.field(offset, len)
    }
}

/// Builds a record buffer field by field; the inverse of `FieldReader`.
///
/// Panics if a field lies outside the buffer.
#[derive(Debug, Clone)]
pub struct FieldWriter {
    buffer: Vec<u8>,
    endianness: Endianness,
}

impl FieldWriter {
    pub fn new(size: usize, endianness: Endianness) -> Self {
        Self { buffer: vec![0u8; size], endianness }
    }

    pub fn u8(&mut self, offset: usize, value: u8) -> &mut Self {
        self.buffer[offset] = value;
        self
    }

    write_int!(u16, u16, 2, write_u16);
    write_int!(u32, u32, 4, write_u32);
    write_int!(u64, u64, 8, write_u64);
    write_int!(i16, i16, 2, write_i16);
    write_int!(i32, i32, 4, write_i32);
    write_int!(i64, i64, 8, write_i64);

    pub fn bytes(&mut self, offset: usize, value: &[u8]) -> &mut Self {
        self.buffer[offset..offset + value.len()].copy_from_slice(value);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Wrapping sum of the 16-bit words in `bytes` (a trailing odd byte is ignored).
pub fn word_sum16(bytes: &[u8], endianness: Endianness) -> u16 {
    bytes.chunks_exact(2).fold(0u16, |acc, w| {
        let word = match endianness {
            Endianness::Little => LittleEndian::read_u16(w),
            Endianness::Big => BigEndian::read_u16(w),
        };
        acc.wrapping_add(word)
    })
}

/// Wrapping sum of the 32-bit words in `bytes` (trailing bytes are ignored).
pub fn word_sum32(bytes: &[u8], endianness: Endianness) -> u32 {
    bytes.chunks_exact(4).fold(0u32, |acc, w| {
        let word = match endianness {
            Endianness::Little => LittleEndian::read_u32(w),
            Endianness::Big => BigEndian::read_u32(w),
        };
        acc.wrapping_add(word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;

    #[derive(Debug, PartialEq)]
    struct Sample {
        magic: u32,
        blocks: u64,
        delta: i16,
        flags: u8,
        label: String,
        raw: [u8; 4],
    }

    impl Decode for Sample {
        const SIZE: usize = 32;

        fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
            let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
            Ok(Self {
                magic: r.u32(0)?,
                blocks: r.u64(4)?,
                delta: r.i16(12)?,
                flags: r.u8(14)?,
                label: Encoding::Ascii.decode_padded(r.slice(16, 12)?),
                raw: r.bytes::<4>(28)?,
            })
        }
    }

    fn encode(sample: &Sample, endianness: Endianness) -> Vec<u8> {
        let mut w = FieldWriter::new(Sample::SIZE, endianness);
        w.u32(0, sample.magic)
            .u64(4, sample.blocks)
            .i16(12, sample.delta)
            .u8(14, sample.flags)
            .bytes(16, sample.label.as_bytes())
            .bytes(28, &sample.raw);
        w.into_bytes()
    }

    #[test]
    fn test_round_trip_both_orders() {
        let sample = Sample {
            magic: 0x28CD3D45,
            blocks: 0x0123_4567_89AB_CDEF,
            delta: -42,
            flags: 0x81,
            label: "VOLUME".to_string(),
            raw: [1, 2, 3, 4],
        };

        for endianness in [Endianness::Little, Endianness::Big] {
            let bytes = encode(&sample, endianness);
            assert_eq!(Sample::decode(&bytes, endianness).unwrap(), sample);
        }

        let le = encode(&sample, Endianness::Little);
        let be = encode(&sample, Endianness::Big);
        assert_eq!(&le[0..4], &[0x45, 0x3D, 0xCD, 0x28]);
        assert_eq!(&be[0..4], &[0x28, 0xCD, 0x3D, 0x45]);
        assert_eq!(&le[28..32], &be[28..32]);
    }

    #[test]
    fn test_short_input_is_truncated() {
        let err = Sample::decode(&[0u8; 31], Endianness::Little).unwrap_err();
        assert!(matches!(err, RelicError::Truncated { needed: 32, available: 31 }));
    }

    #[test]
    fn test_reader_never_reads_past_declared_size() {
        let bytes = [0xFFu8; 64];
        let r = FieldReader::new(&bytes, 8, Endianness::Little).unwrap();
        assert!(r.u32(4).is_ok());
        assert!(r.u32(5).is_err());
        assert!(r.u64(usize::MAX - 2).is_err());
    }

    #[test]
    fn test_magic_endianness() {
        assert_eq!(Endianness::of_magic_u32([0x45, 0x3D, 0xCD, 0x28], 0x28CD3D45), Some(Endianness::Little));
        assert_eq!(Endianness::of_magic_u32([0x28, 0xCD, 0x3D, 0x45], 0x28CD3D45), Some(Endianness::Big));
        assert_eq!(Endianness::of_magic_u32([0, 0, 0, 0], 0x28CD3D45), None);
        assert_eq!(Endianness::of_magic_u16([0x13, 0x7F], 0x137F), Some(Endianness::Big));
        assert_eq!(Endianness::probe_u32(&[0, 0x45, 0x3D, 0xCD, 0x28], 1, 0x28CD3D45), Some(Endianness::Little));
        assert_eq!(Endianness::probe_u32(&[0x45, 0x3D], 0, 0x28CD3D45), None);
    }

    #[test]
    fn test_word_sums() {
        let bytes = [0x01, 0x00, 0xFF, 0xFF, 0x02, 0x00];
        assert_eq!(word_sum16(&bytes, Endianness::Little), 2);
        assert_eq!(word_sum32(&[0, 0, 0, 1, 0, 0, 0, 2], Endianness::Big), 3);
    }
}
