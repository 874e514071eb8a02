//! Bounds-checked little-endian reader over a byte slice

use super::error::{MetadataError, Result};

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        if pos > data.len() {
            return Err(MetadataError::Truncated {
                what: "seek target",
                offset: pos,
            });
        }
        Ok(Self { data, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(MetadataError::Truncated {
                what: "seek target",
                offset: pos,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize, what: &'static str) -> Result<()> {
        self.bytes(count, what).map(|_| ())
    }

    pub fn bytes(&mut self, count: usize, what: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or(MetadataError::Truncated {
                what,
                offset: self.pos,
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    pub fn u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub fn u64(&mut self, what: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    pub fn i8(&mut self, what: &'static str) -> Result<i8> {
        Ok(self.u8(what)? as i8)
    }

    pub fn i32(&mut self, what: &'static str) -> Result<i32> {
        Ok(self.u32(what)? as i32)
    }

    pub fn i64(&mut self, what: &'static str) -> Result<i64> {
        Ok(self.u64(what)? as i64)
    }

    /// Reads a 2- or 4-byte index depending on `wide`
    pub fn index(&mut self, wide: bool, what: &'static str) -> Result<u32> {
        if wide {
            self.u32(what)
        } else {
            self.u16(what).map(u32::from)
        }
    }

    /// Reads an ECMA-335 compressed unsigned integer (II.23.2)
    pub fn compressed_u32(&mut self, what: &'static str) -> Result<u32> {
        let first = self.u8(what)?;
        if first & 0x80 == 0 {
            Ok(u32::from(first))
        } else if first & 0xC0 == 0x80 {
            let second = self.u8(what)?;
            Ok((u32::from(first & 0x3F) << 8) | u32::from(second))
        } else if first & 0xE0 == 0xC0 {
            let rest = self.array::<3>(what)?;
            Ok((u32::from(first & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2]))
        } else {
            Err(MetadataError::InvalidSignature(format!(
                "invalid compressed integer lead byte {:#04x} in {}",
                first, what
            )))
        }
    }

    /// Reads a NUL-terminated ASCII name and advances past the terminator
    pub fn c_str(&mut self, what: &'static str) -> Result<&'a str> {
        let rest = &self.data[self.pos..];
        let len = rest.iter().position(|b| *b == 0).ok_or(MetadataError::Truncated {
            what,
            offset: self.pos,
        })?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|_| MetadataError::InvalidMetadata(format!("{} is not valid UTF-8", what)))?;
        self.pos += len + 1;
        Ok(text)
    }

    /// Advances to the next multiple of `alignment` relative to the start of the slice
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padded = (self.pos + alignment - 1) / alignment * alignment;
        self.seek(padded.min(self.data.len()))
    }
}
