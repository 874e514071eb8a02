//! Metadata heaps: #Strings, #US, #Blob and #GUID

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct StringsHeap<'a> {
    data: &'a [u8],
}

impl<'a> StringsHeap<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, index: u32) -> Result<&'a str> {
        let invalid = || MetadataError::InvalidHeapIndex {
            heap: "#Strings",
            index,
        };
        let rest = self.data.get(index as usize..).ok_or_else(invalid)?;
        let len = rest.iter().position(|b| *b == 0).ok_or_else(invalid)?;
        std::str::from_utf8(&rest[..len]).map_err(|_| invalid())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlobHeap<'a> {
    data: &'a [u8],
}

impl<'a> BlobHeap<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, index: u32) -> Result<&'a [u8]> {
        read_blob(self.data, index, "#Blob")
    }
}

/// The user string heap; entries are UTF-16LE blobs with a trailing flag byte
#[derive(Debug, Clone, Copy, Default)]
pub struct UserStringHeap<'a> {
    data: &'a [u8],
}

impl<'a> UserStringHeap<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn get(&self, index: u32) -> Result<String> {
        let blob = read_blob(self.data, index, "#US")?;
        let chars = &blob[..blob.len() & !1];
        decode_utf16(chars).ok_or(MetadataError::InvalidHeapIndex {
            heap: "#US",
            index,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuidHeap<'a> {
    data: &'a [u8],
}

impl<'a> GuidHeap<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// GUID heap indexes are 1-based; 0 means "no GUID"
    pub fn get(&self, index: u32) -> Result<Option<Uuid>> {
        if index == 0 {
            return Ok(None);
        }
        let start = (index as usize - 1) * 16;
        let bytes = self
            .data
            .get(start..start + 16)
            .ok_or(MetadataError::InvalidHeapIndex {
                heap: "#GUID",
                index,
            })?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(Some(guid_from_bytes_le(raw)))
    }
}

fn read_blob<'a>(data: &'a [u8], index: u32, heap: &'static str) -> Result<&'a [u8]> {
    let mut reader = ByteReader::at(data, index as usize)
        .map_err(|_| MetadataError::InvalidHeapIndex { heap, index })?;
    let len = reader
        .compressed_u32("blob length")
        .map_err(|_| MetadataError::InvalidHeapIndex { heap, index })?;
    reader
        .bytes(len as usize, "blob")
        .map_err(|_| MetadataError::InvalidHeapIndex { heap, index })
}

pub(crate) fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Converts the in-memory layout of a .NET `System.Guid` into a [`Uuid`].
///
/// The first three groups are stored little-endian, the last eight bytes as-is.
pub fn guid_from_bytes_le(raw: [u8; 16]) -> Uuid {
    Uuid::from_bytes_le(raw)
}
