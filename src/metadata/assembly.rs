//! An assembly image owned in memory

use super::error::Result;
use super::image::Metadata;
use super::tables::TableId;

/// A managed image whose metadata parsed cleanly.
///
/// The bytes are owned here and borrowed views are produced on demand with
/// [`Assembly::metadata`], so an `Assembly` can be moved and dropped freely.
#[derive(Debug, Clone)]
pub struct Assembly {
    bytes: Vec<u8>,
    module_name: String,
    runtime_version: String,
    type_count: u32,
    pe32_plus: bool,
}

impl Assembly {
    /// Parses `bytes` as a managed image and checks that every type name resolves
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (module_name, runtime_version, type_count, pe32_plus) = {
            let metadata = Metadata::parse(&bytes)?;
            metadata.type_names()?;
            (
                metadata.module_name()?.to_string(),
                metadata.version.to_string(),
                metadata.tables.row_count(TableId::TypeDef),
                metadata.pe().is_pe32_plus,
            )
        };

        Ok(Self {
            bytes,
            module_name,
            runtime_version,
            type_count,
            pe32_plus,
        })
    }

    pub fn metadata(&self) -> Result<Metadata<'_>> {
        Metadata::parse(&self.bytes)
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Runtime version string from the metadata root, e.g. `v4.0.30319`
    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    /// Number of TypeDef rows, the global `<Module>` type included
    pub fn type_count(&self) -> u32 {
        self.type_count
    }

    /// Whether the image has a PE32+ (64-bit) optional header
    pub fn is_pe32_plus(&self) -> bool {
        self.pe32_plus
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
