use thiserror::Error;

/// Errors raised while reading a managed PE image and its metadata
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("file is empty")]
    Empty,

    #[error("unexpected end of data reading {what} at offset {offset:#x}")]
    Truncated { what: &'static str, offset: usize },

    #[error("not a PE image: {0}")]
    NotPortableExecutable(String),

    #[error("PE image has no CLI header; it is not a managed assembly")]
    NotManaged,

    #[error("RVA {rva:#x} is not mapped by any section")]
    UnmappedRva { rva: u32 },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("metadata stream {0} is missing")]
    MissingStream(&'static str),

    #[error("{table} row {row} is out of range ({count} rows)")]
    RowOutOfRange {
        table: &'static str,
        row: u32,
        count: u32,
    },

    #[error("invalid {heap} heap index {index:#x}")]
    InvalidHeapIndex { heap: &'static str, index: u32 },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid method body at RVA {rva:#x}: {reason}")]
    InvalidMethodBody { rva: u32, reason: String },

    #[error("unknown IL opcode {opcode:#x} at IL offset {offset:#x}")]
    UnknownOpcode { opcode: u16, offset: usize },
}

pub type Result<T> = std::result::Result<T, MetadataError>;
