//! The `#~` / `#-` table stream: table identifiers, coded indexes, column schemas
//! and row addressing (ECMA-335 II.22 and II.24.2.6)

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};
use std::ops::Range;

pub const TABLE_COUNT: usize = 0x2D;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    pub const ALL: [TableId; TABLE_COUNT] = [
        TableId::Module,
        TableId::TypeRef,
        TableId::TypeDef,
        TableId::FieldPtr,
        TableId::Field,
        TableId::MethodPtr,
        TableId::MethodDef,
        TableId::ParamPtr,
        TableId::Param,
        TableId::InterfaceImpl,
        TableId::MemberRef,
        TableId::Constant,
        TableId::CustomAttribute,
        TableId::FieldMarshal,
        TableId::DeclSecurity,
        TableId::ClassLayout,
        TableId::FieldLayout,
        TableId::StandAloneSig,
        TableId::EventMap,
        TableId::EventPtr,
        TableId::Event,
        TableId::PropertyMap,
        TableId::PropertyPtr,
        TableId::Property,
        TableId::MethodSemantics,
        TableId::MethodImpl,
        TableId::ModuleRef,
        TableId::TypeSpec,
        TableId::ImplMap,
        TableId::FieldRva,
        TableId::EncLog,
        TableId::EncMap,
        TableId::Assembly,
        TableId::AssemblyProcessor,
        TableId::AssemblyOs,
        TableId::AssemblyRef,
        TableId::AssemblyRefProcessor,
        TableId::AssemblyRefOs,
        TableId::File,
        TableId::ExportedType,
        TableId::ManifestResource,
        TableId::NestedClass,
        TableId::GenericParam,
        TableId::MethodSpec,
        TableId::GenericParamConstraint,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TableId::Module => "Module",
            TableId::TypeRef => "TypeRef",
            TableId::TypeDef => "TypeDef",
            TableId::FieldPtr => "FieldPtr",
            TableId::Field => "Field",
            TableId::MethodPtr => "MethodPtr",
            TableId::MethodDef => "MethodDef",
            TableId::ParamPtr => "ParamPtr",
            TableId::Param => "Param",
            TableId::InterfaceImpl => "InterfaceImpl",
            TableId::MemberRef => "MemberRef",
            TableId::Constant => "Constant",
            TableId::CustomAttribute => "CustomAttribute",
            TableId::FieldMarshal => "FieldMarshal",
            TableId::DeclSecurity => "DeclSecurity",
            TableId::ClassLayout => "ClassLayout",
            TableId::FieldLayout => "FieldLayout",
            TableId::StandAloneSig => "StandAloneSig",
            TableId::EventMap => "EventMap",
            TableId::EventPtr => "EventPtr",
            TableId::Event => "Event",
            TableId::PropertyMap => "PropertyMap",
            TableId::PropertyPtr => "PropertyPtr",
            TableId::Property => "Property",
            TableId::MethodSemantics => "MethodSemantics",
            TableId::MethodImpl => "MethodImpl",
            TableId::ModuleRef => "ModuleRef",
            TableId::TypeSpec => "TypeSpec",
            TableId::ImplMap => "ImplMap",
            TableId::FieldRva => "FieldRVA",
            TableId::EncLog => "EncLog",
            TableId::EncMap => "EncMap",
            TableId::Assembly => "Assembly",
            TableId::AssemblyProcessor => "AssemblyProcessor",
            TableId::AssemblyOs => "AssemblyOS",
            TableId::AssemblyRef => "AssemblyRef",
            TableId::AssemblyRefProcessor => "AssemblyRefProcessor",
            TableId::AssemblyRefOs => "AssemblyRefOS",
            TableId::File => "File",
            TableId::ExportedType => "ExportedType",
            TableId::ManifestResource => "ManifestResource",
            TableId::NestedClass => "NestedClass",
            TableId::GenericParam => "GenericParam",
            TableId::MethodSpec => "MethodSpec",
            TableId::GenericParamConstraint => "GenericParamConstraint",
        }
    }
}

/// A (table, row) pair; row 0 is the null reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub table: TableId,
    pub row: u32,
}

impl Token {
    pub fn new(table: TableId, row: u32) -> Self {
        Self { table, row }
    }

    /// Decodes a 32-bit metadata token as found in IL operands
    pub fn from_raw(raw: u32) -> Option<Self> {
        TableId::from_u8((raw >> 24) as u8).map(|table| Self {
            table,
            row: raw & 0x00FF_FFFF,
        })
    }

    pub fn is_null(&self) -> bool {
        self.row == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    /// Tables addressed by each tag value; `None` marks reserved tags
    pub fn tables(self) -> &'static [Option<TableId>] {
        use TableId::*;
        match self {
            CodedIndex::TypeDefOrRef => &[Some(TypeDef), Some(TypeRef), Some(TypeSpec)],
            CodedIndex::HasConstant => &[Some(Field), Some(Param), Some(Property)],
            CodedIndex::HasCustomAttribute => &[
                Some(MethodDef),
                Some(Field),
                Some(TypeRef),
                Some(TypeDef),
                Some(Param),
                Some(InterfaceImpl),
                Some(MemberRef),
                Some(Module),
                Some(DeclSecurity),
                Some(Property),
                Some(Event),
                Some(StandAloneSig),
                Some(ModuleRef),
                Some(TypeSpec),
                Some(Assembly),
                Some(AssemblyRef),
                Some(File),
                Some(ExportedType),
                Some(ManifestResource),
                Some(GenericParam),
                Some(GenericParamConstraint),
                Some(MethodSpec),
            ],
            CodedIndex::HasFieldMarshal => &[Some(Field), Some(Param)],
            CodedIndex::HasDeclSecurity => &[Some(TypeDef), Some(MethodDef), Some(Assembly)],
            CodedIndex::MemberRefParent => &[
                Some(TypeDef),
                Some(TypeRef),
                Some(ModuleRef),
                Some(MethodDef),
                Some(TypeSpec),
            ],
            CodedIndex::HasSemantics => &[Some(Event), Some(Property)],
            CodedIndex::MethodDefOrRef => &[Some(MethodDef), Some(MemberRef)],
            CodedIndex::MemberForwarded => &[Some(Field), Some(MethodDef)],
            CodedIndex::Implementation => &[Some(File), Some(AssemblyRef), Some(ExportedType)],
            CodedIndex::CustomAttributeType => {
                &[None, None, Some(MethodDef), Some(MemberRef), None]
            }
            CodedIndex::ResolutionScope => {
                &[Some(Module), Some(ModuleRef), Some(AssemblyRef), Some(TypeRef)]
            }
            CodedIndex::TypeOrMethodDef => &[Some(TypeDef), Some(MethodDef)],
        }
    }

    pub fn tag_bits(self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    pub fn decode(self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = self
            .tables()
            .get(tag)
            .copied()
            .flatten()
            .ok_or_else(|| {
                MetadataError::InvalidMetadata(format!(
                    "coded index {:?} has invalid tag {}",
                    self, tag
                ))
            })?;
        Ok(Token::new(table, value >> bits))
    }

    pub fn encode(self, token: Token) -> Option<u32> {
        let tag = self
            .tables()
            .iter()
            .position(|t| *t == Some(token.table))? as u32;
        Some((token.row << self.tag_bits()) | tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(TableId),
    Coded(CodedIndex),
}

/// Column layout of every table, in on-disk order
pub fn schema(table: TableId) -> &'static [Column] {
    use CodedIndex as C;
    use Column::*;
    use TableId as T;
    match table {
        T::Module => &[U16, Str, Guid, Guid, Guid],
        T::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
        T::TypeDef => &[
            U32,
            Str,
            Str,
            Coded(C::TypeDefOrRef),
            Table(T::Field),
            Table(T::MethodDef),
        ],
        T::FieldPtr => &[Table(T::Field)],
        T::Field => &[U16, Str, Blob],
        T::MethodPtr => &[Table(T::MethodDef)],
        T::MethodDef => &[U32, U16, U16, Str, Blob, Table(T::Param)],
        T::ParamPtr => &[Table(T::Param)],
        T::Param => &[U16, U16, Str],
        T::InterfaceImpl => &[Table(T::TypeDef), Coded(C::TypeDefOrRef)],
        T::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
        // Type is a single byte followed by a padding byte
        T::Constant => &[U16, Coded(C::HasConstant), Blob],
        T::CustomAttribute => &[
            Coded(C::HasCustomAttribute),
            Coded(C::CustomAttributeType),
            Blob,
        ],
        T::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
        T::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
        T::ClassLayout => &[U16, U32, Table(T::TypeDef)],
        T::FieldLayout => &[U32, Table(T::Field)],
        T::StandAloneSig => &[Blob],
        T::EventMap => &[Table(T::TypeDef), Table(T::Event)],
        T::EventPtr => &[Table(T::Event)],
        T::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
        T::PropertyMap => &[Table(T::TypeDef), Table(T::Property)],
        T::PropertyPtr => &[Table(T::Property)],
        T::Property => &[U16, Str, Blob],
        T::MethodSemantics => &[U16, Table(T::MethodDef), Coded(C::HasSemantics)],
        T::MethodImpl => &[
            Table(T::TypeDef),
            Coded(C::MethodDefOrRef),
            Coded(C::MethodDefOrRef),
        ],
        T::ModuleRef => &[Str],
        T::TypeSpec => &[Blob],
        T::ImplMap => &[U16, Coded(C::MemberForwarded), Str, Table(T::ModuleRef)],
        T::FieldRva => &[U32, Table(T::Field)],
        T::EncLog => &[U32, U32],
        T::EncMap => &[U32],
        T::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        T::AssemblyProcessor => &[U32],
        T::AssemblyOs => &[U32, U32, U32],
        T::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        T::AssemblyRefProcessor => &[U32, Table(T::AssemblyRef)],
        T::AssemblyRefOs => &[U32, U32, U32, Table(T::AssemblyRef)],
        T::File => &[U32, Str, Blob],
        T::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
        T::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
        T::NestedClass => &[Table(T::TypeDef), Table(T::TypeDef)],
        T::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
        T::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
        T::GenericParamConstraint => &[Table(T::GenericParam), Coded(C::TypeDefOrRef)],
    }
}

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_BLOB_WIDE: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

#[derive(Debug, Clone)]
struct TableLayout {
    offset: usize,
    row_size: usize,
    /// (offset within the row, width in bytes) per column
    columns: Vec<(usize, usize)>,
}

/// Parsed table stream header plus the computed position of every row
#[derive(Debug, Clone)]
pub struct Tables<'a> {
    data: &'a [u8],
    pub major_version: u8,
    pub minor_version: u8,
    rows: [u32; TABLE_COUNT],
    layouts: Vec<TableLayout>,
}

impl<'a> Tables<'a> {
    pub fn parse(stream: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(stream);
        reader.skip(4, "table stream reserved")?;
        let major_version = reader.u8("table stream major version")?;
        let minor_version = reader.u8("table stream minor version")?;
        let heap_sizes = reader.u8("HeapSizes")?;
        reader.skip(1, "table stream reserved")?;
        let valid = reader.u64("Valid")?;
        let _sorted = reader.u64("Sorted")?;

        let mut rows = [0u32; TABLE_COUNT];
        for bit in 0..64 {
            if valid & (1u64 << bit) == 0 {
                continue;
            }
            let count = reader.u32("table row count")?;
            // Tables past GenericParamConstraint are stored after every table we
            // address, so they never shift our offsets.
            if let Some(slot) = rows.get_mut(bit) {
                *slot = count;
            }
        }

        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            reader.skip(4, "table stream extra data")?;
        }

        let width = |column: Column| -> usize {
            match column {
                Column::U16 => 2,
                Column::U32 => 4,
                Column::Str => heap_width(heap_sizes, HEAP_STRINGS_WIDE),
                Column::Guid => heap_width(heap_sizes, HEAP_GUID_WIDE),
                Column::Blob => heap_width(heap_sizes, HEAP_BLOB_WIDE),
                Column::Table(table) => {
                    if rows[table.index()] < 0x1_0000 {
                        2
                    } else {
                        4
                    }
                }
                Column::Coded(coded) => {
                    let max_rows = coded
                        .tables()
                        .iter()
                        .flatten()
                        .map(|t| rows[t.index()])
                        .max()
                        .unwrap_or(0);
                    if max_rows < (1u32 << (16 - coded.tag_bits())) {
                        2
                    } else {
                        4
                    }
                }
            }
        };

        let mut offset = reader.position();
        let mut layouts = Vec::with_capacity(TABLE_COUNT);
        for table in TableId::ALL {
            let mut columns = Vec::new();
            let mut row_size = 0;
            for column in schema(table) {
                let w = width(*column);
                columns.push((row_size, w));
                row_size += w;
            }
            layouts.push(TableLayout {
                offset,
                row_size,
                columns,
            });
            offset = rows[table.index()]
                .checked_mul(row_size as u32)
                .and_then(|size| offset.checked_add(size as usize))
                .ok_or_else(|| {
                    MetadataError::InvalidMetadata(format!("{} table is too large", table.name()))
                })?;
        }

        if offset > stream.len() {
            return Err(MetadataError::Truncated {
                what: "metadata tables",
                offset: stream.len(),
            });
        }

        Ok(Self {
            data: stream,
            major_version,
            minor_version,
            rows,
            layouts,
        })
    }

    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table.index()]
    }

    /// Reads one column of a 1-based row
    pub fn value(&self, table: TableId, row: u32, column: usize) -> Result<u32> {
        let count = self.row_count(table);
        if row == 0 || row > count {
            return Err(MetadataError::RowOutOfRange {
                table: table.name(),
                row,
                count,
            });
        }
        let layout = &self.layouts[table.index()];
        let (column_offset, width) = *layout.columns.get(column).ok_or_else(|| {
            MetadataError::InvalidMetadata(format!(
                "{} has no column {}",
                table.name(),
                column
            ))
        })?;
        let position = layout.offset + (row as usize - 1) * layout.row_size + column_offset;
        let mut reader = ByteReader::at(self.data, position)?;
        reader.index(width == 4, "table column")
    }

    pub fn coded(&self, table: TableId, row: u32, column: usize) -> Result<Token> {
        match schema(table).get(column) {
            Some(Column::Coded(coded)) => coded.decode(self.value(table, row, column)?),
            _ => Err(MetadataError::InvalidMetadata(format!(
                "{} column {} is not a coded index",
                table.name(),
                column
            ))),
        }
    }

    /// Resolves a logical row through its pointer table when the stream uses one
    pub fn indirect(&self, ptr_table: TableId, target: TableId, index: u32) -> Result<u32> {
        if self.row_count(ptr_table) == 0 {
            return Ok(index);
        }
        let row = self.value(ptr_table, index, 0)?;
        if row == 0 || row > self.row_count(target) {
            return Err(MetadataError::RowOutOfRange {
                table: target.name(),
                row,
                count: self.row_count(target),
            });
        }
        Ok(row)
    }

    /// The half-open run of list entries owned by `owner_row` (e.g. a type's fields).
    ///
    /// `list_table` is the table the list column points into: the pointer table if
    /// present, otherwise the target table.
    pub fn list_range(
        &self,
        owner: TableId,
        owner_row: u32,
        column: usize,
        list_table: TableId,
    ) -> Result<Range<u32>> {
        let end_of_list = self.row_count(list_table) + 1;
        let start = self.value(owner, owner_row, column)?.min(end_of_list);
        let end = if owner_row < self.row_count(owner) {
            self.value(owner, owner_row + 1, column)?.min(end_of_list)
        } else {
            end_of_list
        };
        Ok(start..end.max(start))
    }
}

fn heap_width(heap_sizes: u8, flag: u8) -> usize {
    if heap_sizes & flag != 0 {
        4
    } else {
        2
    }
}
