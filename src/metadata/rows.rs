//! Typed views over the table rows the probe reads

use super::error::Result;
use super::tables::{TableId, Tables, Token};

pub mod flags {
    pub const FIELD_ACCESS_MASK: u16 = 0x0007;
    pub const FIELD_PUBLIC: u16 = 0x0006;
    pub const FIELD_STATIC: u16 = 0x0010;
    pub const FIELD_LITERAL: u16 = 0x0040;
    pub const FIELD_HAS_DEFAULT: u16 = 0x8000;

    pub const METHOD_ACCESS_MASK: u16 = 0x0007;
    pub const METHOD_PUBLIC: u16 = 0x0006;
    pub const METHOD_STATIC: u16 = 0x0010;

    pub const SEMANTICS_GETTER: u16 = 0x0002;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRefRow {
    pub resolution_scope: Token,
    pub name: u32,
    pub namespace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDefRow {
    pub flags: u32,
    pub name: u32,
    pub namespace: u32,
    pub extends: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRow {
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
}

impl FieldRow {
    pub fn is_static(&self) -> bool {
        self.flags & flags::FIELD_STATIC != 0
    }

    pub fn is_public(&self) -> bool {
        self.flags & flags::FIELD_ACCESS_MASK == flags::FIELD_PUBLIC
    }

    pub fn is_literal(&self) -> bool {
        self.flags & flags::FIELD_LITERAL != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDefRow {
    pub rva: u32,
    pub impl_flags: u16,
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
}

impl MethodDefRow {
    pub fn is_static(&self) -> bool {
        self.flags & flags::METHOD_STATIC != 0
    }

    pub fn is_public(&self) -> bool {
        self.flags & flags::METHOD_ACCESS_MASK == flags::METHOD_PUBLIC
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRow {
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSemanticsRow {
    pub semantics: u16,
    pub method: u32,
    pub association: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantRow {
    pub element_type: u8,
    pub parent: Token,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRefRow {
    pub class: Token,
    pub name: u32,
    pub signature: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedClassRow {
    pub nested: u32,
    pub enclosing: u32,
}

impl<'a> Tables<'a> {
    pub fn type_ref(&self, row: u32) -> Result<TypeRefRow> {
        Ok(TypeRefRow {
            resolution_scope: self.coded(TableId::TypeRef, row, 0)?,
            name: self.value(TableId::TypeRef, row, 1)?,
            namespace: self.value(TableId::TypeRef, row, 2)?,
        })
    }

    pub fn type_def(&self, row: u32) -> Result<TypeDefRow> {
        Ok(TypeDefRow {
            flags: self.value(TableId::TypeDef, row, 0)?,
            name: self.value(TableId::TypeDef, row, 1)?,
            namespace: self.value(TableId::TypeDef, row, 2)?,
            extends: self.coded(TableId::TypeDef, row, 3)?,
        })
    }

    /// Field rows declared by a type, with pointer-table indirection resolved
    pub fn type_fields(&self, type_row: u32) -> Result<Vec<u32>> {
        let list_table = self.list_table(TableId::FieldPtr, TableId::Field);
        self.list_range(TableId::TypeDef, type_row, 4, list_table)?
            .map(|index| self.indirect(TableId::FieldPtr, TableId::Field, index))
            .collect()
    }

    /// Method rows declared by a type, with pointer-table indirection resolved
    pub fn type_methods(&self, type_row: u32) -> Result<Vec<u32>> {
        let list_table = self.list_table(TableId::MethodPtr, TableId::MethodDef);
        self.list_range(TableId::TypeDef, type_row, 5, list_table)?
            .map(|index| self.indirect(TableId::MethodPtr, TableId::MethodDef, index))
            .collect()
    }

    /// Property rows declared by a type, found through its PropertyMap entry
    pub fn type_properties(&self, type_row: u32) -> Result<Vec<u32>> {
        let list_table = self.list_table(TableId::PropertyPtr, TableId::Property);
        for map_row in 1..=self.row_count(TableId::PropertyMap) {
            if self.value(TableId::PropertyMap, map_row, 0)? != type_row {
                continue;
            }
            return self
                .list_range(TableId::PropertyMap, map_row, 1, list_table)?
                .map(|index| self.indirect(TableId::PropertyPtr, TableId::Property, index))
                .collect();
        }
        Ok(Vec::new())
    }

    fn list_table(&self, ptr_table: TableId, target: TableId) -> TableId {
        if self.row_count(ptr_table) > 0 {
            ptr_table
        } else {
            target
        }
    }

    pub fn field(&self, row: u32) -> Result<FieldRow> {
        Ok(FieldRow {
            flags: self.value(TableId::Field, row, 0)? as u16,
            name: self.value(TableId::Field, row, 1)?,
            signature: self.value(TableId::Field, row, 2)?,
        })
    }

    pub fn method_def(&self, row: u32) -> Result<MethodDefRow> {
        Ok(MethodDefRow {
            rva: self.value(TableId::MethodDef, row, 0)?,
            impl_flags: self.value(TableId::MethodDef, row, 1)? as u16,
            flags: self.value(TableId::MethodDef, row, 2)? as u16,
            name: self.value(TableId::MethodDef, row, 3)?,
            signature: self.value(TableId::MethodDef, row, 4)?,
        })
    }

    pub fn property(&self, row: u32) -> Result<PropertyRow> {
        Ok(PropertyRow {
            flags: self.value(TableId::Property, row, 0)? as u16,
            name: self.value(TableId::Property, row, 1)?,
            signature: self.value(TableId::Property, row, 2)?,
        })
    }

    pub fn method_semantics(&self, row: u32) -> Result<MethodSemanticsRow> {
        Ok(MethodSemanticsRow {
            semantics: self.value(TableId::MethodSemantics, row, 0)? as u16,
            method: self.value(TableId::MethodSemantics, row, 1)?,
            association: self.coded(TableId::MethodSemantics, row, 2)?,
        })
    }

    pub fn constant(&self, row: u32) -> Result<ConstantRow> {
        Ok(ConstantRow {
            element_type: (self.value(TableId::Constant, row, 0)? & 0xFF) as u8,
            parent: self.coded(TableId::Constant, row, 1)?,
            value: self.value(TableId::Constant, row, 2)?,
        })
    }

    pub fn member_ref(&self, row: u32) -> Result<MemberRefRow> {
        Ok(MemberRefRow {
            class: self.coded(TableId::MemberRef, row, 0)?,
            name: self.value(TableId::MemberRef, row, 1)?,
            signature: self.value(TableId::MemberRef, row, 2)?,
        })
    }

    pub fn nested_class(&self, row: u32) -> Result<NestedClassRow> {
        Ok(NestedClassRow {
            nested: self.value(TableId::NestedClass, row, 0)?,
            enclosing: self.value(TableId::NestedClass, row, 1)?,
        })
    }

    /// The Constant row whose parent is `parent`, if any
    pub fn constant_for(&self, parent: Token) -> Result<Option<ConstantRow>> {
        for row in 1..=self.row_count(TableId::Constant) {
            let constant = self.constant(row)?;
            if constant.parent == parent {
                return Ok(Some(constant));
            }
        }
        Ok(None)
    }

    /// The getter MethodDef row attached to a property, if any
    pub fn property_getter(&self, property_row: u32) -> Result<Option<u32>> {
        let association = Token::new(TableId::Property, property_row);
        for row in 1..=self.row_count(TableId::MethodSemantics) {
            let semantics = self.method_semantics(row)?;
            if semantics.association == association
                && semantics.semantics & flags::SEMANTICS_GETTER != 0
            {
                return Ok(Some(semantics.method));
            }
        }
        Ok(None)
    }

    /// The TypeDef row that owns a field
    pub fn field_owner(&self, field_row: u32) -> Result<Option<u32>> {
        for type_row in 1..=self.row_count(TableId::TypeDef) {
            if self.type_fields(type_row)?.contains(&field_row) {
                return Ok(Some(type_row));
            }
        }
        Ok(None)
    }

    /// The TypeDef row that declares a method
    pub fn method_owner(&self, method_row: u32) -> Result<Option<u32>> {
        for type_row in 1..=self.row_count(TableId::TypeDef) {
            if self.type_methods(type_row)?.contains(&method_row) {
                return Ok(Some(type_row));
            }
        }
        Ok(None)
    }

    /// The generic method a MethodSpec instantiates
    pub fn method_spec_target(&self, row: u32) -> Result<Token> {
        self.coded(TableId::MethodSpec, row, 0)
    }
}
