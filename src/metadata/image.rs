//! The metadata root, its streams, and name-level lookups across tables

use std::collections::HashMap;

use tracing::debug;

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};
use super::heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringHeap};
use super::il::MethodBody;
use super::pe::PeImage;
use super::signature::{self, MethodSig, TypeSig};
use super::tables::{TableId, Tables, Token};

const METADATA_SIGNATURE: u32 = 0x424A_5342; // "BSJB"
const USER_STRING_TABLE: u8 = 0x70;
const GLOBAL_TYPE_NAME: &str = "<Module>";

/// Raw stream slices found in the metadata root
#[derive(Debug, Clone, Copy, Default)]
pub struct Streams<'a> {
    pub version: &'a str,
    pub tables: Option<&'a [u8]>,
    pub strings: Option<&'a [u8]>,
    pub user_strings: Option<&'a [u8]>,
    pub guids: Option<&'a [u8]>,
    pub blobs: Option<&'a [u8]>,
}

impl<'a> Streams<'a> {
    /// Parses the metadata root (ECMA-335 II.24.2.1) and its stream headers
    pub fn parse(root: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(root);
        if reader.u32("metadata signature")? != METADATA_SIGNATURE {
            return Err(MetadataError::InvalidMetadata(
                "metadata root signature is not BSJB".to_string(),
            ));
        }
        reader.skip(2 + 2 + 4, "metadata root version")?;
        let version_len = reader.u32("metadata version length")? as usize;
        let raw_version = reader.bytes(version_len, "metadata version")?;
        let version_end = raw_version
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(raw_version.len());
        let version = std::str::from_utf8(&raw_version[..version_end]).map_err(|_| {
            MetadataError::InvalidMetadata("metadata version is not valid UTF-8".to_string())
        })?;
        reader.skip(2, "metadata root flags")?;
        let stream_count = reader.u16("metadata stream count")?;

        let mut streams = Self {
            version,
            ..Self::default()
        };
        for _ in 0..stream_count {
            let offset = reader.u32("stream offset")? as usize;
            let size = reader.u32("stream size")? as usize;
            let name = reader.c_str("stream name")?;
            reader.align(4)?;

            let body = offset
                .checked_add(size)
                .and_then(|end| root.get(offset..end))
                .ok_or(MetadataError::Truncated {
                    what: "metadata stream",
                    offset,
                })?;
            match name {
                "#~" | "#-" => streams.tables = Some(body),
                "#Strings" => streams.strings = Some(body),
                "#US" => streams.user_strings = Some(body),
                "#GUID" => streams.guids = Some(body),
                "#Blob" => streams.blobs = Some(body),
                other => debug!(stream = other, "Ignoring unknown metadata stream"),
            }
        }
        Ok(streams)
    }
}

/// A method reference resolved to names and a decoded signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub declaring_type: String,
    pub name: String,
    pub signature: MethodSig,
}

/// Borrowed view over a managed image's metadata
#[derive(Debug)]
pub struct Metadata<'a> {
    pe: PeImage<'a>,
    pub version: &'a str,
    pub tables: Tables<'a>,
    pub strings: StringsHeap<'a>,
    pub blobs: BlobHeap<'a>,
    pub user_strings: UserStringHeap<'a>,
    pub guids: GuidHeap<'a>,
}

impl<'a> Metadata<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let pe = PeImage::parse(data)?;
        let streams = Streams::parse(pe.metadata()?)?;
        let tables = Tables::parse(streams.tables.ok_or(MetadataError::MissingStream("#~"))?)?;
        let strings = streams
            .strings
            .ok_or(MetadataError::MissingStream("#Strings"))?;

        Ok(Self {
            pe,
            version: streams.version,
            tables,
            strings: StringsHeap::new(strings),
            blobs: BlobHeap::new(streams.blobs.unwrap_or_default()),
            user_strings: UserStringHeap::new(streams.user_strings.unwrap_or_default()),
            guids: GuidHeap::new(streams.guids.unwrap_or_default()),
        })
    }

    pub fn pe(&self) -> &PeImage<'a> {
        &self.pe
    }

    /// Name of the module, from the Module table
    pub fn module_name(&self) -> Result<&'a str> {
        self.strings.get(self.tables.value(TableId::Module, 1, 1)?)
    }

    /// Full names of the module's types, in table order.
    ///
    /// The global `<Module>` type in the first row is not a real type and is
    /// left out, as type enumeration through reflection does.
    pub fn type_names(&self) -> Result<Vec<String>> {
        let nesting = self.nesting_map()?;
        let first = if self.has_global_type()? { 2 } else { 1 };
        (first..=self.tables.row_count(TableId::TypeDef))
            .map(|row| self.type_name_with(row, &nesting))
            .collect()
    }

    fn has_global_type(&self) -> Result<bool> {
        if self.tables.row_count(TableId::TypeDef) == 0 {
            return Ok(false);
        }
        let def = self.tables.type_def(1)?;
        Ok(self.strings.get(def.namespace)?.is_empty()
            && self.strings.get(def.name)? == GLOBAL_TYPE_NAME)
    }

    /// Full name of one TypeDef: `Namespace.Name`, `Outer+Inner` for nested types
    pub fn type_name(&self, row: u32) -> Result<String> {
        let nesting = self.nesting_map()?;
        self.type_name_with(row, &nesting)
    }

    pub fn find_type(&self, full_name: &str) -> Result<Option<u32>> {
        let nesting = self.nesting_map()?;
        for row in 1..=self.tables.row_count(TableId::TypeDef) {
            let def = self.tables.type_def(row)?;
            if !full_name.ends_with(self.strings.get(def.name)?) {
                continue;
            }
            if self.type_name_with(row, &nesting)? == full_name {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn nesting_map(&self) -> Result<HashMap<u32, u32>> {
        (1..=self.tables.row_count(TableId::NestedClass))
            .map(|row| {
                self.tables
                    .nested_class(row)
                    .map(|nested| (nested.nested, nested.enclosing))
            })
            .collect()
    }

    fn type_name_with(&self, row: u32, nesting: &HashMap<u32, u32>) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = row;
        loop {
            let def = self.tables.type_def(current)?;
            segments.push(self.strings.get(def.name)?);
            match nesting.get(&current) {
                Some(outer) if segments.len() <= nesting.len() => current = *outer,
                Some(_) => {
                    return Err(MetadataError::InvalidMetadata(format!(
                        "type {} has cyclic nesting",
                        row
                    )))
                }
                None => {
                    let namespace = self.strings.get(def.namespace)?;
                    segments.reverse();
                    return Ok(qualify(namespace, &segments.join("+")));
                }
            }
        }
    }

    /// Full name of a TypeRef, following nested resolution scopes
    pub fn type_ref_name(&self, row: u32) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = row;
        loop {
            let type_ref = self.tables.type_ref(current)?;
            segments.push(self.strings.get(type_ref.name)?);
            let scope = type_ref.resolution_scope;
            if scope.table == TableId::TypeRef && !scope.is_null() {
                if segments.len() > self.tables.row_count(TableId::TypeRef) as usize {
                    return Err(MetadataError::InvalidMetadata(format!(
                        "type reference {} has cyclic resolution scopes",
                        row
                    )));
                }
                current = scope.row;
                continue;
            }
            let namespace = self.strings.get(type_ref.namespace)?;
            segments.reverse();
            return Ok(qualify(namespace, &segments.join("+")));
        }
    }

    /// Full name of a TypeDefOrRef-style token; TypeSpecs name their underlying type
    pub fn type_token_name(&self, token: Token) -> Result<String> {
        match token.table {
            TableId::TypeDef => self.type_name(token.row),
            TableId::TypeRef => self.type_ref_name(token.row),
            TableId::TypeSpec => {
                let blob = self
                    .blobs
                    .get(self.tables.value(TableId::TypeSpec, token.row, 0)?)?;
                let mut reader = ByteReader::new(blob);
                match signature::parse_type(&mut reader)? {
                    TypeSig::ValueType(inner) | TypeSig::Class(inner) => {
                        self.named_type(inner)
                    }
                    TypeSig::GenericInst { generic, .. } => self.named_type(generic),
                    other => Ok(format!("{:?}", other)),
                }
            }
            other => Err(MetadataError::InvalidMetadata(format!(
                "{} token does not name a type",
                other.name()
            ))),
        }
    }

    fn named_type(&self, token: Token) -> Result<String> {
        match token.table {
            TableId::TypeDef => self.type_name(token.row),
            TableId::TypeRef => self.type_ref_name(token.row),
            _ => Err(MetadataError::InvalidMetadata(
                "type specification nests another specification".to_string(),
            )),
        }
    }

    /// Whether a signature type is `System.Guid`
    pub fn is_guid(&self, ty: &TypeSig) -> Result<bool> {
        match ty {
            TypeSig::ValueType(token) => Ok(self.type_token_name(*token)? == "System.Guid"),
            _ => Ok(false),
        }
    }

    pub fn field_name(&self, row: u32) -> Result<&'a str> {
        self.strings.get(self.tables.field(row)?.name)
    }

    pub fn field_type(&self, row: u32) -> Result<TypeSig> {
        let field = self.tables.field(row)?;
        signature::parse_field_sig(self.blobs.get(field.signature)?)
    }

    pub fn method_name(&self, row: u32) -> Result<&'a str> {
        self.strings.get(self.tables.method_def(row)?.name)
    }

    pub fn property_name(&self, row: u32) -> Result<&'a str> {
        self.strings.get(self.tables.property(row)?.name)
    }

    /// Resolves the operand of `call`, `callvirt` or `newobj`
    pub fn resolve_method(&self, raw_token: u32) -> Result<MethodRef> {
        let token = Token::from_raw(raw_token).ok_or_else(|| {
            MetadataError::InvalidMetadata(format!("invalid method token {:#010x}", raw_token))
        })?;
        self.resolve_method_token(token, true)
    }

    fn resolve_method_token(&self, token: Token, follow_spec: bool) -> Result<MethodRef> {
        match token.table {
            TableId::MethodDef => {
                let method = self.tables.method_def(token.row)?;
                let declaring_type = match self.tables.method_owner(token.row)? {
                    Some(owner) => self.type_name(owner)?,
                    None => String::new(),
                };
                Ok(MethodRef {
                    declaring_type,
                    name: self.strings.get(method.name)?.to_string(),
                    signature: signature::parse_method_sig(self.blobs.get(method.signature)?)?,
                })
            }
            TableId::MemberRef => {
                let member = self.tables.member_ref(token.row)?;
                let declaring_type = match member.class.table {
                    TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec => {
                        self.type_token_name(member.class)?
                    }
                    _ => String::new(),
                };
                Ok(MethodRef {
                    declaring_type,
                    name: self.strings.get(member.name)?.to_string(),
                    signature: signature::parse_method_sig(self.blobs.get(member.signature)?)?,
                })
            }
            TableId::MethodSpec if follow_spec => {
                let target = self.tables.method_spec_target(token.row)?;
                self.resolve_method_token(target, false)
            }
            other => Err(MetadataError::InvalidMetadata(format!(
                "{} token is not a method",
                other.name()
            ))),
        }
    }

    /// The string an `ldstr` operand refers to
    pub fn user_string(&self, raw_token: u32) -> Result<String> {
        if (raw_token >> 24) as u8 != USER_STRING_TABLE {
            return Err(MetadataError::InvalidMetadata(format!(
                "ldstr operand {:#010x} is not a user string token",
                raw_token
            )));
        }
        self.user_strings.get(raw_token & 0x00FF_FFFF)
    }

    /// The IL body of a method, or `None` for abstract, extern and runtime methods
    pub fn method_body(&self, row: u32) -> Result<Option<MethodBody<'a>>> {
        let method = self.tables.method_def(row)?;
        if method.rva == 0 {
            return Ok(None);
        }
        let data = self.pe.tail_at_rva(method.rva)?;
        MethodBody::parse(data, method.rva).map(Some)
    }

    /// The static constructor of a type, if it declares one
    pub fn type_initializer(&self, type_row: u32) -> Result<Option<u32>> {
        for method_row in self.tables.type_methods(type_row)? {
            let method = self.tables.method_def(method_row)?;
            if method.is_static() && self.strings.get(method.name)? == ".cctor" {
                return Ok(Some(method_row));
            }
        }
        Ok(None)
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}
