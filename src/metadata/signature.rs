//! Blob signatures for fields, properties and methods (ECMA-335 II.23.2)

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};
use super::tables::{CodedIndex, Token};

pub mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1B;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

const FIELD: u8 = 0x06;
const PROPERTY: u8 = 0x08;
const HAS_THIS: u8 = 0x20;
const GENERIC: u8 = 0x10;
const CALLING_CONVENTION_MASK: u8 = 0x0F;
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    IntPtr,
    UIntPtr,
    TypedByRef,
    ValueType(Token),
    Class(Token),
    GenericInst {
        is_value_type: bool,
        generic: Token,
        args: Vec<TypeSig>,
    },
    SzArray(Box<TypeSig>),
    Array(Box<TypeSig>),
    Ptr(Box<TypeSig>),
    ByRef(Box<TypeSig>),
    Var(u32),
    MVar(u32),
}

impl TypeSig {
    /// Whether a null reference is a legal value of this type
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeSig::String
                | TypeSig::Object
                | TypeSig::Class(_)
                | TypeSig::SzArray(_)
                | TypeSig::Array(_)
                | TypeSig::GenericInst {
                    is_value_type: false,
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub has_this: bool,
    pub generic_params: u32,
    pub ret: TypeSig,
    pub params: Vec<TypeSig>,
}

impl MethodSig {
    pub fn returns_value(&self) -> bool {
        self.ret != TypeSig::Void
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySig {
    pub has_this: bool,
    pub ty: TypeSig,
    pub params: Vec<TypeSig>,
}

pub fn parse_field_sig(blob: &[u8]) -> Result<TypeSig> {
    let mut reader = ByteReader::new(blob);
    let lead = reader.u8("field signature")?;
    if lead & CALLING_CONVENTION_MASK != FIELD {
        return Err(MetadataError::InvalidSignature(format!(
            "expected FIELD signature, found {:#04x}",
            lead
        )));
    }
    parse_type(&mut reader)
}

pub fn parse_property_sig(blob: &[u8]) -> Result<PropertySig> {
    let mut reader = ByteReader::new(blob);
    let lead = reader.u8("property signature")?;
    if lead & CALLING_CONVENTION_MASK != PROPERTY {
        return Err(MetadataError::InvalidSignature(format!(
            "expected PROPERTY signature, found {:#04x}",
            lead
        )));
    }
    let count = reader.compressed_u32("property parameter count")?;
    let ty = parse_type(&mut reader)?;
    let params = (0..count)
        .map(|_| parse_type(&mut reader))
        .collect::<Result<Vec<_>>>()?;
    Ok(PropertySig {
        has_this: lead & HAS_THIS != 0,
        ty,
        params,
    })
}

pub fn parse_method_sig(blob: &[u8]) -> Result<MethodSig> {
    let mut reader = ByteReader::new(blob);
    let lead = reader.u8("method signature")?;
    let generic_params = if lead & GENERIC != 0 {
        reader.compressed_u32("generic parameter count")?
    } else {
        0
    };
    let count = reader.compressed_u32("method parameter count")?;
    let ret = parse_type(&mut reader)?;
    let mut params = Vec::with_capacity(count as usize);
    while params.len() < count as usize {
        if peek(&reader) == Some(element::SENTINEL) {
            reader.skip(1, "sentinel")?;
            continue;
        }
        params.push(parse_type(&mut reader)?);
    }
    Ok(MethodSig {
        has_this: lead & HAS_THIS != 0,
        generic_params,
        ret,
        params,
    })
}

fn peek(reader: &ByteReader<'_>) -> Option<u8> {
    reader.clone().u8("peek").ok()
}

fn type_token(reader: &mut ByteReader<'_>) -> Result<Token> {
    let encoded = reader.compressed_u32("TypeDefOrRef")?;
    CodedIndex::TypeDefOrRef.decode(encoded)
}

fn skip_custom_mods(reader: &mut ByteReader<'_>) -> Result<()> {
    while matches!(peek(reader), Some(element::CMOD_REQD) | Some(element::CMOD_OPT)) {
        reader.skip(1, "custom modifier")?;
        type_token(reader)?;
    }
    Ok(())
}

pub fn parse_type(reader: &mut ByteReader<'_>) -> Result<TypeSig> {
    parse_nested(reader, 0)
}

fn parse_nested(reader: &mut ByteReader<'_>, depth: usize) -> Result<TypeSig> {
    if depth > MAX_NESTING {
        return Err(MetadataError::InvalidSignature(
            "type signature nests too deeply".to_string(),
        ));
    }
    let inner = |reader: &mut ByteReader<'_>| parse_nested(reader, depth + 1);
    skip_custom_mods(reader)?;
    let tag = reader.u8("element type")?;
    let ty = match tag {
        element::VOID => TypeSig::Void,
        element::BOOLEAN => TypeSig::Boolean,
        element::CHAR => TypeSig::Char,
        element::I1 => TypeSig::I1,
        element::U1 => TypeSig::U1,
        element::I2 => TypeSig::I2,
        element::U2 => TypeSig::U2,
        element::I4 => TypeSig::I4,
        element::U4 => TypeSig::U4,
        element::I8 => TypeSig::I8,
        element::U8 => TypeSig::U8,
        element::R4 => TypeSig::R4,
        element::R8 => TypeSig::R8,
        element::STRING => TypeSig::String,
        element::OBJECT => TypeSig::Object,
        element::I => TypeSig::IntPtr,
        element::U => TypeSig::UIntPtr,
        element::TYPEDBYREF => TypeSig::TypedByRef,
        element::VALUETYPE => TypeSig::ValueType(type_token(reader)?),
        element::CLASS => TypeSig::Class(type_token(reader)?),
        element::VAR => TypeSig::Var(reader.compressed_u32("generic parameter")?),
        element::MVAR => TypeSig::MVar(reader.compressed_u32("generic parameter")?),
        element::PTR => TypeSig::Ptr(Box::new(inner(reader)?)),
        element::BYREF => TypeSig::ByRef(Box::new(inner(reader)?)),
        element::PINNED => inner(reader)?,
        element::SZARRAY => TypeSig::SzArray(Box::new(inner(reader)?)),
        element::ARRAY => {
            let element_type = inner(reader)?;
            let _rank = reader.compressed_u32("array rank")?;
            let sizes = reader.compressed_u32("array size count")?;
            for _ in 0..sizes {
                reader.compressed_u32("array size")?;
            }
            let bounds = reader.compressed_u32("array bound count")?;
            for _ in 0..bounds {
                reader.compressed_u32("array lower bound")?;
            }
            TypeSig::Array(Box::new(element_type))
        }
        element::GENERICINST => {
            let kind = reader.u8("generic instantiation kind")?;
            let generic = type_token(reader)?;
            let count = reader.compressed_u32("generic argument count")?;
            let args = (0..count)
                .map(|_| inner(reader))
                .collect::<Result<Vec<_>>>()?;
            TypeSig::GenericInst {
                is_value_type: kind == element::VALUETYPE,
                generic,
                args,
            }
        }
        element::FNPTR => {
            return Err(MetadataError::InvalidSignature(
                "function pointer types are not supported".to_string(),
            ))
        }
        other => {
            return Err(MetadataError::InvalidSignature(format!(
                "unknown element type {:#04x}",
                other
            )))
        }
    };
    Ok(ty)
}
