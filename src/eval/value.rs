//! Values the evaluator can produce, and how they print

use std::fmt;

use uuid::Uuid;

use crate::metadata::heaps::decode_utf16;
use crate::metadata::signature::element;
use crate::metadata::{MetadataError, TypeSig};

/// A static member value, rendered the way the runtime's `ToString()` would
#[derive(Debug, Clone, PartialEq)]
pub enum StaticValue {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Guid(Uuid),
}

impl StaticValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StaticValue::Null)
    }

    /// Reads a literal from the Constant table: its element type and value blob
    pub fn from_constant(element_type: u8, blob: &[u8]) -> Result<Self, MetadataError> {
        let value = match element_type {
            element::BOOLEAN => StaticValue::Bool(fixed::<1>(blob, element_type)?[0] != 0),
            element::CHAR => {
                StaticValue::Char(utf16_unit(u16::from_le_bytes(fixed(blob, element_type)?)))
            }
            element::I1 => StaticValue::Int(i64::from(i8::from_le_bytes(fixed(blob, element_type)?))),
            element::U1 => StaticValue::UInt(u64::from(u8::from_le_bytes(fixed(blob, element_type)?))),
            element::I2 => {
                StaticValue::Int(i64::from(i16::from_le_bytes(fixed(blob, element_type)?)))
            }
            element::U2 => {
                StaticValue::UInt(u64::from(u16::from_le_bytes(fixed(blob, element_type)?)))
            }
            element::I4 => {
                StaticValue::Int(i64::from(i32::from_le_bytes(fixed(blob, element_type)?)))
            }
            element::U4 => {
                StaticValue::UInt(u64::from(u32::from_le_bytes(fixed(blob, element_type)?)))
            }
            element::I8 => StaticValue::Int(i64::from_le_bytes(fixed(blob, element_type)?)),
            element::U8 => StaticValue::UInt(u64::from_le_bytes(fixed(blob, element_type)?)),
            element::R4 => StaticValue::Float32(f32::from_le_bytes(fixed(blob, element_type)?)),
            element::R8 => StaticValue::Float64(f64::from_le_bytes(fixed(blob, element_type)?)),
            element::STRING => StaticValue::String(decode_utf16(blob).ok_or_else(|| {
                MetadataError::InvalidSignature("string constant is not valid UTF-16".to_string())
            })?),
            element::CLASS => StaticValue::Null,
            other => {
                return Err(MetadataError::InvalidSignature(format!(
                    "unsupported constant element type {:#04x}",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// The value of a zero-initialised static of type `ty`.
    ///
    /// `is_guid` says whether `ty` names `System.Guid`; other value types have
    /// no printable default.
    pub fn default_for(ty: &TypeSig, is_guid: bool) -> Option<Self> {
        let value = match ty {
            TypeSig::Boolean => StaticValue::Bool(false),
            TypeSig::Char => StaticValue::Char('\0'),
            TypeSig::I1 | TypeSig::I2 | TypeSig::I4 | TypeSig::I8 | TypeSig::IntPtr => {
                StaticValue::Int(0)
            }
            TypeSig::U1 | TypeSig::U2 | TypeSig::U4 | TypeSig::U8 | TypeSig::UIntPtr => {
                StaticValue::UInt(0)
            }
            TypeSig::R4 => StaticValue::Float32(0.0),
            TypeSig::R8 => StaticValue::Float64(0.0),
            TypeSig::ValueType(_) if is_guid => StaticValue::Guid(Uuid::nil()),
            other if other.is_reference() => StaticValue::Null,
            _ => return None,
        };
        Some(value)
    }

    /// Narrows an evaluation-stack value to the declared type of its destination
    pub fn coerce(self, ty: &TypeSig) -> Self {
        match (ty, self) {
            (TypeSig::Boolean, StaticValue::Int(v)) => StaticValue::Bool(v != 0),
            (TypeSig::Char, StaticValue::Int(v)) => StaticValue::Char(utf16_unit(v as u16)),
            (TypeSig::I1, StaticValue::Int(v)) => StaticValue::Int(i64::from(v as i8)),
            (TypeSig::I2, StaticValue::Int(v)) => StaticValue::Int(i64::from(v as i16)),
            (TypeSig::I4, StaticValue::Int(v)) => StaticValue::Int(i64::from(v as i32)),
            (TypeSig::U1, StaticValue::Int(v)) => StaticValue::UInt(u64::from(v as u8)),
            (TypeSig::U2, StaticValue::Int(v)) => StaticValue::UInt(u64::from(v as u16)),
            (TypeSig::U4, StaticValue::Int(v)) => StaticValue::UInt(u64::from(v as u32)),
            (TypeSig::U8, StaticValue::Int(v)) => StaticValue::UInt(v as u64),
            (TypeSig::R4, StaticValue::Float64(v)) => StaticValue::Float32(v as f32),
            (TypeSig::R8, StaticValue::Float32(v)) => StaticValue::Float64(f64::from(v)),
            (_, value) => value,
        }
    }
}

fn fixed<const N: usize>(blob: &[u8], element_type: u8) -> Result<[u8; N], MetadataError> {
    blob.get(..N)
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or_else(|| {
            MetadataError::InvalidSignature(format!(
                "constant of type {:#04x} needs {} bytes, blob has {}",
                element_type,
                N,
                blob.len()
            ))
        })
}

fn utf16_unit(unit: u16) -> char {
    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

impl fmt::Display for StaticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticValue::Null => write!(f, "<null>"),
            StaticValue::Bool(true) => write!(f, "True"),
            StaticValue::Bool(false) => write!(f, "False"),
            StaticValue::Char(c) => write!(f, "{}", c),
            StaticValue::Int(v) => write!(f, "{}", v),
            StaticValue::UInt(v) => write!(f, "{}", v),
            StaticValue::Float32(v) => write!(f, "{}", v),
            StaticValue::Float64(v) => write!(f, "{}", v),
            StaticValue::String(s) => write!(f, "{}", s),
            StaticValue::Guid(g) => write!(f, "{}", g.hyphenated()),
        }
    }
}

/// Parses the string forms `System.Guid(string)` and `Guid.Parse` accept:
/// 32 digits, hyphenated, or hyphenated inside braces or parentheses
pub fn parse_guid_text(text: &str) -> Option<Uuid> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .unwrap_or(trimmed);
    if inner.len() != 32 && inner.len() != 36 {
        return None;
    }
    Uuid::try_parse(inner).ok()
}
