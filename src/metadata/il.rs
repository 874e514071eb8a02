//! Method bodies and CIL instruction decoding (ECMA-335 II.25.4, III)

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};

const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u8 = 0x3;
const FORMAT_MASK: u8 = 0x3;
const TWO_BYTE_PREFIX: u8 = 0xFE;

/// Opcodes the static evaluator interprets
pub mod op {
    pub const NOP: u16 = 0x00;
    pub const LDARG_0: u16 = 0x02;
    pub const LDARG_3: u16 = 0x05;
    pub const LDLOC_0: u16 = 0x06;
    pub const LDLOC_3: u16 = 0x09;
    pub const STLOC_0: u16 = 0x0A;
    pub const STLOC_3: u16 = 0x0D;
    pub const LDLOC_S: u16 = 0x11;
    pub const STLOC_S: u16 = 0x13;
    pub const LDNULL: u16 = 0x14;
    pub const LDC_I4_M1: u16 = 0x15;
    pub const LDC_I4_0: u16 = 0x16;
    pub const LDC_I4_8: u16 = 0x1E;
    pub const LDC_I4_S: u16 = 0x1F;
    pub const LDC_I4: u16 = 0x20;
    pub const LDC_I8: u16 = 0x21;
    pub const LDC_R4: u16 = 0x22;
    pub const LDC_R8: u16 = 0x23;
    pub const DUP: u16 = 0x25;
    pub const POP: u16 = 0x26;
    pub const CALL: u16 = 0x28;
    pub const RET: u16 = 0x2A;
    pub const CONV_I1: u16 = 0x67;
    pub const CONV_I2: u16 = 0x68;
    pub const CONV_I4: u16 = 0x69;
    pub const CONV_I8: u16 = 0x6A;
    pub const CONV_U4: u16 = 0x6D;
    pub const CONV_U8: u16 = 0x6E;
    pub const CALLVIRT: u16 = 0x6F;
    pub const LDSTR: u16 = 0x72;
    pub const NEWOBJ: u16 = 0x73;
    pub const LDSFLD: u16 = 0x7E;
    pub const STSFLD: u16 = 0x80;
    pub const BOX: u16 = 0x8C;
    pub const CONV_U2: u16 = 0xD1;
    pub const CONV_U1: u16 = 0xD2;
    pub const LDLOC: u16 = 0xFE0C;
    pub const STLOC: u16 = 0xFE0E;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodBody<'a> {
    pub max_stack: u16,
    pub local_var_sig: u32,
    pub code: &'a [u8],
}

impl<'a> MethodBody<'a> {
    /// Parses a method header; `data` starts at the body's RVA
    pub fn parse(data: &'a [u8], rva: u32) -> Result<Self> {
        let invalid = |reason: &str| MetadataError::InvalidMethodBody {
            rva,
            reason: reason.to_string(),
        };

        let mut reader = ByteReader::new(data);
        let first = reader.u8("method header").map_err(|_| invalid("empty"))?;

        match first & FORMAT_MASK {
            TINY_FORMAT => {
                let size = (first >> 2) as usize;
                let code = reader
                    .bytes(size, "method code")
                    .map_err(|_| invalid("code runs past end of image"))?;
                Ok(Self {
                    max_stack: 8,
                    local_var_sig: 0,
                    code,
                })
            }
            FAT_FORMAT => {
                let mut header = ByteReader::new(data);
                let flags_and_size = header
                    .u16("fat header flags")
                    .map_err(|_| invalid("truncated fat header"))?;
                let header_size = usize::from(flags_and_size >> 12) * 4;
                let max_stack = header.u16("MaxStack").map_err(|_| invalid("truncated fat header"))?;
                let code_size = header.u32("CodeSize").map_err(|_| invalid("truncated fat header"))?;
                let local_var_sig = header
                    .u32("LocalVarSigTok")
                    .map_err(|_| invalid("truncated fat header"))?;
                if header_size < 12 {
                    return Err(invalid("fat header size below 12 bytes"));
                }
                let mut body = ByteReader::at(data, header_size)
                    .map_err(|_| invalid("truncated fat header"))?;
                let code = body
                    .bytes(code_size as usize, "method code")
                    .map_err(|_| invalid("code runs past end of image"))?;
                Ok(Self {
                    max_stack,
                    local_var_sig,
                    code,
                })
            }
            _ => Err(invalid("unknown header format")),
        }
    }

    pub fn instructions(&self) -> Instructions<'a> {
        Instructions {
            reader: ByteReader::new(self.code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    I8(i8),
    U8(u8),
    U16(u16),
    I32(i32),
    I64(i64),
    R4(f32),
    R8(f64),
    Token(u32),
    Branch(i32),
    Switch(Vec<i32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u16,
    pub operand: Operand,
}

impl Instruction {
    pub fn token(&self) -> Option<u32> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.operand, Operand::Branch(_) | Operand::Switch(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandKind {
    None,
    I8,
    U8,
    U16,
    I32,
    I64,
    R4,
    R8,
    Token,
    ShortBranch,
    Branch,
    Switch,
}

fn operand_kind(opcode: u16) -> Option<OperandKind> {
    use OperandKind::*;
    let kind = match opcode {
        0x00..=0x0D => None,
        0x0E..=0x13 => U8,
        0x14..=0x1E => None,
        0x1F => I8,
        0x20 => I32,
        0x21 => I64,
        0x22 => R4,
        0x23 => R8,
        0x25 | 0x26 => None,
        0x27..=0x29 => Token,
        0x2A => None,
        0x2B..=0x37 => ShortBranch,
        0x38..=0x44 => Branch,
        0x45 => Switch,
        0x46..=0x6E => None,
        0x6F..=0x75 => Token,
        0x76 => None,
        0x79 => Token,
        0x7A => None,
        0x7B..=0x81 => Token,
        0x82..=0x8B => None,
        0x8C | 0x8D => Token,
        0x8E => None,
        0x8F => Token,
        0x90..=0xA2 => None,
        0xA3..=0xA5 => Token,
        0xB3..=0xBA => None,
        0xC2 => Token,
        0xC3 => None,
        0xC6 => Token,
        0xD0 => Token,
        0xD1..=0xDC => None,
        0xDD => Branch,
        0xDE => ShortBranch,
        0xDF | 0xE0 => None,
        0xFE00..=0xFE05 => None,
        0xFE06 | 0xFE07 => Token,
        0xFE09..=0xFE0E => U16,
        0xFE0F | 0xFE11 => None,
        0xFE12 => U8,
        0xFE13 | 0xFE14 => None,
        0xFE15 | 0xFE16 => Token,
        0xFE17 | 0xFE18 => None,
        0xFE19 => U8,
        0xFE1A => None,
        0xFE1C => Token,
        0xFE1D | 0xFE1E => None,
        _ => return Option::None,
    };
    Some(kind)
}

/// Iterator over the instructions of a method body
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    reader: ByteReader<'a>,
}

impl<'a> Instructions<'a> {
    fn decode(&mut self) -> Result<Instruction> {
        let offset = self.reader.position();
        let first = self.reader.u8("opcode")?;
        let opcode = if first == TWO_BYTE_PREFIX {
            0xFE00 | u16::from(self.reader.u8("opcode")?)
        } else {
            u16::from(first)
        };

        let kind = operand_kind(opcode).ok_or(MetadataError::UnknownOpcode { opcode, offset })?;
        let operand = match kind {
            OperandKind::None => Operand::None,
            OperandKind::I8 => Operand::I8(self.reader.i8("int8 operand")?),
            OperandKind::U8 => Operand::U8(self.reader.u8("uint8 operand")?),
            OperandKind::U16 => Operand::U16(self.reader.u16("uint16 operand")?),
            OperandKind::I32 => Operand::I32(self.reader.i32("int32 operand")?),
            OperandKind::I64 => Operand::I64(self.reader.i64("int64 operand")?),
            OperandKind::R4 => Operand::R4(f32::from_bits(self.reader.u32("float32 operand")?)),
            OperandKind::R8 => Operand::R8(f64::from_bits(self.reader.u64("float64 operand")?)),
            OperandKind::Token => Operand::Token(self.reader.u32("token operand")?),
            OperandKind::ShortBranch => {
                Operand::Branch(i32::from(self.reader.i8("branch operand")?))
            }
            OperandKind::Branch => Operand::Branch(self.reader.i32("branch operand")?),
            OperandKind::Switch => {
                let count = self.reader.u32("switch count")?;
                let targets = (0..count)
                    .map(|_| self.reader.i32("switch target"))
                    .collect::<Result<Vec<_>>>()?;
                Operand::Switch(targets)
            }
        };

        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        let decoded = self.decode();
        if decoded.is_err() {
            // Stop after the first error; the rest of the stream is unaligned
            self.reader.seek(self.reader.position() + self.reader.remaining()).ok();
        }
        Some(decoded)
    }
}
