//! Symbolic interpreter for the straight-line IL of initializers and getters
//!
//! Values are tracked only as far as they can be known without running foreign
//! code. Calls the interpreter does not model leave an opaque value of the right
//! stack shape; anything it cannot follow (branches, exceptions, unknown
//! opcodes) stops the run.

use std::collections::HashMap;

use uuid::Uuid;

use super::value::{parse_guid_text, StaticValue};
use crate::metadata::il::op;
use crate::metadata::{Instruction, Metadata, MethodBody, MethodRef, Operand, TableId, Token, TypeSig};

const GUID_TYPE: &str = "System.Guid";

/// One evaluation-stack entry, local, or static field
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Known(StaticValue),
    /// Produced by code the interpreter does not model; holds a description
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Returned(Option<Slot>),
    Halted(String),
}

enum Step {
    Continue,
    Return(Option<Slot>),
}

#[derive(Debug, Default)]
struct Frame {
    stack: Vec<Slot>,
    locals: HashMap<u16, Slot>,
}

impl Frame {
    fn push(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    fn push_value(&mut self, value: StaticValue) {
        self.stack.push(Slot::Known(value));
    }

    fn pop(&mut self) -> Result<Slot, String> {
        self.stack
            .pop()
            .ok_or_else(|| "evaluation stack underflow".to_string())
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Slot>, String> {
        if self.stack.len() < count {
            return Err("evaluation stack underflow".to_string());
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn peek(&self) -> Result<&Slot, String> {
        self.stack
            .last()
            .ok_or_else(|| "evaluation stack underflow".to_string())
    }

    fn load_local(&mut self, index: u16) {
        let slot = self
            .locals
            .get(&index)
            .cloned()
            .unwrap_or_else(|| Slot::Opaque(format!("uninitialised local {}", index)));
        self.stack.push(slot);
    }

    fn store_local(&mut self, index: u16) -> Result<(), String> {
        let slot = self.pop()?;
        self.locals.insert(index, slot);
        Ok(())
    }
}

pub(crate) struct Interpreter<'m, 'a> {
    metadata: &'m Metadata<'a>,
    owner: u32,
    /// Whether unassigned statics of `owner` still hold their zero value
    defaults_visible: bool,
}

impl<'m, 'a> Interpreter<'m, 'a> {
    pub(crate) fn new(metadata: &'m Metadata<'a>, owner: u32, defaults_visible: bool) -> Self {
        Self {
            metadata,
            owner,
            defaults_visible,
        }
    }

    /// Runs `body` against `statics` (keyed by Field row) until `ret` or a halt
    pub(crate) fn run(&self, body: &MethodBody<'a>, statics: &mut HashMap<u32, Slot>) -> Flow {
        let mut frame = Frame::default();
        for decoded in body.instructions() {
            let instruction = match decoded {
                Ok(instruction) => instruction,
                Err(err) => return Flow::Halted(err.to_string()),
            };
            match self.step(&instruction, &mut frame, statics) {
                Ok(Step::Continue) => {}
                Ok(Step::Return(value)) => return Flow::Returned(value),
                Err(reason) => {
                    return Flow::Halted(format!(
                        "{} at IL offset {:#x}",
                        reason, instruction.offset
                    ))
                }
            }
        }
        Flow::Halted("the end of the method body without ret".to_string())
    }

    fn step(
        &self,
        instruction: &Instruction,
        frame: &mut Frame,
        statics: &mut HashMap<u32, Slot>,
    ) -> Result<Step, String> {
        match (instruction.opcode, &instruction.operand) {
            (op::NOP, _) => {}
            (op::LDNULL, _) => frame.push_value(StaticValue::Null),
            (code @ op::LDC_I4_M1..=op::LDC_I4_8, _) => {
                frame.push_value(StaticValue::Int(i64::from(code) - i64::from(op::LDC_I4_0)))
            }
            (op::LDC_I4_S, Operand::I8(v)) => frame.push_value(StaticValue::Int(i64::from(*v))),
            (op::LDC_I4, Operand::I32(v)) => frame.push_value(StaticValue::Int(i64::from(*v))),
            (op::LDC_I8, Operand::I64(v)) => frame.push_value(StaticValue::Int(*v)),
            (op::LDC_R4, Operand::R4(v)) => frame.push_value(StaticValue::Float32(*v)),
            (op::LDC_R8, Operand::R8(v)) => frame.push_value(StaticValue::Float64(*v)),
            (op::LDSTR, Operand::Token(token)) => {
                let text = self
                    .metadata
                    .user_string(*token)
                    .map_err(|err| err.to_string())?;
                frame.push_value(StaticValue::String(text));
            }
            (op::DUP, _) => {
                let top = frame.peek()?.clone();
                frame.push(top);
            }
            (op::POP, _) => {
                frame.pop()?;
            }
            (code @ op::LDLOC_0..=op::LDLOC_3, _) => frame.load_local(code - op::LDLOC_0),
            (code @ op::STLOC_0..=op::STLOC_3, _) => frame.store_local(code - op::STLOC_0)?,
            (op::LDLOC_S, Operand::U8(index)) => frame.load_local(u16::from(*index)),
            (op::STLOC_S, Operand::U8(index)) => frame.store_local(u16::from(*index))?,
            (op::LDLOC, Operand::U16(index)) => frame.load_local(*index),
            (op::STLOC, Operand::U16(index)) => frame.store_local(*index)?,
            (
                op::CONV_I1 | op::CONV_I2 | op::CONV_I4 | op::CONV_I8 | op::CONV_U1 | op::CONV_U2
                | op::CONV_U4 | op::CONV_U8 | op::BOX,
                _,
            ) => {
                // Destinations narrow the value to their declared type
                frame.peek()?;
            }
            (op::STSFLD, Operand::Token(token)) => {
                let value = frame.pop()?;
                if let Some(row) = local_field(*token) {
                    statics.insert(row, value);
                }
            }
            (op::LDSFLD, Operand::Token(token)) => {
                let slot = self.load_static(*token, statics);
                frame.push(slot);
            }
            (op::NEWOBJ, Operand::Token(token)) => self.new_object(*token, frame)?,
            (op::CALL | op::CALLVIRT, Operand::Token(token)) => self.call(*token, frame)?,
            (op::RET, _) => return Ok(Step::Return(frame.stack.pop())),
            _ if instruction.is_branch() => return Err("a branch".to_string()),
            (code, _) => return Err(format!("unsupported instruction {:#x}", code)),
        }
        Ok(Step::Continue)
    }

    fn load_static(&self, token: u32, statics: &HashMap<u32, Slot>) -> Slot {
        let Some(row) = local_field(token) else {
            return Slot::Opaque("value of a field in another assembly".to_string());
        };
        if let Some(slot) = statics.get(&row) {
            return slot.clone();
        }
        match self.field_fallback(row) {
            Ok(slot) => slot,
            Err(err) => Slot::Opaque(format!("unreadable field {}: {}", row, err)),
        }
    }

    /// Value of a static field nothing has assigned in this run
    fn field_fallback(&self, row: u32) -> crate::metadata::Result<Slot> {
        let field = self.metadata.tables.field(row)?;
        let name = self.metadata.field_name(row)?;
        if field.is_literal() {
            if let Some(constant) = self
                .metadata
                .tables
                .constant_for(Token::new(TableId::Field, row))?
            {
                let blob = self.metadata.blobs.get(constant.value)?;
                return StaticValue::from_constant(constant.element_type, blob).map(Slot::Known);
            }
        }
        if self.metadata.tables.field_owner(row)? != Some(self.owner) {
            return Ok(Slot::Opaque(format!("value of static field {} of another type", name)));
        }
        if !self.defaults_visible {
            return Ok(Slot::Opaque(format!("unassigned static field {}", name)));
        }
        let ty = self.metadata.field_type(row)?;
        let is_guid = self.metadata.is_guid(&ty)?;
        Ok(match StaticValue::default_for(&ty, is_guid) {
            Some(value) => Slot::Known(value),
            None => Slot::Opaque(format!("default value of field {}", name)),
        })
    }

    fn resolve(&self, token: u32) -> Result<MethodRef, String> {
        self.metadata
            .resolve_method(token)
            .map_err(|err| err.to_string())
    }

    fn new_object(&self, token: u32, frame: &mut Frame) -> Result<(), String> {
        let method = self.resolve(token)?;
        let args = frame.pop_n(method.signature.params.len())?;
        if method.declaring_type == GUID_TYPE && method.name == ".ctor" {
            if let Some(result) = construct_guid(&method.signature.params, &args) {
                frame.push(result?);
                return Ok(());
            }
        }
        frame.push(Slot::Opaque(format!(
            "object built by {}::{}",
            method.declaring_type, method.name
        )));
        Ok(())
    }

    fn call(&self, token: u32, frame: &mut Frame) -> Result<(), String> {
        let method = self.resolve(token)?;
        let args = frame.pop_n(method.signature.params.len())?;
        if method.signature.has_this {
            frame.pop()?;
        }
        if method.declaring_type == GUID_TYPE
            && method.name == "Parse"
            && !method.signature.has_this
        {
            if let Some(result) = construct_guid(&method.signature.params, &args) {
                frame.push(result?);
                return Ok(());
            }
        }
        if method.signature.returns_value() {
            frame.push(Slot::Opaque(format!(
                "result of {}::{}",
                method.declaring_type, method.name
            )));
        }
        Ok(())
    }
}

/// The Field row an `ldsfld`/`stsfld` operand names, if it is defined here
fn local_field(token: u32) -> Option<u32> {
    Token::from_raw(token)
        .filter(|t| t.table == TableId::Field && !t.is_null())
        .map(|t| t.row)
}

/// Builds a Guid from a `System.Guid` constructor or `Parse` overload.
///
/// `None` means the overload is not one of the recognised shapes; `Some(Err)`
/// means the runtime would throw for these arguments.
fn construct_guid(params: &[TypeSig], args: &[Slot]) -> Option<Result<Slot, String>> {
    if params == [TypeSig::String] {
        let result = match &args[0] {
            Slot::Known(StaticValue::String(text)) => match parse_guid_text(text) {
                Some(guid) => Ok(Slot::Known(StaticValue::Guid(guid))),
                None => Err(format!("a Guid built from malformed text {:?}", text)),
            },
            Slot::Known(StaticValue::Null) => Err("a Guid built from a null string".to_string()),
            Slot::Known(other) => Err(format!("a Guid built from non-string value {}", other)),
            Slot::Opaque(origin) => Ok(Slot::Opaque(format!("Guid parsed from the {}", origin))),
        };
        return Some(result);
    }

    if !is_guid_parts_signature(params) {
        return None;
    }
    let mut parts = [0i64; 11];
    for (part, arg) in parts.iter_mut().zip(args) {
        match arg {
            Slot::Known(StaticValue::Int(v)) => *part = *v,
            Slot::Known(StaticValue::UInt(v)) => *part = *v as i64,
            Slot::Known(other) => {
                return Some(Err(format!("a Guid built from non-integer value {}", other)))
            }
            Slot::Opaque(origin) => {
                return Some(Ok(Slot::Opaque(format!("Guid built from the {}", origin))))
            }
        }
    }
    let tail: [u8; 8] = [
        parts[3] as u8,
        parts[4] as u8,
        parts[5] as u8,
        parts[6] as u8,
        parts[7] as u8,
        parts[8] as u8,
        parts[9] as u8,
        parts[10] as u8,
    ];
    let guid = Uuid::from_fields(parts[0] as u32, parts[1] as u16, parts[2] as u16, &tail);
    Some(Ok(Slot::Known(StaticValue::Guid(guid))))
}

/// `(int a, short b, short c, byte d..k)` or its unsigned twin
fn is_guid_parts_signature(params: &[TypeSig]) -> bool {
    params.len() == 11
        && matches!(params[0], TypeSig::I4 | TypeSig::U4)
        && matches!(params[1], TypeSig::I2 | TypeSig::U2)
        && matches!(params[2], TypeSig::I2 | TypeSig::U2)
        && params[3..].iter().all(|p| *p == TypeSig::U1)
}
