//! Reads static member values straight from metadata and IL
//!
//! Literal fields come from the Constant table. Everything else is found by
//! symbolically running the type's static constructor and, for properties, the
//! getter on top of the resulting static state. No code from the image is
//! executed.

mod interpreter;
mod value;

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::metadata::signature::parse_method_sig;
use crate::metadata::{Metadata, MetadataError, TableId, Token};
use interpreter::{Flow, Interpreter, Slot};

pub use value::{parse_guid_text, StaticValue};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("cannot determine the value of {member} statically: {reason}")]
    Undetermined { member: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Initializer {
    Absent,
    Completed,
    Halted(String),
}

/// Static state of one type after its initializer has been followed
pub struct StaticEvaluator<'m, 'a> {
    metadata: &'m Metadata<'a>,
    type_row: u32,
    type_name: String,
    statics: HashMap<u32, Slot>,
    initializer: Initializer,
}

impl<'m, 'a> StaticEvaluator<'m, 'a> {
    pub fn new(metadata: &'m Metadata<'a>, type_row: u32) -> Result<Self, EvalError> {
        let type_name = metadata.type_name(type_row)?;
        let mut statics = HashMap::new();

        let body = match metadata.type_initializer(type_row)? {
            Some(method_row) => metadata.method_body(method_row)?,
            None => None,
        };
        let initializer = match body {
            None => Initializer::Absent,
            Some(body) => match Interpreter::new(metadata, type_row, true).run(&body, &mut statics) {
                Flow::Returned(_) => Initializer::Completed,
                Flow::Halted(reason) => {
                    debug!(
                        type_name = %type_name,
                        reason = %reason,
                        "Static constructor evaluation stopped early"
                    );
                    Initializer::Halted(reason)
                }
            },
        };
        debug!(
            type_name = %type_name,
            assigned = statics.len(),
            "Evaluated static constructor"
        );

        Ok(Self {
            metadata,
            type_row,
            type_name,
            statics,
            initializer,
        })
    }

    fn undetermined(&self, member: &str, reason: String) -> EvalError {
        EvalError::Undetermined {
            member: format!("{}.{}", self.type_name, member),
            reason,
        }
    }

    /// Value of a static field declared by this type
    pub fn field_value(&self, field_row: u32) -> Result<StaticValue, EvalError> {
        let field = self.metadata.tables.field(field_row)?;
        let name = self.metadata.field_name(field_row)?;

        if field.is_literal() {
            let constant = self
                .metadata
                .tables
                .constant_for(Token::new(TableId::Field, field_row))?
                .ok_or_else(|| self.undetermined(name, "literal field has no constant".into()))?;
            let blob = self.metadata.blobs.get(constant.value)?;
            return Ok(StaticValue::from_constant(constant.element_type, blob)?);
        }

        let ty = self.metadata.field_type(field_row)?;
        match self.statics.get(&field_row) {
            Some(Slot::Known(value)) => Ok(value.clone().coerce(&ty)),
            Some(Slot::Opaque(origin)) => Err(self.undetermined(
                name,
                format!("the static constructor assigns it the {}", origin),
            )),
            None => {
                if let Initializer::Halted(reason) = &self.initializer {
                    return Err(self.undetermined(
                        name,
                        format!(
                            "the static constructor cannot be followed past {} and has not assigned it yet",
                            reason
                        ),
                    ));
                }
                let is_guid = self.metadata.is_guid(&ty)?;
                StaticValue::default_for(&ty, is_guid).ok_or_else(|| {
                    self.undetermined(name, "its type has no printable default value".into())
                })
            }
        }
    }

    /// Value returned by a property's getter, run on top of the static state
    pub fn property_value(&self, property_row: u32) -> Result<StaticValue, EvalError> {
        let name = self.metadata.property_name(property_row)?;
        let getter = self
            .metadata
            .tables
            .property_getter(property_row)?
            .ok_or_else(|| self.undetermined(name, "the property has no getter".into()))?;
        let body = self
            .metadata
            .method_body(getter)?
            .ok_or_else(|| self.undetermined(name, "the getter has no IL body".into()))?;
        let method = self.metadata.tables.method_def(getter)?;
        let signature = parse_method_sig(self.metadata.blobs.get(method.signature)?)?;

        let mut statics = self.statics.clone();
        let defaults_visible = !matches!(self.initializer, Initializer::Halted(_));
        let interpreter = Interpreter::new(self.metadata, self.type_row, defaults_visible);

        match interpreter.run(&body, &mut statics) {
            Flow::Returned(Some(Slot::Known(value))) => Ok(value.coerce(&signature.ret)),
            Flow::Returned(Some(Slot::Opaque(origin))) => Err(self.undetermined(
                name,
                format!("the getter returns the {}", origin),
            )),
            Flow::Returned(None) => {
                Err(self.undetermined(name, "the getter returns no value".into()))
            }
            Flow::Halted(reason) => Err(self.undetermined(
                name,
                format!("the getter cannot be followed past {}", reason),
            )),
        }
    }
}
