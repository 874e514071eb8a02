//! Reader for managed PE images and their ECMA-335 metadata
//!
//! Every read is bounds-checked against the image; malformed input surfaces as
//! [`MetadataError`] rather than a panic.

mod assembly;
pub mod cursor;
mod error;
pub mod heaps;
pub mod il;
mod image;
pub mod pe;
pub mod rows;
pub mod signature;
pub mod tables;

pub use assembly::Assembly;
pub use error::{MetadataError, Result};
pub use il::{Instruction, MethodBody, Operand};
pub use image::{Metadata, MethodRef, Streams};
pub use signature::{MethodSig, TypeSig};
pub use tables::{CodedIndex, TableId, Tables, Token};
