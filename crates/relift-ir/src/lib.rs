//! Intermediate representation for the relift binary lifter.
//!
//! This crate provides a small SSA IR with no knowledge of any particular
//! instruction set. Machine semantics are lifted into it by the driver, the
//! branch resolver queries it, and the optimizer rewrites it in place.

mod builder;
mod function;
mod instr;
mod module;
mod print;
mod terminator;
mod types;

pub use builder::*;
pub use function::*;
pub use instr::*;
pub use module::*;
pub use terminator::*;
pub use types::*;
