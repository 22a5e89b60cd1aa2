//! The seam between machine semantics and control flow recovery.

use relift_ir::{BlockId, Function, Param, Ty, Value};

use crate::Result;

/// How a lifted block leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockExit {
    /// Unconditional transfer to a known address.
    Jump(u64),
    /// Conditional transfer between two known addresses.
    Branch {
        cond: Value,
        taken: u64,
        fallthrough: u64,
    },
    /// Transfer to a computed destination, resolved by the session.
    Indirect(Value),
    Return(Option<Value>),
}

/// Shape of every function a lifter produces.
///
/// `stack` and `memory` are parameter indices of the pseudo-stack and
/// pseudo-memory pointers that lifted code reads and writes through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: Option<Ty>,
    pub stack: u32,
    pub memory: u32,
}

impl Default for Signature {
    /// `(stack: ptr, memory: ptr) -> i64`
    fn default() -> Self {
        Self {
            params: vec![Param::new("stack", Ty::Ptr), Param::new("memory", Ty::Ptr)],
            ret: Some(Ty::I64),
            stack: 0,
            memory: 1,
        }
    }
}

/// Instruction semantics for one architecture.
///
/// The session decides which addresses get lifted and in what order; the
/// lifter only fills in one block at a time and reports how it exits.
pub trait BlockLifter {
    fn signature(&self) -> Signature {
        Signature::default()
    }

    /// Emit the instructions starting at `address` into `block` and return
    /// the block's exit. The terminator is set by the session.
    fn lift_block(
        &mut self,
        func: &mut Function,
        block: BlockId,
        address: u64,
    ) -> Result<BlockExit>;
}
