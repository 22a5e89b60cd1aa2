//! Block terminator IR.

use crate::types::{BlockId, Value};

/// Block terminator - controls where execution goes next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump to a block.
    Jump(BlockId),
    /// Two-way conditional branch on an `i1`.
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Computed control transfer whose destination was not resolved.
    IndirectJump { target: Value },
    Return(Option<Value>),
    Unreachable,
}

impl Default for Terminator {
    fn default() -> Self {
        Self::Unreachable
    }
}

impl Terminator {
    /// Successor blocks in edge order (a branch with equal arms lists the block twice).
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Jump(target) => vec![*target],
            Self::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Self::IndirectJump { .. } | Self::Return(_) | Self::Unreachable => Vec::new(),
        }
    }

    pub fn for_each_operand(&self, mut f: impl FnMut(Value)) {
        match self {
            Self::Branch { cond, .. } => f(*cond),
            Self::IndirectJump { target } => f(*target),
            Self::Return(Some(value)) => f(*value),
            Self::Jump(_) | Self::Return(None) | Self::Unreachable => {}
        }
    }

    pub fn map_operands(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Self::Branch { cond, .. } => f(cond),
            Self::IndirectJump { target } => f(target),
            Self::Return(Some(value)) => f(value),
            Self::Jump(_) | Self::Return(None) | Self::Unreachable => {}
        }
    }

    /// Redirect every edge to `old` towards `new`.
    pub fn replace_successor(&mut self, old: BlockId, new: BlockId) {
        match self {
            Self::Jump(target) if *target == old => *target = new,
            Self::Branch {
                then_block,
                else_block,
                ..
            } => {
                if *then_block == old {
                    *then_block = new;
                }
                if *else_block == old {
                    *else_block = new;
                }
            }
            _ => {}
        }
    }

    /// Check if control leaves the function here.
    pub const fn is_exit(&self) -> bool {
        matches!(
            self,
            Self::IndirectJump { .. } | Self::Return(_) | Self::Unreachable
        )
    }
}
