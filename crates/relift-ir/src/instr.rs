//! Instruction IR.

use crate::types::{BlockId, FuncId, Ty, Value, sign_extend};

/// Two-operand integer operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::Xor
        )
    }

    /// Evaluate on constants of type `ty`. Returns `None` for division by zero
    /// and over-wide shifts, which have no defined result.
    pub const fn fold(self, lhs: u64, rhs: u64, ty: Ty) -> Option<u64> {
        let mask = ty.mask();
        let (a, b) = (lhs & mask, rhs & mask);
        let value = match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::UDiv => match a.checked_div(b) {
                Some(v) => v,
                None => return None,
            },
            Self::URem => match a.checked_rem(b) {
                Some(v) => v,
                None => return None,
            },
            #[allow(clippy::cast_sign_loss)]
            Self::SDiv => match sign_extend(a, ty).checked_div(sign_extend(b, ty)) {
                Some(v) => v as u64,
                None => return None,
            },
            #[allow(clippy::cast_sign_loss)]
            Self::SRem => match sign_extend(a, ty).checked_rem(sign_extend(b, ty)) {
                Some(v) => v as u64,
                None => return None,
            },
            Self::And => a & b,
            Self::Or => a | b,
            Self::Xor => a ^ b,
            Self::Shl | Self::LShr | Self::AShr if b >= ty.bits() as u64 => return None,
            Self::Shl => a << b,
            Self::LShr => a >> b,
            #[allow(clippy::cast_sign_loss)]
            Self::AShr => (sign_extend(a, ty) >> b) as u64,
        };
        Some(value & mask)
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::UDiv => "udiv",
            Self::SDiv => "sdiv",
            Self::URem => "urem",
            Self::SRem => "srem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
        }
    }
}

/// Integer comparison predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl Predicate {
    pub const fn fold(self, lhs: u64, rhs: u64, ty: Ty) -> bool {
        let mask = ty.mask();
        let (a, b) = (lhs & mask, rhs & mask);
        let (sa, sb) = (sign_extend(a, ty), sign_extend(b, ty));
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Ult => a < b,
            Self::Ule => a <= b,
            Self::Ugt => a > b,
            Self::Uge => a >= b,
            Self::Slt => sa < sb,
            Self::Sle => sa <= sb,
            Self::Sgt => sa > sb,
            Self::Sge => sa >= sb,
        }
    }

    /// Predicate that holds when the operands are swapped.
    pub const fn swapped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Ult => Self::Ugt,
            Self::Ule => Self::Uge,
            Self::Ugt => Self::Ult,
            Self::Uge => Self::Ule,
            Self::Slt => Self::Sgt,
            Self::Sle => Self::Sge,
            Self::Sgt => Self::Slt,
            Self::Sge => Self::Sle,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ult => "ult",
            Self::Ule => "ule",
            Self::Ugt => "ugt",
            Self::Uge => "uge",
            Self::Slt => "slt",
            Self::Sle => "sle",
            Self::Sgt => "sgt",
            Self::Sge => "sge",
        }
    }
}

/// Width and kind conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    PtrToInt,
    IntToPtr,
}

impl CastOp {
    pub const fn fold(self, value: u64, from: Ty, to: Ty) -> u64 {
        let value = value & from.mask();
        let result = match self {
            #[allow(clippy::cast_sign_loss)]
            Self::SExt => sign_extend(value, from) as u64,
            Self::Trunc | Self::ZExt | Self::PtrToInt | Self::IntToPtr => value,
        };
        result & to.mask()
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Trunc => "trunc",
            Self::ZExt => "zext",
            Self::SExt => "sext",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
        }
    }
}

/// Instruction kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstKind {
    /// Local scratch slot of `size` bytes.
    Alloca { size: u32 },
    Load { ptr: Value },
    Store { ptr: Value, value: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Icmp { pred: Predicate, lhs: Value, rhs: Value },
    Cast { op: CastOp, value: Value },
    /// Byte offset from a pointer.
    PtrAdd { base: Value, offset: Value },
    Select { cond: Value, if_true: Value, if_false: Value },
    Phi { incoming: Vec<(BlockId, Value)> },
    Call { callee: FuncId, args: Vec<Value> },
}

impl InstKind {
    /// Visit every operand in order.
    pub fn for_each_operand(&self, mut f: impl FnMut(Value)) {
        match self {
            Self::Alloca { .. } => {}
            Self::Load { ptr } => f(*ptr),
            Self::Store { ptr, value } => {
                f(*ptr);
                f(*value);
            }
            Self::Binary { lhs, rhs, .. } | Self::Icmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Self::Cast { value, .. } => f(*value),
            Self::PtrAdd { base, offset } => {
                f(*base);
                f(*offset);
            }
            Self::Select {
                cond,
                if_true,
                if_false,
            } => {
                f(*cond);
                f(*if_true);
                f(*if_false);
            }
            Self::Phi { incoming } => incoming.iter().for_each(|(_, v)| f(*v)),
            Self::Call { args, .. } => args.iter().for_each(|v| f(*v)),
        }
    }

    /// Rewrite every operand in place.
    pub fn map_operands(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Self::Alloca { .. } => {}
            Self::Load { ptr } => f(ptr),
            Self::Store { ptr, value } => {
                f(ptr);
                f(value);
            }
            Self::Binary { lhs, rhs, .. } | Self::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Self::Cast { value, .. } => f(value),
            Self::PtrAdd { base, offset } => {
                f(base);
                f(offset);
            }
            Self::Select {
                cond,
                if_true,
                if_false,
            } => {
                f(cond);
                f(if_true);
                f(if_false);
            }
            Self::Phi { incoming } => incoming.iter_mut().for_each(|(_, v)| f(v)),
            Self::Call { args, .. } => args.iter_mut().for_each(f),
        }
    }

    pub fn operands(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.for_each_operand(|v| out.push(v));
        out
    }

    /// Instructions that must be kept even without users.
    pub const fn has_side_effects(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Call { .. })
    }

    pub const fn reads_memory(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Call { .. })
    }

    pub const fn writes_memory(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Call { .. })
    }

    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// Pure instructions are candidates for value numbering.
    pub const fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Binary { .. }
                | Self::Icmp { .. }
                | Self::Cast { .. }
                | Self::PtrAdd { .. }
                | Self::Select { .. }
        )
    }
}

/// An instruction and its result type (`None` for instructions without a result).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: Option<Ty>,
}

impl Inst {
    pub const fn new(kind: InstKind, ty: Option<Ty>) -> Self {
        Self { kind, ty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop_fold_wraps_to_type() {
        assert_eq!(BinOp::Add.fold(0xff, 1, Ty::I8), Some(0));
        assert_eq!(BinOp::Sub.fold(0, 1, Ty::I32), Some(0xffff_ffff));
        assert_eq!(BinOp::AShr.fold(0x80, 7, Ty::I8), Some(0xff));
        assert_eq!(BinOp::SDiv.fold(0xfe, 2, Ty::I8), Some(0xff));
    }

    #[test]
    fn test_binop_fold_undefined() {
        assert_eq!(BinOp::UDiv.fold(1, 0, Ty::I64), None);
        assert_eq!(BinOp::Shl.fold(1, 64, Ty::I64), None);
        assert_eq!(BinOp::Shl.fold(1, 8, Ty::I8), None);
    }

    #[test]
    fn test_predicate_fold() {
        assert!(Predicate::Slt.fold(0xff, 0, Ty::I8));
        assert!(!Predicate::Ult.fold(0xff, 0, Ty::I8));
        assert!(Predicate::Ugt.swapped().fold(1, 2, Ty::I64));
    }

    #[test]
    fn test_cast_fold() {
        assert_eq!(CastOp::SExt.fold(0x80, Ty::I8, Ty::I32), 0xffff_ff80);
        assert_eq!(CastOp::ZExt.fold(0x80, Ty::I8, Ty::I32), 0x80);
        assert_eq!(CastOp::Trunc.fold(0x1234, Ty::I32, Ty::I8), 0x34);
    }

    #[test]
    fn test_operand_rewrite() {
        let mut kind = InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Arg(0),
            rhs: Value::int(1, Ty::I64),
        };
        kind.map_operands(|v| {
            if *v == Value::Arg(0) {
                *v = Value::Arg(1);
            }
        });
        assert_eq!(kind.operands(), vec![Value::Arg(1), Value::int(1, Ty::I64)]);
    }
}
