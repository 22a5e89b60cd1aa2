//! Local algebraic simplification and constant folding.

use relift_ir::{BinOp, CastOp, Function, InstId, InstKind, Predicate, Ty, Value};

use crate::analysis::DominatorTree;
use crate::pass::{FunctionPass, PassContext};

/// Folds constants, applies algebraic identities and canonicalizes operand
/// order so later passes see one form per computation:
///
/// - constants move to the right of commutative operations and compares,
/// - `x - c` becomes `x + (-c)`,
/// - chains like `(x + c1) + c2` and `(p + c1) + c2` collapse to one constant offset.
///
/// `inttoptr c` is left alone: it is the canonical pseudo-memory address form.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstCombine;

impl FunctionPass for InstCombine {
    fn name(&self) -> &'static str {
        "instcombine"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let dom = DominatorTree::compute(func);
        let mut changed = false;
        loop {
            let mut progress = false;
            for id in func.live_insts() {
                if !func.is_live(id) {
                    continue;
                }
                progress |= canonicalize(func, id);
                if let Some(value) = simplify(func, &dom, id) {
                    func.replace_all_uses(Value::Inst(id), value);
                    func.remove_inst(id);
                    progress = true;
                }
            }
            if !progress {
                return changed;
            }
            changed = true;
        }
    }
}

fn as_const(value: Value) -> Option<u64> {
    value.as_const().map(relift_ir::Constant::bits)
}

const fn is_associative(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
    )
}

/// Rewrite an instruction into canonical form in place.
fn canonicalize(func: &mut Function, id: InstId) -> bool {
    let ty = func.inst(id).ty.unwrap_or(Ty::I64);
    let rewritten = match func.inst(id).kind.clone() {
        InstKind::Binary { op, lhs, rhs }
            if op.is_commutative() && lhs.is_const() && !rhs.is_const() =>
        {
            Some(InstKind::Binary {
                op,
                lhs: rhs,
                rhs: lhs,
            })
        }
        InstKind::Icmp { pred, lhs, rhs } if lhs.is_const() && !rhs.is_const() => {
            Some(InstKind::Icmp {
                pred: pred.swapped(),
                lhs: rhs,
                rhs: lhs,
            })
        }
        InstKind::Binary {
            op: BinOp::Sub,
            lhs,
            rhs: Value::Const(c),
        } if !lhs.is_const() && !c.is_zero() => Some(InstKind::Binary {
            op: BinOp::Add,
            lhs,
            rhs: Value::int(0u64.wrapping_sub(c.bits()), ty),
        }),
        InstKind::Binary {
            op,
            lhs: Value::Inst(inner),
            rhs: Value::Const(c2),
        } if is_associative(op) => match func.inst(inner).kind {
            InstKind::Binary {
                op: inner_op,
                lhs: base,
                rhs: Value::Const(c1),
            } if inner_op == op => op.fold(c1.bits(), c2.bits(), ty).map(|c| InstKind::Binary {
                op,
                lhs: base,
                rhs: Value::int(c, ty),
            }),
            _ => None,
        },
        InstKind::PtrAdd {
            base: Value::Inst(inner),
            offset: Value::Const(c2),
        } => match func.inst(inner).kind {
            InstKind::PtrAdd {
                base,
                offset: Value::Const(c1),
            } => Some(InstKind::PtrAdd {
                base,
                offset: Value::int(c1.bits().wrapping_add(c2.bits()), Ty::I64),
            }),
            _ => None,
        },
        _ => None,
    };
    match rewritten {
        Some(kind) => {
            func.inst_mut(id).kind = kind;
            true
        }
        None => false,
    }
}

/// A value equivalent to instruction `id`, if one exists without it.
fn simplify(func: &Function, dom: &DominatorTree, id: InstId) -> Option<Value> {
    let inst = func.inst(id);
    let ty = inst.ty?;
    match &inst.kind {
        InstKind::Binary { op, lhs, rhs } => simplify_binary(*op, *lhs, *rhs, ty),
        InstKind::Icmp { pred, lhs, rhs } => {
            if let (Some(a), Some(b)) = (as_const(*lhs), as_const(*rhs)) {
                let operand_ty = func.value_ty(*lhs).unwrap_or(Ty::I64);
                return Some(Value::i1(pred.fold(a, b, operand_ty)));
            }
            if lhs == rhs {
                let reflexive = matches!(
                    pred,
                    Predicate::Eq
                        | Predicate::Ule
                        | Predicate::Uge
                        | Predicate::Sle
                        | Predicate::Sge
                );
                return Some(Value::i1(reflexive));
            }
            None
        }
        InstKind::Cast { op, value } => simplify_cast(func, *op, *value, ty),
        InstKind::PtrAdd { base, offset } => {
            (as_const(*offset) == Some(0)).then_some(*base)
        }
        InstKind::Select {
            cond,
            if_true,
            if_false,
        } => match as_const(*cond) {
            Some(0) => Some(*if_false),
            Some(_) => Some(*if_true),
            None => (if_true == if_false).then_some(*if_true),
        },
        InstKind::Phi { incoming } => {
            let me = Value::Inst(id);
            let mut unique = None;
            for &(_, value) in incoming {
                if value == me || Some(value) == unique {
                    continue;
                }
                if unique.is_some() {
                    return None;
                }
                unique = Some(value);
            }
            let value = unique?;
            // The replacement must be available wherever the phi was.
            if let Value::Inst(def) = value {
                let (Some(def_block), Some(phi_block)) = (func.inst_block(def), func.inst_block(id))
                else {
                    return None;
                };
                if def_block == phi_block || !dom.dominates(def_block, phi_block) {
                    return None;
                }
            }
            Some(value)
        }
        InstKind::Alloca { .. }
        | InstKind::Load { .. }
        | InstKind::Store { .. }
        | InstKind::Call { .. } => None,
    }
}

fn simplify_binary(op: BinOp, lhs: Value, rhs: Value, ty: Ty) -> Option<Value> {
    if let (Some(a), Some(b)) = (as_const(lhs), as_const(rhs)) {
        return op.fold(a, b, ty).map(|v| Value::int(v, ty));
    }
    if let Some(c) = rhs.as_const() {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::LShr
            | BinOp::AShr
                if c.is_zero() =>
            {
                return Some(lhs);
            }
            BinOp::Mul | BinOp::And if c.is_zero() => return Some(Value::int(0, ty)),
            BinOp::Mul | BinOp::UDiv | BinOp::SDiv if c.bits() == 1 => return Some(lhs),
            BinOp::And if c.is_all_ones() => return Some(lhs),
            BinOp::Or if c.is_all_ones() => return Some(Value::int(ty.mask(), ty)),
            _ => {}
        }
    }
    if lhs == rhs {
        match op {
            BinOp::Sub | BinOp::Xor => return Some(Value::int(0, ty)),
            BinOp::And | BinOp::Or => return Some(lhs),
            _ => {}
        }
    }
    None
}

fn simplify_cast(func: &Function, op: CastOp, value: Value, ty: Ty) -> Option<Value> {
    let from = func.value_ty(value)?;
    if let Some(c) = value.as_const() {
        if op == CastOp::IntToPtr {
            return None;
        }
        return Some(Value::int(op.fold(c.bits(), from, ty), ty));
    }
    if from == ty && matches!(op, CastOp::Trunc | CastOp::ZExt | CastOp::SExt) {
        return Some(value);
    }
    let Value::Inst(inner) = value else {
        return None;
    };
    let InstKind::Cast {
        op: inner_op,
        value: source,
    } = func.inst(inner).kind
    else {
        return None;
    };
    let source_ty = func.value_ty(source)?;
    match (inner_op, op) {
        (CastOp::PtrToInt, CastOp::IntToPtr) | (CastOp::IntToPtr, CastOp::PtrToInt)
            if source_ty == ty =>
        {
            Some(source)
        }
        (CastOp::ZExt | CastOp::SExt, CastOp::Trunc) if source_ty == ty => Some(source),
        _ => None,
    }
}
