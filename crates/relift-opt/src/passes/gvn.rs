//! Global value numbering.

use relift_ir::{BlockId, Function, InstId, InstKind, Ty, Value};
use rustc_hash::FxHashMap;

use crate::analysis::DominatorTree;
use crate::pass::{FunctionPass, PassContext};
use crate::passes::util::apply_replacements;

/// Dominator-based value numbering.
///
/// Compared to [`crate::passes::EarlyCse`] it also:
///
/// - treats commutative operations as equal regardless of operand order,
/// - merges phis of one block that receive the same values on every edge,
/// - carries available loads into a block whose only predecessor is its
///   immediate dominator, so redundant loads along straight-line paths go away.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gvn;

type Key = (InstKind, Option<Ty>);
type Available = FxHashMap<(Value, Ty), Value>;

impl FunctionPass for Gvn {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let dom = DominatorTree::compute(func);
        let mut numbers: FxHashMap<Key, Vec<(BlockId, InstId)>> = FxHashMap::default();
        let mut replacements: FxHashMap<InstId, Value> = FxHashMap::default();
        let mut available_out: FxHashMap<BlockId, Available> = FxHashMap::default();

        for &block in dom.rpo() {
            let mut available = match (dom.preds(block), dom.idom(block)) {
                ([pred], Some(idom)) if *pred == idom => {
                    available_out.get(&idom).cloned().unwrap_or_default()
                }
                _ => Available::default(),
            };
            let mut phis: FxHashMap<Vec<(BlockId, Value)>, InstId> = FxHashMap::default();

            for id in func.block(block).insts.clone() {
                let inst = func.inst(id);
                let ty = inst.ty;
                let mut kind = inst.kind.clone();
                kind.map_operands(|v| resolve(&replacements, v));

                match kind {
                    InstKind::Phi { mut incoming } => {
                        incoming.sort_by_key(|(from, _)| *from);
                        match phis.get(&incoming) {
                            Some(&leader) if func.inst(leader).ty == ty => {
                                replacements.insert(id, Value::Inst(leader));
                            }
                            _ => {
                                phis.insert(incoming, id);
                            }
                        }
                    }
                    InstKind::Load { ptr } => {
                        let Some(ty) = ty else { continue };
                        if let Some(&value) = available.get(&(ptr, ty)) {
                            replacements.insert(id, value);
                        } else {
                            available.insert((ptr, ty), Value::Inst(id));
                        }
                    }
                    InstKind::Store { ptr, value } => {
                        available.clear();
                        if let Some(ty) = func.value_ty(value) {
                            available.insert((ptr, ty), value);
                        }
                    }
                    InstKind::Call { .. } => available.clear(),
                    kind if kind.is_pure() => {
                        let key = (normalize(kind), ty);
                        let leaders = numbers.entry(key).or_default();
                        if let Some(&(_, leader)) =
                            leaders.iter().find(|(b, _)| dom.dominates(*b, block))
                        {
                            replacements.insert(id, Value::Inst(leader));
                        } else {
                            leaders.push((block, id));
                        }
                    }
                    _ => {}
                }
            }
            available_out.insert(block, available);
        }

        if replacements.is_empty() {
            return false;
        }
        apply_replacements(func, &replacements);
        for &id in replacements.keys() {
            func.remove_inst(id);
        }
        true
    }
}

fn resolve(replacements: &FxHashMap<InstId, Value>, value: &mut Value) {
    while let Value::Inst(id) = *value {
        match replacements.get(&id) {
            Some(&next) => *value = next,
            None => break,
        }
    }
}

/// Order the operands of commutative operations so both spellings share a number.
fn normalize(kind: InstKind) -> InstKind {
    match kind {
        InstKind::Binary { op, lhs, rhs } if op.is_commutative() && rank(rhs) < rank(lhs) => {
            InstKind::Binary {
                op,
                lhs: rhs,
                rhs: lhs,
            }
        }
        other => other,
    }
}

fn rank(value: Value) -> (u8, u64) {
    match value {
        Value::Arg(n) => (0, u64::from(n)),
        Value::Inst(id) => (1, id.0.into()),
        Value::Const(c) => (2, c.bits()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::ImageLayout;
    use relift_ir::{BinOp, FunctionBuilder, Param};

    fn run(f: &mut Function) -> bool {
        let image = ImageLayout::new(0);
        Gvn.run_on_function(f, &PassContext::new(&image))
    }

    #[test]
    fn test_commutative_operands() {
        let mut f = Function::new(
            "f",
            vec![Param::new("x", Ty::I64), Param::new("y", Ty::I64)],
            Some(Ty::I64),
        );
        let entry = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        let a = b.binary(BinOp::Xor, Value::Arg(0), Value::Arg(1));
        let c = b.binary(BinOp::Xor, Value::Arg(1), Value::Arg(0));
        let s = b.binary(BinOp::Sub, Value::Arg(0), Value::Arg(1));
        let t = b.binary(BinOp::Sub, Value::Arg(1), Value::Arg(0));
        let r1 = b.add(a, c);
        let r2 = b.add(s, t);
        let r = b.add(r1, r2);
        b.ret(Some(r));

        assert!(run(&mut f));
        assert!(!f.is_live(c.as_inst().unwrap()));
        assert!(f.is_live(t.as_inst().unwrap()));
    }

    #[test]
    fn test_duplicate_phis() {
        let mut f = Function::new(
            "f",
            vec![Param::new("c", Ty::I1), Param::new("x", Ty::I64)],
            Some(Ty::I64),
        );
        let entry = f.add_block(None);
        let side = f.add_block(None);
        let join = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.branch(Value::Arg(0), side, join);
        b.position_at(side);
        b.jump(join);
        b.position_at(join);
        let p1 = b.phi(
            Ty::I64,
            vec![(entry, Value::Arg(1)), (side, Value::int(0, Ty::I64))],
        );
        let p2 = b.phi(
            Ty::I64,
            vec![(side, Value::int(0, Ty::I64)), (entry, Value::Arg(1))],
        );
        let r = b.add(p1, p2);
        b.ret(Some(r));

        assert!(run(&mut f));
        assert_eq!(f.phis(join).len(), 1);
        assert_eq!(
            f.inst(r.as_inst().unwrap()).kind,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: p1,
                rhs: p1
            }
        );
    }

    #[test]
    fn test_load_reuse_across_straight_line() {
        let mut f = Function::new(
            "f",
            vec![Param::new("p", Ty::Ptr), Param::new("c", Ty::I1)],
            Some(Ty::I64),
        );
        let entry = f.add_block(None);
        let next = f.add_block(None);
        let other = f.add_block(None);
        let join = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        let first = b.load(Value::Arg(0), Ty::I64);
        b.jump(next);
        b.position_at(next);
        let again = b.load(Value::Arg(0), Ty::I64);
        b.branch(Value::Arg(1), other, join);
        b.position_at(other);
        b.store(Value::Arg(0), Value::int(1, Ty::I64));
        b.jump(join);
        b.position_at(join);
        let merged = b.load(Value::Arg(0), Ty::I64);
        let sum = b.add(first, again);
        let total = b.add(sum, merged);
        b.ret(Some(total));

        assert!(run(&mut f));
        assert!(!f.is_live(again.as_inst().unwrap()));
        assert!(f.is_live(merged.as_inst().unwrap()));
    }
}
