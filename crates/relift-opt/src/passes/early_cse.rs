//! Early common-subexpression elimination.

use relift_ir::{BlockId, Function, InstId, InstKind, Ty, Value};
use rustc_hash::FxHashMap;

use crate::analysis::DominatorTree;
use crate::pass::{FunctionPass, PassContext};
use crate::passes::util::apply_replacements;

/// Replaces a pure instruction with an identical one that dominates it.
///
/// With `memory_aware` set, loads are also reused inside a block: a load sees
/// the last store or load of the same pointer and type, as long as nothing
/// that may write memory came between them.
#[derive(Clone, Copy, Debug, Default)]
pub struct EarlyCse {
    pub memory_aware: bool,
}

impl EarlyCse {
    pub const fn new(memory_aware: bool) -> Self {
        Self { memory_aware }
    }
}

type Key = (InstKind, Option<Ty>);

impl FunctionPass for EarlyCse {
    fn name(&self) -> &'static str {
        "early-cse"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let dom = DominatorTree::compute(func);
        let mut seen: FxHashMap<Key, Vec<(BlockId, InstId)>> = FxHashMap::default();
        let mut replacements: FxHashMap<InstId, Value> = FxHashMap::default();

        for &block in dom.rpo() {
            let mut available: FxHashMap<(Value, Ty), Value> = FxHashMap::default();
            for id in func.block(block).insts.clone() {
                let inst = func.inst(id);
                let mut kind = inst.kind.clone();
                // Operands may refer to instructions already replaced in this run.
                kind.map_operands(|v| resolve(&replacements, v));
                let ty = inst.ty;

                if kind.is_pure() {
                    let key = (kind, ty);
                    let leaders = seen.entry(key).or_default();
                    let dominating = leaders.iter().find(|(b, _)| dom.dominates(*b, block));
                    if let Some(&(_, leader)) = dominating {
                        replacements.insert(id, Value::Inst(leader));
                    } else {
                        leaders.push((block, id));
                    }
                    continue;
                }

                if !self.memory_aware {
                    continue;
                }
                match kind {
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
                    _ => {}
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::ImageLayout;
    use relift_ir::{FunctionBuilder, Param, Terminator};

    fn run(f: &mut Function, memory_aware: bool) -> bool {
        let image = ImageLayout::new(0);
        EarlyCse::new(memory_aware).run_on_function(f, &PassContext::new(&image))
    }

    #[test]
    fn test_duplicate_arithmetic() {
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], Some(Ty::I64));
        let entry = f.add_block(None);
        let next = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        let a = b.add(Value::Arg(0), Value::int(4, Ty::I64));
        b.jump(next);
        b.position_at(next);
        let c = b.add(Value::Arg(0), Value::int(4, Ty::I64));
        let d = b.binary(relift_ir::BinOp::Mul, c, c);
        let e = b.binary(relift_ir::BinOp::Mul, a, a);
        let sum = b.add(d, e);
        b.ret(Some(sum));

        assert!(run(&mut f, false));
        assert!(!f.is_live(c.as_inst().unwrap()));
        assert!(!f.is_live(e.as_inst().unwrap()));
        assert_eq!(
            f.inst(sum.as_inst().unwrap()).kind,
            InstKind::Binary {
                op: relift_ir::BinOp::Add,
                lhs: d,
                rhs: d
            }
        );
    }

    #[test]
    fn test_sibling_blocks_do_not_share() {
        let mut f = Function::new("f", vec![Param::new("c", Ty::I1)], None);
        let entry = f.add_block(None);
        let left = f.add_block(None);
        let right = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.branch(Value::Arg(0), left, right);
        b.position_at(left);
        let l = b.zext(Value::Arg(0), Ty::I64);
        b.ret(None);
        b.position_at(right);
        let r = b.zext(Value::Arg(0), Ty::I64);
        b.ret(None);
        assert!(!run(&mut f, true));
        assert!(f.is_live(l.as_inst().unwrap()));
        assert!(f.is_live(r.as_inst().unwrap()));
    }

    #[test]
    fn test_store_forwarding() {
        let mut f = Function::new(
            "f",
            vec![Param::new("p", Ty::Ptr), Param::new("x", Ty::I64)],
            Some(Ty::I64),
        );
        let entry = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.store(Value::Arg(0), Value::Arg(1));
        let first = b.load(Value::Arg(0), Ty::I64);
        b.ret(Some(first));

        let mut plain = f.clone();
        assert!(!run(&mut plain, false));
        assert!(run(&mut f, true));
        assert_eq!(*f.terminator(entry), Terminator::Return(Some(Value::Arg(1))));
    }

    #[test]
    fn test_intervening_store_blocks_reuse() {
        let mut f = Function::new(
            "f",
            vec![Param::new("p", Ty::Ptr), Param::new("q", Ty::Ptr)],
            Some(Ty::I64),
        );
        let entry = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        let first = b.load(Value::Arg(0), Ty::I64);
        b.store(Value::Arg(1), Value::int(0, Ty::I64));
        let second = b.load(Value::Arg(0), Ty::I64);
        let again = b.load(Value::Arg(0), Ty::I64);
        let sum = b.add(first, again);
        let total = b.add(sum, second);
        b.ret(Some(total));

        assert!(run(&mut f, true));
        assert!(f.is_live(second.as_inst().unwrap()));
        assert!(!f.is_live(again.as_inst().unwrap()));
    }
}
