//! Control-flow graph cleanup.

use relift_ir::{BlockId, Function, InstKind, Terminator, Value};
use rustc_hash::FxHashSet;

use crate::pass::{FunctionPass, PassContext};

/// Folds constant branches, deletes unreachable blocks, merges straight-line
/// block chains and bypasses empty forwarding blocks.
///
/// An indirect jump whose target folded to the address of a lifted block
/// becomes a direct jump to that block.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimplifyCfg;

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplifycfg"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let mut changed = false;
        loop {
            let progress = fold_branches(func)
                | remove_unreachable(func)
                | merge_chains(func)
                | bypass_forwarders(func);
            if !progress {
                return changed;
            }
            changed = true;
        }
    }
}

fn fold_branches(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.block_ids() {
        let folded = match func.terminator(block).clone() {
            Terminator::Branch {
                cond: Value::Const(c),
                then_block,
                else_block,
            } => {
                let (taken, dropped) = if c.is_zero() {
                    (else_block, then_block)
                } else {
                    (then_block, else_block)
                };
                if dropped != taken && func.contains_block(dropped) {
                    func.remove_phi_incoming(dropped, block);
                }
                Some(Terminator::Jump(taken))
            }
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } if then_block == else_block => Some(Terminator::Jump(then_block)),
            Terminator::IndirectJump {
                target: Value::Const(c),
            } => func
                .address_block(c.bits())
                .filter(|&target| func.phis(target).is_empty())
                .map(Terminator::Jump),
            _ => None,
        };
        if let Some(terminator) = folded {
            func.set_terminator(block, terminator);
            changed = true;
        }
    }
    changed
}

fn remove_unreachable(func: &mut Function) -> bool {
    let reachable: FxHashSet<BlockId> = func.reverse_postorder().into_iter().collect();
    let dead: Vec<BlockId> = func
        .block_ids()
        .into_iter()
        .filter(|b| !reachable.contains(b))
        .collect();
    for &block in &dead {
        for succ in func.successors(block) {
            if reachable.contains(&succ) {
                func.remove_phi_incoming(succ, block);
            }
        }
    }
    for &block in &dead {
        func.remove_block(block);
    }
    !dead.is_empty()
}

/// Fold a block into its only predecessor when that predecessor jumps only to it.
fn merge_chains(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.block_ids() {
        if !func.contains_block(block) || Some(block) == func.entry() {
            continue;
        }
        let preds = func.predecessors();
        let [pred] = preds.get(&block).map_or(&[][..], Vec::as_slice) else {
            continue;
        };
        let pred = *pred;
        if pred == block || *func.terminator(pred) != Terminator::Jump(block) {
            continue;
        }
        for phi in func.phis(block) {
            let value = match &func.inst(phi).kind {
                InstKind::Phi { incoming } => incoming.first().map(|(_, v)| *v),
                _ => None,
            };
            match value {
                Some(v) if v != Value::Inst(phi) => func.replace_all_uses(Value::Inst(phi), v),
                _ => {}
            }
            func.remove_inst(phi);
        }
        func.merge_blocks(pred, block);
        changed = true;
    }
    changed
}

/// Redirect edges around empty blocks that only jump onwards.
fn bypass_forwarders(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.block_ids() {
        if !func.contains_block(block) || Some(block) == func.entry() {
            continue;
        }
        let data = func.block(block);
        let Terminator::Jump(target) = data.terminator else {
            continue;
        };
        if !data.insts.is_empty() || target == block || !func.phis(target).is_empty() {
            continue;
        }
        let preds = func.predecessors();
        for &pred in preds.get(&block).map_or(&[][..], Vec::as_slice) {
            if pred == block {
                continue;
            }
            func.block_mut(pred)
                .terminator
                .replace_successor(block, target);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::ImageLayout;
    use relift_ir::{FunctionBuilder, Param, Ty};

    fn run(f: &mut Function) -> bool {
        let image = ImageLayout::new(0);
        SimplifyCfg.run_on_function(f, &PassContext::new(&image))
    }

    #[test]
    fn test_constant_branch_collapses() {
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], Some(Ty::I64));
        let entry = f.add_block(Some(0x1000));
        let yes = f.add_block(Some(0x1010));
        let no = f.add_block(Some(0x1020));
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.branch(Value::i1(false), yes, no);
        b.position_at(yes);
        b.ret(Some(Value::int(1, Ty::I64)));
        b.position_at(no);
        let v = b.add(Value::Arg(0), Value::int(2, Ty::I64));
        b.ret(Some(v));

        assert!(run(&mut f));
        assert_eq!(f.block_count(), 1);
        assert_eq!(*f.terminator(entry), Terminator::Return(Some(v)));
        assert!(f.is_live(v.as_inst().unwrap()));
    }

    #[test]
    fn test_phi_incoming_dropped_with_edge() {
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], Some(Ty::I64));
        let entry = f.add_block(None);
        let side = f.add_block(None);
        let join = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.branch(Value::i1(true), join, side);
        b.position_at(side);
        b.jump(join);
        b.position_at(join);
        let phi = b.phi(
            Ty::I64,
            vec![(entry, Value::Arg(0)), (side, Value::int(7, Ty::I64))],
        );
        b.ret(Some(phi));

        assert!(run(&mut f));
        assert_eq!(f.block_count(), 1);
        assert_eq!(*f.terminator(entry), Terminator::Return(Some(Value::Arg(0))));
    }

    #[test]
    fn test_forwarder_bypassed() {
        let mut f = Function::new("f", vec![Param::new("c", Ty::I1)], None);
        let entry = f.add_block(None);
        let hop = f.add_block(None);
        let other = f.add_block(None);
        let exit = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        b.branch(Value::Arg(0), hop, other);
        b.position_at(hop);
        b.jump(exit);
        b.position_at(other);
        b.alloca(8);
        b.jump(exit);
        b.position_at(exit);
        b.ret(None);

        assert!(run(&mut f));
        assert!(!f.contains_block(hop));
        assert_eq!(f.successors(entry), vec![exit, other]);
    }

    #[test]
    fn test_indirect_jump_to_known_block() {
        let mut f = Function::new("f", Vec::new(), None);
        let entry = f.add_block(Some(0x1000));
        let target = f.add_block(Some(0x2000));
        let mut b = FunctionBuilder::new(&mut f, entry);
        let slot = b.alloca(8);
        b.indirect_jump(Value::int(0x2000, Ty::I64));
        b.position_at(target);
        b.load(slot, Ty::I64);
        b.ret(None);

        assert!(run(&mut f));
        assert_eq!(f.block_count(), 1);
        assert_eq!(*f.terminator(entry), Terminator::Return(None));
        assert_eq!(f.block(entry).insts.len(), 2);
    }
}
