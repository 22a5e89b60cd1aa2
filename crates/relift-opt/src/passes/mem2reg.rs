//! Promote stack slots to SSA values.

use relift_ir::{BlockId, Function, InstId, InstKind, Ty, User, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::analysis::DominatorTree;
use crate::pass::{FunctionPass, PassContext};
use crate::passes::util::apply_replacements;

/// Rewrites allocas that are only loaded from and stored to into SSA values,
/// placing phis at the iterated dominance frontier of their stores.
///
/// A load with no reaching store reads zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mem2Reg;

impl FunctionPass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let allocas: Vec<InstId> = func
            .live_insts()
            .into_iter()
            .filter(|&id| matches!(func.inst(id).kind, InstKind::Alloca { .. }))
            .collect();
        promote_allocas(func, &allocas) > 0
    }
}

/// Promote every promotable alloca in `allocas`. Returns how many were promoted.
pub fn promote_allocas(func: &mut Function, allocas: &[InstId]) -> usize {
    if allocas.is_empty() {
        return 0;
    }
    let dom = DominatorTree::compute(func);
    // A phi in a re-entered entry block would have no incoming for the first entry.
    if dom.entry().is_none_or(|entry| !dom.preds(entry).is_empty()) {
        return 0;
    }
    let users = func.users();

    let slots: Vec<(InstId, Ty)> = allocas
        .iter()
        .filter_map(|&id| promotable_type(func, &dom, &users, id).map(|ty| (id, ty)))
        .collect();
    if slots.is_empty() {
        return 0;
    }
    let index: FxHashMap<InstId, usize> =
        slots.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();

    // Phi placement.
    let frontiers = dom.frontiers();
    let mut phis: FxHashMap<BlockId, Vec<(usize, InstId)>> = FxHashMap::default();
    for (slot, &(alloca, ty)) in slots.iter().enumerate() {
        let def_blocks: FxHashSet<BlockId> = users
            .get(&Value::Inst(alloca))
            .into_iter()
            .flatten()
            .filter_map(|user| match user {
                User::Inst(id) if matches!(func.inst(*id).kind, InstKind::Store { .. }) => {
                    func.inst_block(*id)
                }
                _ => None,
            })
            .collect();
        let mut targets: Vec<BlockId> = dom
            .iterated_frontier(&frontiers, def_blocks)
            .into_iter()
            .collect();
        targets.sort_unstable();
        for block in targets {
            let at = func.phis(block).len();
            let phi = func.insert_inst(
                block,
                at,
                InstKind::Phi {
                    incoming: Vec::new(),
                },
                Some(ty),
            );
            phis.entry(block).or_default().push((slot, phi));
        }
    }

    // Renaming over the dominator tree.
    let initial: Vec<Value> = slots.iter().map(|&(_, ty)| Value::int(0, ty)).collect();
    let mut replacements: FxHashMap<InstId, Value> = FxHashMap::default();
    let mut work: Vec<(BlockId, Vec<Value>)> = dom
        .entry()
        .map(|entry| (entry, initial))
        .into_iter()
        .collect();

    while let Some((block, mut current)) = work.pop() {
        for &(slot, phi) in phis.get(&block).map_or(&[][..], Vec::as_slice) {
            current[slot] = Value::Inst(phi);
        }

        for id in func.block(block).insts.clone() {
            match func.inst(id).kind.clone() {
                InstKind::Load {
                    ptr: Value::Inst(ptr),
                } => {
                    if let Some(&slot) = index.get(&ptr) {
                        replacements.insert(id, current[slot]);
                        func.remove_inst(id);
                    }
                }
                InstKind::Store {
                    ptr: Value::Inst(ptr),
                    value,
                } => {
                    if let Some(&slot) = index.get(&ptr) {
                        current[slot] = value;
                        func.remove_inst(id);
                    }
                }
                _ => {}
            }
        }

        let mut succs = func.successors(block);
        succs.dedup();
        for succ in succs {
            for &(slot, phi) in phis.get(&succ).map_or(&[][..], Vec::as_slice) {
                if let InstKind::Phi { incoming } = &mut func.inst_mut(phi).kind {
                    if !incoming.iter().any(|(from, _)| *from == block) {
                        incoming.push((block, current[slot]));
                    }
                }
            }
        }

        for &child in dom.children(block) {
            work.push((child, current.clone()));
        }
    }

    for &(alloca, _) in &slots {
        func.remove_inst(alloca);
    }
    apply_replacements(func, &replacements);
    trace!(func = %func.name, promoted = slots.len(), "promoted allocas");
    slots.len()
}

/// Access type of an alloca whose every use is a direct load or store in a
/// reachable block, all with the same type.
fn promotable_type(
    func: &Function,
    dom: &DominatorTree,
    users: &FxHashMap<Value, Vec<User>>,
    alloca: InstId,
) -> Option<Ty> {
    if !dom.is_reachable(func.inst_block(alloca)?) {
        return None;
    }
    let me = Value::Inst(alloca);
    let mut ty = None;
    for user in users.get(&me).into_iter().flatten() {
        let User::Inst(id) = *user else {
            return None;
        };
        if !dom.is_reachable(func.inst_block(id)?) {
            return None;
        }
        let access = match func.inst(id).kind {
            InstKind::Load { ptr } if ptr == me => func.inst(id).ty?,
            InstKind::Store { ptr, value } if ptr == me && value != me => func.value_ty(value)?,
            _ => return None,
        };
        match ty {
            None => ty = Some(access),
            Some(t) if t == access => {}
            Some(_) => return None,
        }
    }
    ty
}
