//! Helpers shared by several passes.

use relift_ir::{CastOp, Function, InstId, InstKind, Value};
use rustc_hash::FxHashMap;

/// Remove instructions without users or side effects, repeatedly.
pub(crate) fn remove_dead_insts(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let counts = func.use_counts();
        let dead: Vec<InstId> = func
            .live_insts()
            .into_iter()
            .filter(|&id| {
                !func.inst(id).kind.has_side_effects() && !counts.contains_key(&id)
            })
            .collect();
        if dead.is_empty() {
            return changed;
        }
        for id in dead {
            func.remove_inst(id);
        }
        changed = true;
    }
}

/// Rewrite every use according to `map`, following chains of replacements.
pub(crate) fn apply_replacements(func: &mut Function, map: &FxHashMap<InstId, Value>) {
    if map.is_empty() {
        return;
    }
    func.rewrite_operands(|v| {
        let mut hops = 0;
        while let Value::Inst(id) = *v {
            match map.get(&id) {
                Some(&next) if hops <= map.len() => {
                    *v = next;
                    hops += 1;
                }
                _ => break,
            }
        }
    });
}

/// Absolute address of a pointer of the form `inttoptr c`, `memory + c`,
/// or a constant offset from either.
pub(crate) fn constant_address(
    func: &Function,
    ptr: Value,
    memory_arg: Option<u32>,
) -> Option<u64> {
    let id = ptr.as_inst()?;
    if !func.is_live(id) {
        return None;
    }
    match &func.inst(id).kind {
        InstKind::Cast {
            op: CastOp::IntToPtr,
            value: Value::Const(c),
        } => Some(c.bits()),
        InstKind::PtrAdd {
            base: Value::Arg(index),
            offset: Value::Const(c),
        } if Some(*index) == memory_arg => Some(c.bits()),
        InstKind::PtrAdd {
            base,
            offset: Value::Const(c),
        } => constant_address(func, *base, memory_arg).map(|a| a.wrapping_add(c.bits())),
        _ => None,
    }
}
