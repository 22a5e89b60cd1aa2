//! Narrow wide loads that are only ever truncated.

use relift_ir::{CastOp, Function, InstId, InstKind, Module, Value};

use crate::pass::{ModulePass, PassContext};

/// Rewrites `trunc (load p)` into a narrower load of `p` when the trunc is the
/// wide load's only user. Memory is little-endian, so the low bytes start at `p`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplaceTruncWithLoad;

impl ReplaceTruncWithLoad {
    fn run_on_function(func: &mut Function) -> bool {
        let counts = func.use_counts();
        let mut changed = false;
        for id in func.live_insts() {
            let Some((load, ptr)) = narrowable(func, id) else {
                continue;
            };
            if counts.get(&load).copied() != Some(1) {
                continue;
            }
            let ty = func.inst(id).ty;
            let narrow = func.insert_before(load, InstKind::Load { ptr }, ty);
            func.replace_all_uses(Value::Inst(id), Value::Inst(narrow));
            func.remove_inst(id);
            func.remove_inst(load);
            changed = true;
        }
        changed
    }
}

/// `(load, ptr)` if `id` truncates an integer load.
fn narrowable(func: &Function, id: InstId) -> Option<(InstId, Value)> {
    let InstKind::Cast {
        op: CastOp::Trunc,
        value: Value::Inst(load),
    } = func.inst(id).kind
    else {
        return None;
    };
    if !func.is_live(load) {
        return None;
    }
    match func.inst(load).kind {
        InstKind::Load { ptr } if func.inst(load).ty.is_some_and(|ty| !ty.is_ptr()) => {
            Some((load, ptr))
        }
        _ => None,
    }
}

impl ModulePass for ReplaceTruncWithLoad {
    fn name(&self) -> &'static str {
        "replace-trunc-with-load"
    }

    fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
        let mut changed = false;
        for (_, func) in module.functions_mut() {
            if !func.is_declaration() {
                changed |= Self::run_on_function(func);
            }
        }
        changed
    }
}
