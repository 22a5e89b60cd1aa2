//! Aggressive dead-code elimination.

use relift_ir::{Function, InstId, Value};
use rustc_hash::FxHashSet;

use crate::pass::{FunctionPass, PassContext};

/// Assumes every instruction dead until proven live.
///
/// Roots are instructions with side effects and terminator operands; liveness
/// flows backwards through operands. Unlike [`crate::passes::Dce`] this also
/// deletes phi cycles that only feed each other.
#[derive(Clone, Copy, Debug, Default)]
pub struct Adce;

impl FunctionPass for Adce {
    fn name(&self) -> &'static str {
        "adce"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        let mut live: FxHashSet<InstId> = FxHashSet::default();
        let mut work: Vec<InstId> = Vec::new();
        let mut mark = |v: Value, work: &mut Vec<InstId>| {
            if let Value::Inst(id) = v {
                if live.insert(id) {
                    work.push(id);
                }
            }
        };

        for (_, block) in func.blocks() {
            for &id in &block.insts {
                if func.inst(id).kind.has_side_effects() {
                    mark(Value::Inst(id), &mut work);
                }
            }
            block.terminator.for_each_operand(|v| mark(v, &mut work));
        }
        while let Some(id) = work.pop() {
            for operand in func.inst(id).kind.operands() {
                mark(operand, &mut work);
            }
        }

        let dead: Vec<InstId> = func
            .live_insts()
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        for &id in &dead {
            func.remove_inst(id);
        }
        !dead.is_empty()
    }
}
