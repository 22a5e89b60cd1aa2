//! Drop unused declarations.

use relift_ir::{FuncId, InstKind, Module};
use rustc_hash::FxHashSet;

use crate::pass::{ModulePass, PassContext};

/// Removes function declarations that no call refers to.
#[derive(Clone, Copy, Debug, Default)]
pub struct StripDeadPrototypes;

impl ModulePass for StripDeadPrototypes {
    fn name(&self) -> &'static str {
        "strip-dead-prototypes"
    }

    fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
        let mut called: FxHashSet<FuncId> = FxHashSet::default();
        for (_, func) in module.functions() {
            for id in func.live_insts() {
                if let InstKind::Call { callee, .. } = func.inst(id).kind {
                    called.insert(callee);
                }
            }
        }
        let dead: Vec<FuncId> = module
            .functions()
            .filter(|(id, f)| f.is_declaration() && !called.contains(id))
            .map(|(id, _)| id)
            .collect();
        for &id in &dead {
            module.remove_function(id);
        }
        !dead.is_empty()
    }
}
