//! Remove internal functions nobody can reach.

use relift_ir::{FuncId, InstKind, Linkage, Module};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::pass::{ModulePass, PassContext};

/// Deletes internal functions that are not reachable through calls from any
/// externally visible definition.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalDce;

impl ModulePass for GlobalDce {
    fn name(&self) -> &'static str {
        "globaldce"
    }

    fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
        let mut live: FxHashSet<FuncId> = FxHashSet::default();
        let mut work: Vec<FuncId> = module
            .functions()
            .filter(|(_, f)| f.linkage == Linkage::External)
            .map(|(id, _)| id)
            .collect();
        while let Some(id) = work.pop() {
            if !live.insert(id) {
                continue;
            }
            let Some(func) = module.function(id) else {
                continue;
            };
            for inst in func.live_insts() {
                if let InstKind::Call { callee, .. } = func.inst(inst).kind {
                    work.push(callee);
                }
            }
        }

        let dead: Vec<FuncId> = module
            .function_ids()
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        for &id in &dead {
            if let Some(func) = module.remove_function(id) {
                debug!(func = %func.name, "removed unreachable function");
            }
        }
        !dead.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::ImageLayout;
    use relift_ir::{Function, FunctionBuilder};

    fn internal(name: &str) -> Function {
        let mut f = Function::new(name, Vec::new(), None);
        f.linkage = Linkage::Internal;
        let entry = f.add_block(None);
        f.set_terminator(entry, relift_ir::Terminator::Return(None));
        f
    }

    #[test]
    fn test_unreachable_internal_removed() {
        let mut module = Module::new("m");
        let helper = module.add_function(internal("helper"));
        let orphan = module.add_function(internal("orphan"));
        let chained = module.add_function(internal("chained"));

        // helper -> chained
        let f = module.function_mut(helper).unwrap();
        let entry = f.entry().unwrap();
        let mut b = FunctionBuilder::new(f, entry);
        b.call(chained, Vec::new(), None);
        b.ret(None);

        let mut root = Function::new("sub_1000", Vec::new(), None);
        let entry = root.add_block(None);
        let mut b = FunctionBuilder::new(&mut root, entry);
        b.call(helper, Vec::new(), None);
        b.ret(None);
        let root = module.add_function(root);

        let image = ImageLayout::new(0);
        assert!(GlobalDce.run_on_module(&mut module, &PassContext::new(&image)));
        assert!(module.function(orphan).is_none());
        assert!(module.function(helper).is_some());
        assert!(module.function(chained).is_some());
        assert!(module.function(root).is_some());
        assert!(!GlobalDce.run_on_module(&mut module, &PassContext::new(&image)));
    }
}
