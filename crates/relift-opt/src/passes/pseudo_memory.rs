//! Canonicalize pseudo-memory accesses to absolute addresses.

use relift_ir::{ArgRef, CastOp, InstKind, Module};

use crate::pass::{ModulePass, PassContext};

/// Rewrites `memory + c` on the pseudo-memory argument into `inttoptr c`.
///
/// The lifter models guest memory as one flat region based at the memory
/// argument, so an offset from it is an absolute guest address. After this
/// pass every constant-address access has the same spelling and later value
/// numbering can merge them. Computed offsets are rewritten the same way.
#[derive(Clone, Copy, Debug)]
pub struct PromotePseudoMemory {
    pub memory: ArgRef,
}

impl PromotePseudoMemory {
    pub const fn new(memory: ArgRef) -> Self {
        Self { memory }
    }
}

impl ModulePass for PromotePseudoMemory {
    fn name(&self) -> &'static str {
        "promote-pseudo-memory"
    }

    fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
        let Some(func) = module.function_mut(self.memory.func) else {
            return false;
        };
        let memory = self.memory.value();
        let mut changed = false;
        for id in func.live_insts() {
            let inst = func.inst_mut(id);
            if let InstKind::PtrAdd { base, offset } = inst.kind {
                if base == memory {
                    inst.kind = InstKind::Cast {
                        op: CastOp::IntToPtr,
                        value: offset,
                    };
                    changed = true;
                }
            }
        }
        changed
    }
}
