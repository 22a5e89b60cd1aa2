//! Fold loads from known image addresses into constants.

use relift_ir::{ArgRef, Function, InstId, InstKind, Module, Ty, Value};
use tracing::debug;

use crate::pass::{ModulePass, PassContext};
use crate::passes::util::constant_address;
use crate::schedule::MemoryPolicy;

/// Replaces an integer load whose pointer is a constant address (either
/// `memory + c` on the pseudo-memory argument or `inttoptr c`) with the value
/// the image holds there.
///
/// Which bytes count as stable is decided by the [`MemoryPolicy`]. Only the
/// function owning the `memory` argument is rewritten.
#[derive(Clone, Copy, Debug)]
pub struct GepLoad {
    pub memory: ArgRef,
    pub policy: MemoryPolicy,
}

impl GepLoad {
    pub const fn new(memory: ArgRef, policy: MemoryPolicy) -> Self {
        Self { memory, policy }
    }

    fn fold(&self, func: &Function, id: InstId, ctx: &PassContext<'_>) -> Option<(u64, Ty)> {
        let inst = func.inst(id);
        let InstKind::Load { ptr } = inst.kind else {
            return None;
        };
        let ty = inst.ty.filter(|ty| !ty.is_ptr())?;
        let address = constant_address(func, ptr, Some(self.memory.index))?;
        let value = match self.policy {
            MemoryPolicy::Never => None,
            MemoryPolicy::ReadOnly => ctx.image.read_readonly(address, ty.bytes()),
            MemoryPolicy::AllMapped => ctx.image.read(address, ty.bytes()),
        }?;
        debug!(address, value, func = %func.name, "folded load from image");
        Some((value, ty))
    }
}

impl ModulePass for GepLoad {
    fn name(&self) -> &'static str {
        "gep-load"
    }

    fn run_on_module(&self, module: &mut Module, ctx: &PassContext<'_>) -> bool {
        if self.policy == MemoryPolicy::Never {
            return false;
        }
        let Some(func) = module.function_mut(self.memory.func) else {
            return false;
        };
        let mut changed = false;
        for id in func.live_insts() {
            if let Some((value, ty)) = self.fold(func, id, ctx) {
                func.replace_all_uses(Value::Inst(id), Value::int(value, ty));
                func.remove_inst(id);
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::{ImageLayout, SEC_READ, SEC_WRITE, Section};
    use relift_ir::{FuncId, FunctionBuilder, Param, Terminator};

    const BASE: u64 = 0x1_4000_0000;

    fn image() -> ImageLayout {
        ImageLayout::new(BASE)
            .with_section(
                Section::new(".rdata", 0x1000, 0x100, SEC_READ)
                    .with_data(vec![0x78, 0x56, 0x34, 0x12]),
            )
            .with_section(
                Section::new(".data", 0x2000, 0x100, SEC_READ | SEC_WRITE)
                    .with_data(vec![0xaa, 0xbb]),
            )
    }

    /// `ret load(memory + rdata) + load(inttoptr data)`
    fn module() -> (Module, FuncId, Value, Value) {
        let mut f = Function::new(
            "sub_140001000",
            vec![Param::new("stack", Ty::Ptr), Param::new("memory", Ty::Ptr)],
            Some(Ty::I64),
        );
        let entry = f.add_block(Some(BASE + 0x1000));
        let mut b = FunctionBuilder::new(&mut f, entry);
        let rdata = b.ptr_offset(Value::Arg(1), i64::try_from(BASE + 0x1000).unwrap());
        let constant = b.load(rdata, Ty::I32);
        let data = b.int_to_ptr(Value::int(BASE + 0x2000, Ty::I64));
        let mutable = b.load(data, Ty::I16);
        let wide = b.zext(mutable, Ty::I32);
        let sum = b.add(constant, wide);
        b.ret(Some(sum));
        let mut module = Module::new("m");
        let id = module.add_function(f);
        (module, id, constant, mutable)
    }

    fn run(module: &mut Module, func: FuncId, policy: MemoryPolicy) -> bool {
        let image = image();
        GepLoad::new(ArgRef::new(func, 1), policy).run_on_module(module, &PassContext::new(&image))
    }

    #[test]
    fn test_read_only_policy() {
        let (mut module, id, constant, mutable) = module();
        assert!(run(&mut module, id, MemoryPolicy::ReadOnly));
        let f = module.function(id).unwrap();
        assert!(!f.is_live(constant.as_inst().unwrap()));
        assert!(f.is_live(mutable.as_inst().unwrap()));
        let users = f.users();
        assert!(!users.contains_key(&constant));
    }

    #[test]
    fn test_all_mapped_policy() {
        let (mut module, id, constant, mutable) = module();
        assert!(run(&mut module, id, MemoryPolicy::AllMapped));
        let f = module.function(id).unwrap();
        assert!(!f.is_live(constant.as_inst().unwrap()));
        assert!(!f.is_live(mutable.as_inst().unwrap()));
        let zext = f
            .live_insts()
            .into_iter()
            .find(|&i| {
                matches!(f.inst(i).kind, InstKind::Cast { .. }) && f.inst(i).ty == Some(Ty::I32)
            })
            .unwrap();
        assert_eq!(
            f.inst(zext).kind.operands(),
            vec![Value::int(0xbbaa, Ty::I16)]
        );
    }

    #[test]
    fn test_never_policy() {
        let (mut module, id, _, _) = module();
        let before = module.instruction_count();
        assert!(!run(&mut module, id, MemoryPolicy::Never));
        assert_eq!(module.instruction_count(), before);
        let f = module.function(id).unwrap();
        assert!(matches!(f.terminator(f.entry().unwrap()), Terminator::Return(Some(_))));
    }
}
