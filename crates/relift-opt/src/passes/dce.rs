//! Trivial dead-code elimination.

use relift_ir::Function;

use crate::pass::{FunctionPass, PassContext};
use crate::passes::util::remove_dead_insts;

/// Deletes instructions with no users and no side effects.
///
/// Dead cycles through phis survive; [`crate::passes::Adce`] removes those.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dce;

impl FunctionPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
        remove_dead_insts(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relift_image::ImageLayout;
    use relift_ir::{FunctionBuilder, InstKind, Param, Ty, Value};

    #[test]
    fn test_removes_chains_keeps_stores() {
        let mut f = Function::new("f", vec![Param::new("p", Ty::Ptr)], None);
        let entry = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        let a = b.load(Value::Arg(0), Ty::I64);
        let c = b.add(a, Value::int(1, Ty::I64));
        b.zext(c, Ty::I64);
        b.store(Value::Arg(0), Value::int(0, Ty::I64));
        b.ret(None);

        let image = ImageLayout::new(0);
        assert!(Dce.run_on_function(&mut f, &PassContext::new(&image)));
        let live = f.live_insts();
        assert_eq!(live.len(), 1);
        assert!(matches!(f.inst(live[0]).kind, InstKind::Store { .. }));
        assert!(!Dce.run_on_function(&mut f, &PassContext::new(&image)));
    }
}
