//! Pass traits.

use relift_image::ImageLayout;
use relift_ir::{Function, Module};
use tracing::trace;

/// Read-only inputs shared by every pass in a run.
#[derive(Clone, Copy, Debug)]
pub struct PassContext<'a> {
    /// The binary the module was lifted from.
    pub image: &'a ImageLayout,
}

impl<'a> PassContext<'a> {
    pub const fn new(image: &'a ImageLayout) -> Self {
        Self { image }
    }
}

/// A transformation applied to one function body at a time.
pub trait FunctionPass {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Transform `func` in place. Returns `true` if anything changed.
    fn run_on_function(&self, func: &mut Function, ctx: &PassContext<'_>) -> bool;
}

/// A transformation that sees the whole module.
pub trait ModulePass {
    fn name(&self) -> &'static str;

    /// Transform `module` in place. Returns `true` if anything changed.
    fn run_on_module(&self, module: &mut Module, ctx: &PassContext<'_>) -> bool;
}

/// Runs a sequence of function passes over every defined function.
///
/// Each function goes through the whole sequence before the next one starts.
/// Declarations are skipped.
pub struct FunctionAdaptor {
    name: &'static str,
    passes: Vec<Box<dyn FunctionPass>>,
}

impl FunctionAdaptor {
    pub fn new(name: &'static str, passes: Vec<Box<dyn FunctionPass>>) -> Self {
        Self { name, passes }
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn FunctionPass> {
        self.passes.iter().map(AsRef::as_ref)
    }
}

impl ModulePass for FunctionAdaptor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run_on_module(&self, module: &mut Module, ctx: &PassContext<'_>) -> bool {
        let mut changed = false;
        for (id, func) in module.functions_mut() {
            if func.is_declaration() {
                continue;
            }
            for pass in &self.passes {
                if pass.run_on_function(func, ctx) {
                    trace!(pass = pass.name(), func = %id, "changed");
                    changed = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use relift_ir::{Param, Ty};

    struct Record(&'static str, Rc<RefCell<Vec<String>>>);

    impl FunctionPass for Record {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run_on_function(&self, func: &mut Function, _ctx: &PassContext<'_>) -> bool {
            self.1.borrow_mut().push(format!("{}:{}", self.0, func.name));
            false
        }
    }

    #[test]
    fn test_adaptor_order_skips_declarations() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut module = Module::new("m");
        let mut a = Function::new("a", Vec::new(), None);
        a.add_block(None);
        module.add_function(a);
        module.add_function(Function::new("decl", vec![Param::new("x", Ty::I64)], None));
        let mut b = Function::new("b", Vec::new(), None);
        b.add_block(None);
        module.add_function(b);

        let adaptor = FunctionAdaptor::new(
            "cleanup",
            vec![
                Box::new(Record("x", Rc::clone(&log))),
                Box::new(Record("y", Rc::clone(&log))),
            ],
        );
        let image = ImageLayout::new(0);
        assert!(!adaptor.run_on_module(&mut module, &PassContext::new(&image)));
        assert_eq!(*log.borrow(), vec!["x:a", "y:a", "x:b", "y:b"]);
    }
}
