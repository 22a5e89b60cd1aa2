//! Bounded fixpoint driver.

use relift_image::ImageLayout;
use relift_ir::Module;
use tracing::{debug, trace, trace_span};

use crate::pass::{FunctionAdaptor, FunctionPass, ModulePass, PassContext};
use crate::passes::{
    Adce, Dce, EarlyCse, GepLoad, GlobalDce, Gvn, InstCombine, Mem2Reg, PromotePseudoMemory,
    PromotePseudoStack, ReplaceTruncWithLoad, SimplifyCfg, StripDeadPrototypes,
};
use crate::schedule::{PassSchedule, PassStep, Phase, ScheduleParams, build_schedule};

/// Upper bound on full runs of the schedule.
pub const MAX_ITERATIONS: usize = 3;

/// What a call to [`run_to_fixpoint`] did. Informational only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Full runs of the pass list.
    pub iterations: usize,
    pub initial_instructions: usize,
    pub final_instructions: usize,
}

impl OptimizeReport {
    /// Instructions removed over the whole run.
    pub const fn removed(&self) -> usize {
        self.initial_instructions
            .saturating_sub(self.final_instructions)
    }
}

/// Run `passes` in order, repeatedly, until a run fails to lower the module's
/// instruction count or `max_iterations` runs have happened.
pub fn run_to_fixpoint(
    passes: &[Box<dyn ModulePass>],
    module: &mut Module,
    ctx: &PassContext<'_>,
    max_iterations: usize,
) -> OptimizeReport {
    let initial_instructions = module.instruction_count();
    let mut before = initial_instructions;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        let _span = trace_span!("iteration", n = iterations).entered();
        for pass in passes {
            let changed = pass.run_on_module(module, ctx);
            trace!(pass = pass.name(), changed, "ran pass");
        }
        let after = module.instruction_count();
        debug!(iteration = iterations, before, after, "optimization round");
        if after >= before {
            break;
        }
        before = after;
    }

    OptimizeReport {
        iterations,
        initial_instructions,
        final_instructions: module.instruction_count(),
    }
}

/// Turn a schedule into runnable passes.
///
/// Consecutive steps of a per-function phase share one [`FunctionAdaptor`],
/// so each function runs through the whole group before the next one starts.
pub fn instantiate(schedule: &PassSchedule) -> Vec<Box<dyn ModulePass>> {
    let mut passes: Vec<Box<dyn ModulePass>> = Vec::new();
    let mut group: Option<(Phase, Vec<Box<dyn FunctionPass>>)> = None;

    for &(phase, step) in schedule.steps() {
        let boundary = group
            .as_ref()
            .is_some_and(|(current, _)| *current != phase || !phase.is_per_function());
        if boundary {
            flush(&mut passes, group.take());
        }
        match function_pass(step) {
            Some(pass) if phase.is_per_function() => {
                group.get_or_insert_with(|| (phase, Vec::new())).1.push(pass);
            }
            Some(pass) => passes.push(Box::new(FunctionAdaptor::new(step.name(), vec![pass]))),
            None => {
                if let Some(pass) = module_pass(step) {
                    passes.push(pass);
                }
            }
        }
    }
    flush(&mut passes, group.take());
    passes
}

fn flush(
    passes: &mut Vec<Box<dyn ModulePass>>,
    group: Option<(Phase, Vec<Box<dyn FunctionPass>>)>,
) {
    if let Some((phase, members)) = group {
        passes.push(Box::new(FunctionAdaptor::new(phase.name(), members)));
    }
}

fn function_pass(step: PassStep) -> Option<Box<dyn FunctionPass>> {
    let pass: Box<dyn FunctionPass> = match step {
        PassStep::Mem2Reg => Box::new(Mem2Reg),
        PassStep::InstCombine => Box::new(InstCombine),
        PassStep::SimplifyCfg => Box::new(SimplifyCfg),
        PassStep::EarlyCse { memory_aware } => Box::new(EarlyCse::new(memory_aware)),
        PassStep::Dce => Box::new(Dce),
        PassStep::Gvn => Box::new(Gvn),
        PassStep::Adce => Box::new(Adce),
        _ => return None,
    };
    Some(pass)
}

fn module_pass(step: PassStep) -> Option<Box<dyn ModulePass>> {
    let pass: Box<dyn ModulePass> = match step {
        PassStep::GepLoad { memory, policy } => Box::new(GepLoad::new(memory, policy)),
        PassStep::ReplaceTruncWithLoad => Box::new(ReplaceTruncWithLoad),
        PassStep::PromotePseudoStack { stack } => Box::new(PromotePseudoStack::new(stack)),
        PassStep::PromotePseudoMemory { memory } => Box::new(PromotePseudoMemory::new(memory)),
        PassStep::GlobalDce => Box::new(GlobalDce),
        PassStep::StripDeadPrototypes => Box::new(StripDeadPrototypes),
        _ => return None,
    };
    Some(pass)
}

/// Runs the standard pipeline on lifted modules.
#[derive(Clone, Copy, Debug)]
pub struct Optimizer {
    max_iterations: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub const fn new() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Optimize `module` in place with the schedule built from `params`.
    pub fn optimize(
        &self,
        module: &mut Module,
        params: &ScheduleParams,
        image: &ImageLayout,
    ) -> OptimizeReport {
        let schedule = build_schedule(params);
        let passes = instantiate(&schedule);
        let ctx = PassContext::new(image);
        let report = run_to_fixpoint(&passes, module, &ctx, self.max_iterations);
        debug!(
            iterations = report.iterations,
            before = report.initial_instructions,
            after = report.final_instructions,
            "optimized module"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use relift_ir::{
        ArgRef, Function, FunctionBuilder, InstKind, Param, Terminator, Ty, Value,
    };

    /// Removes one instruction per run until `budget` is spent.
    struct Shrink {
        budget: Cell<usize>,
        runs: Rc<Cell<usize>>,
    }

    impl ModulePass for Shrink {
        fn name(&self) -> &'static str {
            "shrink"
        }

        fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
            self.runs.set(self.runs.get() + 1);
            if self.budget.get() == 0 {
                return false;
            }
            self.budget.set(self.budget.get() - 1);
            let Some((_, func)) = module.functions_mut().next() else {
                return false;
            };
            let Some(&id) = func.live_insts().first() else {
                return false;
            };
            func.remove_inst(id);
            true
        }
    }

    fn padded(count: usize) -> Module {
        let mut f = Function::new("f", Vec::new(), None);
        let entry = f.add_block(None);
        let mut b = FunctionBuilder::new(&mut f, entry);
        for _ in 0..count {
            b.alloca(8);
        }
        b.ret(None);
        let mut module = Module::new("m");
        module.add_function(f);
        module
    }

    fn run_shrink(budget: usize) -> (OptimizeReport, usize) {
        let runs = Rc::new(Cell::new(0));
        let passes: Vec<Box<dyn ModulePass>> = vec![Box::new(Shrink {
            budget: Cell::new(budget),
            runs: Rc::clone(&runs),
        })];
        let mut module = padded(10);
        let image = ImageLayout::new(0);
        let ctx = PassContext::new(&image);
        let report = run_to_fixpoint(&passes, &mut module, &ctx, MAX_ITERATIONS);
        (report, runs.get())
    }

    #[test]
    fn test_stops_when_no_longer_shrinking() {
        let (report, runs) = run_shrink(1);
        assert_eq!(runs, 2);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.initial_instructions, 11);
        assert_eq!(report.final_instructions, 10);
        assert_eq!(report.removed(), 1);
    }

    #[test]
    fn test_iteration_cap() {
        let (report, runs) = run_shrink(usize::MAX);
        assert_eq!(runs, MAX_ITERATIONS);
        assert_eq!(report.iterations, MAX_ITERATIONS);
        assert_eq!(report.final_instructions, 11 - MAX_ITERATIONS);
    }

    #[test]
    fn test_already_minimal_runs_once() {
        let (report, runs) = run_shrink(0);
        assert_eq!(runs, 1);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.removed(), 0);
    }

    #[test]
    fn test_instantiate_groups_phases() {
        let params = ScheduleParams::new(
            ArgRef::new(relift_ir::FuncId(0), 0),
            ArgRef::new(relift_ir::FuncId(0), 1),
        );
        let passes = instantiate(&build_schedule(&params));
        let names: Vec<&str> = passes.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "early-cleanup",
                "gep-load",
                "replace-trunc-with-load",
                "promote-pseudo-stack",
                "promote-pseudo-memory",
                "late-cleanup",
                "globaldce",
                "strip-dead-prototypes",
            ]
        );
    }

    /// A lifted function that spills a register to the pseudo stack, reloads
    /// it, and reads a constant through pseudo memory.
    #[test]
    fn test_optimize_lifted_function() {
        use relift_image::{SEC_READ, Section};

        let base = 0x1_4000_0000;
        let image = ImageLayout::new(base).with_section(
            Section::new(".rdata", 0x3000, 0x10, SEC_READ).with_data(vec![0x10, 0, 0, 0]),
        );

        let mut f = Function::new(
            "sub_140001000",
            vec![
                Param::new("rcx", Ty::I64),
                Param::new("stack", Ty::Ptr),
                Param::new("memory", Ty::Ptr),
            ],
            Some(Ty::I64),
        );
        let entry = f.add_block(Some(base + 0x1000));
        let tail = f.add_block(Some(base + 0x1010));
        let mut b = FunctionBuilder::new(&mut f, entry);
        let rax = b.alloca(8);
        let spill = b.ptr_offset(Value::Arg(1), -8);
        b.store(spill, Value::Arg(0));
        let global = b.ptr_offset(Value::Arg(2), 0x1_4000_3000);
        let word = b.load(global, Ty::I32);
        let wide = b.zext(word, Ty::I64);
        b.store(rax, wide);
        b.jump(tail);
        b.position_at(tail);
        let reload_at = b.ptr_offset(Value::Arg(1), -8);
        let reloaded = b.load(reload_at, Ty::I64);
        let current = b.load(rax, Ty::I64);
        let sum = b.add(reloaded, current);
        let zero = b.sub(sum, sum);
        let result = b.add(sum, zero);
        b.ret(Some(result));

        let mut module = Module::new("m");
        let id = module.add_function(f);
        let params = ScheduleParams::new(ArgRef::new(id, 1), ArgRef::new(id, 2));
        let report = Optimizer::new().optimize(&mut module, &params, &image);

        assert!(report.iterations >= 1 && report.iterations <= MAX_ITERATIONS);
        assert!(report.final_instructions < report.initial_instructions);
        let f = module.function(id).unwrap();
        assert_eq!(f.block_count(), 1);
        let live = f.live_insts();
        assert_eq!(live.len(), 1);
        assert_eq!(
            f.inst(live[0]).kind,
            InstKind::Binary {
                op: relift_ir::BinOp::Add,
                lhs: Value::Arg(0),
                rhs: Value::int(0x10, Ty::I64)
            }
        );
        assert_eq!(
            *f.terminator(f.entry().unwrap()),
            Terminator::Return(Some(Value::Inst(live[0])))
        );
    }
}
