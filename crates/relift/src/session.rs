//! Worklist-driven lifting of whole functions.

use std::sync::Arc;

use relift_cfg::{
    BlockMap, BlockRegistry, BoundedEnumerator, BranchResolver, DiscoveryReason, FoldingSolver,
    GlobalMetrics, Outcome, ResolutionMetrics,
};
use relift_image::ImageLayout;
use relift_ir::{
    ArgRef, BlockId, FuncId, Function, InstKind, Module, Predicate, Terminator, Ty, Value,
};
use relift_opt::{MemoryPolicy, OptimizeReport, Optimizer, ScheduleParams};
use tracing::{debug, debug_span, trace, warn};

use crate::config::LiftConfig;
use crate::lifter::{BlockExit, BlockLifter};
use crate::{LiftError, Result};

/// What happened while lifting one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiftReport {
    pub blocks_lifted: usize,
    /// Addresses of blocks left ending in an indirect jump.
    pub unresolved: Vec<u64>,
    /// Addresses of blocks whose exits were picked from enumerated candidates.
    pub speculative: Vec<u64>,
    /// `(block address, target)` for every target outside the image.
    pub rejected: Vec<(u64, u64)>,
    /// Present when the optimizer ran.
    pub optimize: Option<OptimizeReport>,
}

/// A lifted function inside its own module.
#[derive(Debug)]
pub struct LiftedFunction {
    pub module: Module,
    pub func: FuncId,
    pub entry: u64,
    /// Address to block mapping and discovery reasons.
    pub blocks: BlockMap,
    pub report: LiftReport,
}

impl LiftedFunction {
    pub fn function(&self) -> Option<&Function> {
        self.module.function(self.func)
    }
}

/// Lifts functions out of one loaded image.
///
/// Starting from an entry address, the session asks its [`BlockLifter`] for
/// one block at a time, classifies each exit with the [`BranchResolver`], and
/// queues whatever new addresses that turns up. When the queue is empty the
/// function is optimized.
///
/// The default resolver's oracles read the image through the lifter's
/// pseudo-memory argument, limited by the configured [`MemoryPolicy`].
pub struct LiftSession<L: BlockLifter> {
    image: Arc<ImageLayout>,
    lifter: L,
    resolver: BranchResolver<Arc<ImageLayout>>,
    metrics: Arc<dyn ResolutionMetrics>,
    /// Set once the caller supplied its own resolver.
    custom_resolver: bool,
    config: LiftConfig,
}

impl<L: BlockLifter> LiftSession<L> {
    pub fn new(image: impl Into<Arc<ImageLayout>>, lifter: L) -> Self {
        let image = image.into();
        let config = LiftConfig::default();
        let metrics: Arc<dyn ResolutionMetrics> = Arc::new(GlobalMetrics);
        let resolver = image_resolver(&image, lifter.signature().memory, config.memory_policy)
            .with_metrics(Arc::clone(&metrics));
        Self {
            image,
            lifter,
            resolver,
            metrics,
            custom_resolver: false,
            config,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LiftConfig) -> Self {
        if !self.custom_resolver && config.memory_policy != self.config.memory_policy {
            let memory = self.lifter.signature().memory;
            self.resolver = image_resolver(&self.image, memory, config.memory_policy)
                .with_metrics(Arc::clone(&self.metrics));
        }
        self.config = config;
        self
    }

    /// Send resolver events somewhere other than the process-wide counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn ResolutionMetrics>) -> Self {
        self.resolver = self.resolver.with_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Replace the resolver, e.g. to plug in different oracles. Later
    /// [`Self::with_config`] calls keep it.
    #[must_use]
    pub fn with_resolver(mut self, resolver: BranchResolver<Arc<ImageLayout>>) -> Self {
        self.resolver = resolver;
        self.custom_resolver = true;
        self
    }

    pub const fn config(&self) -> &LiftConfig {
        &self.config
    }

    pub fn image(&self) -> &ImageLayout {
        &self.image
    }

    pub const fn lifter(&self) -> &L {
        &self.lifter
    }

    pub const fn lifter_mut(&mut self) -> &mut L {
        &mut self.lifter
    }

    /// Lift the function starting at `entry`.
    pub fn lift_function(&mut self, name: &str, entry: u64) -> Result<LiftedFunction> {
        let _span =
            debug_span!("lift_function", name, entry = format_args!("{entry:#x}")).entered();
        if !self.resolver.is_valid(entry) {
            return Err(LiftError::EntryOutsideImage(entry));
        }

        let signature = self.lifter.signature();
        let mut func = Function::new(name, signature.params.clone(), signature.ret);
        let mut blocks = BlockMap::new();
        let mut report = LiftReport::default();

        let head = blocks.get_or_create_block(&mut func, entry, DiscoveryReason::Entry);
        blocks.enqueue_pending(entry, head);

        while let Some((address, block)) = blocks.next_pending() {
            if report.blocks_lifted >= self.config.max_blocks {
                return Err(LiftError::BlockLimitExceeded {
                    function: name.to_string(),
                    limit: self.config.max_blocks,
                });
            }
            let exit = self.lifter.lift_block(&mut func, block, address)?;
            report.blocks_lifted += 1;
            trace!(address, %block, ?exit, "lifted block");
            let terminator =
                self.materialize(&mut func, &mut blocks, &mut report, block, address, exit);
            func.set_terminator(block, terminator);
        }

        let mut module = Module::new(name);
        let id = module.add_function(func);
        if self.config.optimize {
            let params = ScheduleParams::new(
                ArgRef::new(id, signature.stack),
                ArgRef::new(id, signature.memory),
            )
            .with_memory_policy(self.config.memory_policy);
            let optimizer = Optimizer::new().with_max_iterations(self.config.max_iterations);
            report.optimize = Some(optimizer.optimize(&mut module, &params, &self.image));
        }

        debug!(
            blocks = report.blocks_lifted,
            unresolved = report.unresolved.len(),
            speculative = report.speculative.len(),
            rejected = report.rejected.len(),
            "lifted function"
        );
        crate::metrics::record_lift(&report);

        Ok(LiftedFunction {
            module,
            func: id,
            entry,
            blocks,
            report,
        })
    }

    /// Terminator for `block`, which was lifted from `site` and exits via `exit`.
    fn materialize(
        &self,
        func: &mut Function,
        blocks: &mut BlockMap,
        report: &mut LiftReport,
        block: BlockId,
        site: u64,
        exit: BlockExit,
    ) -> Terminator {
        match exit {
            BlockExit::Return(value) => Terminator::Return(value),
            BlockExit::Jump(target) => self
                .direct(func, blocks, report, site, target)
                .map_or(Terminator::Unreachable, Terminator::Jump),
            BlockExit::Branch {
                cond,
                taken,
                fallthrough,
            } => {
                let mut edge = |target: u64| {
                    self.direct(func, blocks, report, site, target)
                        .unwrap_or_else(|| func.add_block(None))
                };
                let then_block = edge(taken);
                let else_block = edge(fallthrough);
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                }
            }
            BlockExit::Indirect(dest) => self.indirect(func, blocks, report, block, site, dest),
        }
    }

    /// Block for a statically known target, `None` if it lies outside the image.
    fn direct(
        &self,
        func: &mut Function,
        blocks: &mut BlockMap,
        report: &mut LiftReport,
        site: u64,
        target: u64,
    ) -> Option<BlockId> {
        if !self.resolver.is_valid(target) {
            warn!(site, target, "direct target outside image");
            report.rejected.push((site, target));
            return None;
        }
        let block = blocks.get_or_create_block(func, target, DiscoveryReason::DirectTarget);
        blocks.enqueue_pending(target, block);
        Some(block)
    }

    fn indirect(
        &self,
        func: &mut Function,
        blocks: &mut BlockMap,
        report: &mut LiftReport,
        block: BlockId,
        site: u64,
        dest: Value,
    ) -> Terminator {
        let resolution = self.resolver.resolve(func, dest, blocks);
        report
            .rejected
            .extend(resolution.rejected.iter().map(|&target| (site, target)));

        match (resolution.outcome, resolution.targets.as_slice()) {
            (Outcome::Solved(_), [target]) => Terminator::Jump(target.block),
            // Solved, but outside the image.
            (Outcome::Solved(_), _) => Terminator::Unreachable,
            (Outcome::Unsolved, [only]) => {
                report.speculative.push(site);
                Terminator::Jump(only.block)
            }
            (Outcome::Unsolved, [first, second]) => {
                report.speculative.push(site);
                let ty = func.value_ty(dest).unwrap_or(Ty::I64);
                let cond = func.append_inst(
                    block,
                    InstKind::Icmp {
                        pred: Predicate::Eq,
                        lhs: dest,
                        rhs: Value::int(first.address, ty),
                    },
                    Some(Ty::I1),
                );
                Terminator::Branch {
                    cond: Value::Inst(cond),
                    then_block: first.block,
                    else_block: second.block,
                }
            }
            (Outcome::Unsolved, _) => {
                debug!(site, %dest, "left indirect");
                report.unresolved.push(site);
                Terminator::IndirectJump { target: dest }
            }
        }
    }
}

/// Resolver whose oracles may read `image` through parameter `memory`.
///
/// The constraint solver only ever trusts read-only bytes; `policy` decides
/// what the enumerator may read.
fn image_resolver(
    image: &Arc<ImageLayout>,
    memory: u32,
    policy: MemoryPolicy,
) -> BranchResolver<Arc<ImageLayout>> {
    let resolver = BranchResolver::new(Arc::clone(image));
    if policy == MemoryPolicy::Never {
        return resolver;
    }
    let solver = FoldingSolver::new().with_image(Arc::clone(image), Some(memory));
    let enumerator = if policy == MemoryPolicy::AllMapped {
        BoundedEnumerator::new().with_image(Arc::clone(image), Some(memory))
    } else {
        BoundedEnumerator::new().with_readonly_image(Arc::clone(image), Some(memory))
    };
    resolver.with_solver(solver).with_enumerator(enumerator)
}
