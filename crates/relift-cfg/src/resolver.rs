//! Branch target resolution.
//!
//! Destinations are classified in three tiers, first success wins:
//!
//! 1. a literal destination is solved outright,
//! 2. the [`ConstraintSolver`] may pin it to one value,
//! 3. the [`CandidateEnumerator`] lists what it may be.
//!
//! Solves from the first two tiers are authoritative. An out-of-range
//! authoritative target is still reported as [`Outcome::Solved`] but never
//! scheduled. Enumerated candidates are speculative and always leave the
//! outcome [`Outcome::Unsolved`], even when blocks get scheduled for them.

use std::sync::Arc;

use relift_ir::{BlockId, Function, Value};
use tracing::{debug, trace, warn};

use crate::metrics::{GlobalMetrics, ResolutionEvent, ResolutionMetrics};
use crate::oracle::{BoundedEnumerator, CandidateEnumerator, ConstraintSolver, FoldingSolver};
use crate::range::{AddressRange, AddressRangeOracle, SectionSource};
use crate::registry::{BlockRegistry, DiscoveryReason};

/// Classification of a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Destination is known to be exactly this address.
    Solved(u64),
    /// Destination is not pinned down. Candidates may still have been scheduled.
    Unsolved,
}

/// A block handed to the registry during one resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTarget {
    pub address: u64,
    pub reason: DiscoveryReason,
    pub block: BlockId,
}

/// Result of [`BranchResolver::resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    /// Scheduled blocks in candidate order (true edge first).
    pub targets: Vec<ScheduledTarget>,
    /// Addresses that fell outside the loaded image.
    pub rejected: Vec<u64>,
}

impl Resolution {
    const fn unsolved() -> Self {
        Self {
            outcome: Outcome::Unsolved,
            targets: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub const fn is_solved(&self) -> bool {
        matches!(self.outcome, Outcome::Solved(_))
    }

    /// Solved destination address, if any.
    pub const fn dest(&self) -> Option<u64> {
        match self.outcome {
            Outcome::Solved(address) => Some(address),
            Outcome::Unsolved => None,
        }
    }

    /// Block scheduled for `reason`, if any.
    pub fn target(&self, reason: DiscoveryReason) -> Option<&ScheduledTarget> {
        self.targets.iter().find(|t| t.reason == reason)
    }
}

/// Resolves computed destinations against one loaded image.
///
/// A resolver is scoped to one lifting session: it memoizes the image's
/// [`AddressRange`] and is not meant to be shared between threads.
pub struct BranchResolver<S: SectionSource> {
    range: AddressRangeOracle<S>,
    solver: Box<dyn ConstraintSolver>,
    enumerator: Box<dyn CandidateEnumerator>,
    metrics: Arc<dyn ResolutionMetrics>,
}

impl<S: SectionSource> BranchResolver<S> {
    /// Resolver with the default oracles, reporting to the process-wide counters.
    pub fn new(source: S) -> Self {
        Self {
            range: AddressRangeOracle::new(source),
            solver: Box::new(FoldingSolver::new()),
            enumerator: Box::new(BoundedEnumerator::new()),
            metrics: Arc::new(GlobalMetrics),
        }
    }

    #[must_use]
    pub fn with_solver(mut self, solver: impl ConstraintSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    #[must_use]
    pub fn with_enumerator(mut self, enumerator: impl CandidateEnumerator + 'static) -> Self {
        self.enumerator = Box::new(enumerator);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn ResolutionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn range(&self) -> AddressRange {
        self.range.range()
    }

    pub fn is_valid(&self, address: u64) -> bool {
        self.range.is_valid(address)
    }

    /// Classify `dest` and schedule any valid target through `registry`.
    ///
    /// The resolver itself never touches terminators; it only asks the registry
    /// for blocks, which may add empty blocks to `func`.
    pub fn resolve(
        &self,
        func: &mut Function,
        dest: Value,
        registry: &mut dyn BlockRegistry,
    ) -> Resolution {
        self.metrics.record(ResolutionEvent::Call);

        if let Some(constant) = dest.as_const() {
            self.metrics.record(ResolutionEvent::SolvedConstant);
            return self.authoritative(
                func,
                registry,
                constant.bits(),
                DiscoveryReason::ConstantResolved,
            );
        }

        if let Some(address) = self.solver.solve_deterministic(func, dest) {
            self.metrics.record(ResolutionEvent::SolvedConstraint);
            return self.authoritative(
                func,
                registry,
                address,
                DiscoveryReason::ConstraintResolved,
            );
        }

        let candidates: Vec<u64> = self
            .enumerator
            .enumerate_candidates(func, dest)
            .into_iter()
            .collect();
        match *candidates.as_slice() {
            [] => {
                self.metrics.record(ResolutionEvent::ZeroCandidates);
                trace!(%dest, "no candidates");
                Resolution::unsolved()
            }
            [address] => {
                self.metrics.record(ResolutionEvent::OneCandidate);
                let mut resolution = Resolution::unsolved();
                if self.is_valid(address) {
                    resolution.targets.push(self.schedule(
                        func,
                        registry,
                        address,
                        DiscoveryReason::SingleCandidate,
                    ));
                } else {
                    debug!(address, "single candidate outside image");
                    resolution.rejected.push(address);
                }
                resolution
            }
            [first, second] => {
                self.metrics.record(ResolutionEvent::TwoCandidates);
                let mut resolution = Resolution::unsolved();
                resolution.rejected = [first, second]
                    .into_iter()
                    .filter(|&a| !self.is_valid(a))
                    .collect();
                if resolution.rejected.is_empty() {
                    resolution.targets.push(self.schedule(
                        func,
                        registry,
                        first,
                        DiscoveryReason::BranchTrueEdge,
                    ));
                    resolution.targets.push(self.schedule(
                        func,
                        registry,
                        second,
                        DiscoveryReason::BranchFalseEdge,
                    ));
                } else {
                    debug!(first, second, "conditional candidate outside image");
                }
                resolution
            }
            _ => {
                debug!(count = candidates.len(), "too many candidates");
                Resolution::unsolved()
            }
        }
    }

    fn authoritative(
        &self,
        func: &mut Function,
        registry: &mut dyn BlockRegistry,
        address: u64,
        reason: DiscoveryReason,
    ) -> Resolution {
        let mut resolution = Resolution {
            outcome: Outcome::Solved(address),
            targets: Vec::new(),
            rejected: Vec::new(),
        };
        if self.is_valid(address) {
            resolution
                .targets
                .push(self.schedule(func, registry, address, reason));
        } else {
            let range = self.range();
            warn!(
                address,
                low = range.low,
                high = range.high,
                %reason,
                "resolved target outside image"
            );
            resolution.rejected.push(address);
        }
        resolution
    }

    fn schedule(
        &self,
        func: &mut Function,
        registry: &mut dyn BlockRegistry,
        address: u64,
        reason: DiscoveryReason,
    ) -> ScheduledTarget {
        let block = registry.get_or_create_block(func, address, reason);
        registry.enqueue_pending(address, block);
        trace!(address, %block, %reason, "scheduled target");
        ScheduledTarget {
            address,
            reason,
            block,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::metrics::{CounterSnapshot, NoopMetrics, ResolutionCounters};
    use crate::registry::BlockMap;
    use relift_image::{ImageLayout, SEC_EXEC, SEC_READ, Section};
    use relift_ir::{Param, Ty};

    const BASE: u64 = 0x1_4000_0000;
    const IN_A: u64 = 0x1_4000_1500;
    const IN_B: u64 = 0x1_4000_2000;
    const OUT: u64 = 0x1_4000_4000;

    struct NoSolve;

    impl ConstraintSolver for NoSolve {
        fn solve_deterministic(&self, _func: &Function, _value: Value) -> Option<u64> {
            None
        }
    }

    struct FixedSolve(u64);

    impl ConstraintSolver for FixedSolve {
        fn solve_deterministic(&self, _func: &Function, _value: Value) -> Option<u64> {
            Some(self.0)
        }
    }

    struct Fixed(Vec<u64>);

    impl CandidateEnumerator for Fixed {
        fn enumerate_candidates(&self, _func: &Function, _value: Value) -> BTreeSet<u64> {
            self.0.iter().copied().collect()
        }
    }

    fn image() -> ImageLayout {
        ImageLayout::new(BASE).with_section(Section::new(
            ".text",
            0x1000,
            0x2000,
            SEC_READ | SEC_EXEC,
        ))
    }

    fn setup(
        candidates: &[u64],
    ) -> (
        BranchResolver<ImageLayout>,
        Arc<ResolutionCounters>,
        Function,
        BlockMap,
    ) {
        let counters = Arc::new(ResolutionCounters::new());
        let resolver = BranchResolver::new(image())
            .with_solver(NoSolve)
            .with_enumerator(Fixed(candidates.to_vec()))
            .with_metrics(counters.clone());
        let func = Function::new("f", vec![Param::new("x", Ty::I64)], None);
        (resolver, counters, func, BlockMap::new())
    }

    fn pending(map: &mut BlockMap) -> Vec<u64> {
        std::iter::from_fn(|| map.next_pending().map(|(a, _)| a)).collect()
    }

    #[test]
    fn test_literal_in_range() {
        let (resolver, counters, mut f, mut map) = setup(&[]);
        let r = resolver.resolve(&mut f, Value::int(IN_A, Ty::I64), &mut map);
        assert_eq!(r.outcome, Outcome::Solved(IN_A));
        assert_eq!(r.targets.len(), 1);
        assert_eq!(r.targets[0].reason, DiscoveryReason::ConstantResolved);
        assert_eq!(pending(&mut map), vec![IN_A]);
        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                calls: 1,
                solved_constant: 1,
                ..CounterSnapshot::default()
            }
        );
    }

    #[test]
    fn test_literal_out_of_range_is_terminal() {
        let (resolver, counters, mut f, mut map) = setup(&[]);
        let r = resolver.resolve(&mut f, Value::int(OUT, Ty::I64), &mut map);
        assert_eq!(r.dest(), Some(OUT));
        assert!(r.targets.is_empty());
        assert_eq!(r.rejected, vec![OUT]);
        assert!(map.is_empty());
        assert_eq!(f.block_count(), 0);
        assert_eq!(counters.snapshot().solved_constant, 1);
    }

    #[test]
    fn test_constraint_tier() {
        let counters = Arc::new(ResolutionCounters::new());
        let resolver = BranchResolver::new(image())
            .with_solver(FixedSolve(IN_B))
            .with_enumerator(Fixed(vec![IN_A]))
            .with_metrics(counters.clone());
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], None);
        let mut map = BlockMap::new();
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Solved(IN_B));
        assert_eq!(r.targets[0].reason, DiscoveryReason::ConstraintResolved);
        assert_eq!(map.reason(IN_B), Some(DiscoveryReason::ConstraintResolved));
        let snap = counters.snapshot();
        assert_eq!(snap.solved_constraint, 1);
        assert_eq!(snap.one_candidate, 0);
    }

    #[test]
    fn test_constraint_out_of_range_is_terminal() {
        let counters = Arc::new(ResolutionCounters::new());
        let resolver = BranchResolver::new(image())
            .with_solver(FixedSolve(OUT))
            .with_enumerator(Fixed(vec![IN_A, IN_B]))
            .with_metrics(counters.clone());
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], None);
        let mut map = BlockMap::new();
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Solved(OUT));
        assert!(r.targets.is_empty());
        assert_eq!(r.rejected, vec![OUT]);
        assert!(map.is_empty());
        assert_eq!(f.block_count(), 0);
        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                calls: 1,
                solved_constraint: 1,
                ..CounterSnapshot::default()
            }
        );
    }

    /// Shared buffer the fmt subscriber writes into.
    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_out_of_range_warns() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let (resolver, _, mut f, mut map) = setup(&[]);
        tracing::subscriber::with_default(subscriber, || {
            resolver.resolve(&mut f, Value::int(OUT, Ty::I64), &mut map);
            resolver.resolve(&mut f, Value::int(IN_A, Ty::I64), &mut map);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("resolved target outside image").count(), 1);
        assert!(output.contains("WARN"));
        assert!(output.contains(&format!("address={OUT}")));
    }

    #[test]
    fn test_zero_candidates() {
        let (resolver, counters, mut f, mut map) = setup(&[]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Unsolved);
        assert!(r.targets.is_empty());
        assert_eq!(counters.snapshot().zero_candidates, 1);
    }

    #[test]
    fn test_single_candidate_stays_unsolved() {
        let (resolver, counters, mut f, mut map) = setup(&[IN_A]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Unsolved);
        assert!(r.target(DiscoveryReason::SingleCandidate).is_some());
        assert_eq!(pending(&mut map), vec![IN_A]);
        assert_eq!(counters.snapshot().one_candidate, 1);
    }

    #[test]
    fn test_single_candidate_out_of_range() {
        let (resolver, _, mut f, mut map) = setup(&[OUT]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Unsolved);
        assert!(r.targets.is_empty());
        assert_eq!(r.rejected, vec![OUT]);
    }

    #[test]
    fn test_two_candidates() {
        let (resolver, counters, mut f, mut map) = setup(&[IN_B, IN_A]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Unsolved);
        let edges: Vec<(u64, DiscoveryReason)> =
            r.targets.iter().map(|t| (t.address, t.reason)).collect();
        assert_eq!(
            edges,
            vec![
                (IN_A, DiscoveryReason::BranchTrueEdge),
                (IN_B, DiscoveryReason::BranchFalseEdge)
            ]
        );
        assert_eq!(pending(&mut map), vec![IN_A, IN_B]);
        assert_eq!(counters.snapshot().two_candidates, 1);
    }

    #[test]
    fn test_two_candidates_all_or_nothing() {
        let (resolver, _, mut f, mut map) = setup(&[IN_A, OUT]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert!(r.targets.is_empty());
        assert_eq!(r.rejected, vec![OUT]);
        assert!(map.is_empty());
    }

    #[test]
    fn test_three_candidates_give_up() {
        let (resolver, counters, mut f, mut map) = setup(&[IN_A, IN_B, IN_B + 4]);
        let r = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(r.outcome, Outcome::Unsolved);
        assert!(r.targets.is_empty());
        assert!(map.is_empty());
        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                calls: 1,
                ..CounterSnapshot::default()
            }
        );
    }

    #[test]
    fn test_converging_targets_share_block() {
        let (resolver, _, mut f, mut map) = setup(&[IN_A]);
        let first = resolver.resolve(&mut f, Value::int(IN_A, Ty::I64), &mut map);
        let second = resolver.resolve(&mut f, Value::Arg(0), &mut map);
        assert_eq!(first.targets[0].block, second.targets[0].block);
        assert_eq!(pending(&mut map), vec![IN_A]);
        assert_eq!(f.block_count(), 1);
    }

    #[test]
    fn test_default_oracles() {
        let resolver = BranchResolver::new(image()).with_metrics(Arc::new(NoopMetrics));
        let mut f = Function::new("f", vec![Param::new("x", Ty::I64)], None);
        let entry = f.add_block(Some(0x1_4000_1000));
        let mut b = relift_ir::FunctionBuilder::new(&mut f, entry);
        let cond = b.icmp(relift_ir::Predicate::Eq, Value::Arg(0), Value::int(0, Ty::I64));
        let dest = b.select(cond, Value::int(IN_A, Ty::I64), Value::int(IN_B, Ty::I64));
        let mut map = BlockMap::new();
        let r = resolver.resolve(&mut f, dest, &mut map);
        assert_eq!(r.targets.len(), 2);
        assert_eq!(r.targets[0].address, IN_A);
    }
}
