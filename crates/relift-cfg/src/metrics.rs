//! Resolution instrumentation.

use std::sync::atomic::{AtomicU64, Ordering};

/// One observation made by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionEvent {
    /// `resolve` was called.
    Call,
    /// Destination was a literal.
    SolvedConstant,
    /// Destination was pinned down by the constraint solver.
    SolvedConstraint,
    /// Enumeration produced no candidates.
    ZeroCandidates,
    /// Enumeration produced exactly one candidate.
    OneCandidate,
    /// Enumeration produced exactly two candidates.
    TwoCandidates,
}

/// Sink for resolver observations. Implementations must tolerate concurrent sessions.
pub trait ResolutionMetrics: Send + Sync {
    fn record(&self, event: ResolutionEvent);
}

/// Discards every observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl ResolutionMetrics for NoopMetrics {
    fn record(&self, _event: ResolutionEvent) {}
}

/// Point-in-time copy of [`ResolutionCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub calls: u64,
    pub solved_constant: u64,
    pub solved_constraint: u64,
    pub zero_candidates: u64,
    pub one_candidate: u64,
    pub two_candidates: u64,
}

/// Six monotonically increasing atomic counters.
#[derive(Debug, Default)]
pub struct ResolutionCounters {
    calls: AtomicU64,
    solved_constant: AtomicU64,
    solved_constraint: AtomicU64,
    zero_candidates: AtomicU64,
    one_candidate: AtomicU64,
    two_candidates: AtomicU64,
}

static GLOBAL_COUNTERS: ResolutionCounters = ResolutionCounters::new();

impl ResolutionCounters {
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            solved_constant: AtomicU64::new(0),
            solved_constraint: AtomicU64::new(0),
            zero_candidates: AtomicU64::new(0),
            one_candidate: AtomicU64::new(0),
            two_candidates: AtomicU64::new(0),
        }
    }

    /// Process-wide counters shared by every session that does not inject its own.
    pub fn global() -> &'static Self {
        &GLOBAL_COUNTERS
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            solved_constant: self.solved_constant.load(Ordering::Relaxed),
            solved_constraint: self.solved_constraint.load(Ordering::Relaxed),
            zero_candidates: self.zero_candidates.load(Ordering::Relaxed),
            one_candidate: self.one_candidate.load(Ordering::Relaxed),
            two_candidates: self.two_candidates.load(Ordering::Relaxed),
        }
    }

    const fn counter(&self, event: ResolutionEvent) -> &AtomicU64 {
        match event {
            ResolutionEvent::Call => &self.calls,
            ResolutionEvent::SolvedConstant => &self.solved_constant,
            ResolutionEvent::SolvedConstraint => &self.solved_constraint,
            ResolutionEvent::ZeroCandidates => &self.zero_candidates,
            ResolutionEvent::OneCandidate => &self.one_candidate,
            ResolutionEvent::TwoCandidates => &self.two_candidates,
        }
    }
}

impl ResolutionMetrics for ResolutionCounters {
    fn record(&self, event: ResolutionEvent) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards to [`ResolutionCounters::global`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetrics;

impl ResolutionMetrics for GlobalMetrics {
    fn record(&self, event: ResolutionEvent) {
        ResolutionCounters::global().record(event);
    }
}
