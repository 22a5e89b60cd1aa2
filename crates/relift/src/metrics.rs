//! Metrics through the `metrics` facade.
//!
//! [`MetricsFacade`] forwards branch resolution events to whatever recorder
//! is installed, and [`record_lift`] publishes per-function totals.
//! [`SummaryRecorder`] is a small in-memory recorder for terminal summaries.

use std::fmt;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;
use relift_cfg::{ResolutionEvent, ResolutionMetrics};
use rustc_hash::FxHashMap;

use crate::LiftReport;

pub const RESOLVE_CALLS: &str = "relift_resolve_calls_total";
pub const RESOLVE_SOLVED_CONSTANT: &str = "relift_resolve_solved_constant_total";
pub const RESOLVE_SOLVED_CONSTRAINT: &str = "relift_resolve_solved_constraint_total";
pub const RESOLVE_ZERO_CANDIDATES: &str = "relift_resolve_zero_candidates_total";
pub const RESOLVE_ONE_CANDIDATE: &str = "relift_resolve_one_candidate_total";
pub const RESOLVE_TWO_CANDIDATES: &str = "relift_resolve_two_candidates_total";
pub const BLOCKS_LIFTED: &str = "relift_blocks_lifted_total";
pub const UNRESOLVED_SITES: &str = "relift_unresolved_sites_total";
pub const SPECULATIVE_SITES: &str = "relift_speculative_sites_total";
pub const REJECTED_TARGETS: &str = "relift_rejected_targets_total";
pub const OPTIMIZE_ITERATIONS: &str = "relift_optimize_iterations";
pub const INSTRUCTIONS_REMOVED: &str = "relift_instructions_removed";

// ============================================================================
// Metric descriptions
// ============================================================================

/// Register metric descriptions with the installed recorder.
pub fn init() {
    describe_counter!(RESOLVE_CALLS, Unit::Count, "Branch destinations classified");
    describe_counter!(
        RESOLVE_SOLVED_CONSTANT,
        Unit::Count,
        "Destinations that were literal addresses"
    );
    describe_counter!(
        RESOLVE_SOLVED_CONSTRAINT,
        Unit::Count,
        "Destinations pinned down by the constraint solver"
    );
    describe_counter!(
        RESOLVE_ZERO_CANDIDATES,
        Unit::Count,
        "Destinations with no enumerable candidate"
    );
    describe_counter!(
        RESOLVE_ONE_CANDIDATE,
        Unit::Count,
        "Destinations with exactly one candidate"
    );
    describe_counter!(
        RESOLVE_TWO_CANDIDATES,
        Unit::Count,
        "Destinations with exactly two candidates"
    );
    describe_counter!(BLOCKS_LIFTED, Unit::Count, "Blocks lifted");
    describe_counter!(
        UNRESOLVED_SITES,
        Unit::Count,
        "Blocks left ending in an indirect jump"
    );
    describe_counter!(
        SPECULATIVE_SITES,
        Unit::Count,
        "Blocks whose exits came from enumerated candidates"
    );
    describe_counter!(
        REJECTED_TARGETS,
        Unit::Count,
        "Targets outside the loaded image"
    );
    describe_gauge!(
        OPTIMIZE_ITERATIONS,
        Unit::Count,
        "Optimization rounds for the last lifted function"
    );
    describe_histogram!(
        INSTRUCTIONS_REMOVED,
        Unit::Count,
        "Instructions removed by optimization per function"
    );
}

// ============================================================================
// Recording
// ============================================================================

/// Forwards resolver events to the `metrics` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsFacade;

impl ResolutionMetrics for MetricsFacade {
    fn record(&self, event: ResolutionEvent) {
        let name = match event {
            ResolutionEvent::Call => RESOLVE_CALLS,
            ResolutionEvent::SolvedConstant => RESOLVE_SOLVED_CONSTANT,
            ResolutionEvent::SolvedConstraint => RESOLVE_SOLVED_CONSTRAINT,
            ResolutionEvent::ZeroCandidates => RESOLVE_ZERO_CANDIDATES,
            ResolutionEvent::OneCandidate => RESOLVE_ONE_CANDIDATE,
            ResolutionEvent::TwoCandidates => RESOLVE_TWO_CANDIDATES,
        };
        counter!(name).increment(1);
    }
}

/// Publish the totals of one lifted function.
#[allow(clippy::cast_precision_loss)]
pub fn record_lift(report: &LiftReport) {
    counter!(BLOCKS_LIFTED).increment(report.blocks_lifted as u64);
    counter!(UNRESOLVED_SITES).increment(report.unresolved.len() as u64);
    counter!(SPECULATIVE_SITES).increment(report.speculative.len() as u64);
    counter!(REJECTED_TARGETS).increment(report.rejected.len() as u64);
    if let Some(optimize) = &report.optimize {
        gauge!(OPTIMIZE_ITERATIONS).set(optimize.iterations as f64);
        histogram!(INSTRUCTIONS_REMOVED).record(optimize.removed() as f64);
    }
}

// ============================================================================
// In-memory recorder
// ============================================================================

#[derive(Default)]
struct Storage {
    counters: RwLock<FxHashMap<String, u64>>,
    gauges: RwLock<FxHashMap<String, f64>>,
    histograms: RwLock<FxHashMap<String, Vec<f64>>>,
}

struct Handle {
    key: String,
    storage: Arc<Storage>,
}

impl metrics::CounterFn for Handle {
    fn increment(&self, value: u64) {
        *self
            .storage
            .counters
            .write()
            .entry(self.key.clone())
            .or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.counters.write().insert(self.key.clone(), value);
    }
}

impl metrics::GaugeFn for Handle {
    fn increment(&self, value: f64) {
        *self
            .storage
            .gauges
            .write()
            .entry(self.key.clone())
            .or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self
            .storage
            .gauges
            .write()
            .entry(self.key.clone())
            .or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.storage.gauges.write().insert(self.key.clone(), value);
    }
}

impl metrics::HistogramFn for Handle {
    fn record(&self, value: f64) {
        self.storage
            .histograms
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

/// Recorder that keeps every value in memory.
#[derive(Default)]
pub struct SummaryRecorder {
    storage: Arc<Storage>,
}

impl SummaryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to what this recorder has collected.
    pub fn handle(&self) -> SummaryHandle {
        SummaryHandle {
            storage: Arc::clone(&self.storage),
        }
    }

    /// Install as the global recorder. Fails if one is already installed.
    pub fn install(self) -> Option<SummaryHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }

    fn handle_for(&self, key: &Key) -> Arc<Handle> {
        Arc::new(Handle {
            key: key_to_string(key),
            storage: Arc::clone(&self.storage),
        })
    }
}

impl Recorder for SummaryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle_for(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle_for(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle_for(key))
    }
}

/// Shared view of a [`SummaryRecorder`]'s values.
#[derive(Clone)]
pub struct SummaryHandle {
    storage: Arc<Storage>,
}

impl SummaryHandle {
    pub fn counter(&self, key: &str) -> Option<u64> {
        self.storage.counters.read().get(key).copied()
    }

    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.storage.gauges.read().get(key).copied()
    }

    pub fn histogram(&self, key: &str) -> Option<Vec<f64>> {
        self.storage.histograms.read().get(key).cloned()
    }
}

impl fmt::Display for SummaryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = self.storage.counters.read();
        let gauges = self.storage.gauges.read();
        let histograms = self.storage.histograms.read();

        let mut keys: Vec<&String> = counters.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "{key}: {}", counters[key])?;
        }
        let mut keys: Vec<&String> = gauges.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "{key}: {:.2}", gauges[key])?;
        }
        let mut keys: Vec<&String> = histograms.keys().collect();
        keys.sort();
        for key in keys {
            let values = &histograms[key];
            if values.is_empty() {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            #[allow(clippy::cast_precision_loss)]
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            writeln!(
                f,
                "{key}: count={}, min={min:.2}, max={max:.2}, avg={avg:.2}",
                values.len()
            )?;
        }
        Ok(())
    }
}
