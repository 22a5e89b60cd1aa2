//! Declarative description of the optimization pipeline.

use std::fmt;

use relift_ir::ArgRef;

/// Which image bytes [`PassStep::GepLoad`] may fold loads from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemoryPolicy {
    /// Never fold loads to constants.
    Never,
    /// Fold loads from read-only sections only.
    #[default]
    ReadOnly,
    /// Fold loads from any mapped section, using its initial contents.
    AllMapped,
}

/// Pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    EarlyCleanup,
    LifterCanonicalization,
    LateCleanup,
    ModuleFinalization,
}

impl Phase {
    /// Steps of this phase run function by function.
    pub const fn is_per_function(self) -> bool {
        matches!(self, Self::EarlyCleanup | Self::LateCleanup)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::EarlyCleanup => "early-cleanup",
            Self::LifterCanonicalization => "lifter-canonicalization",
            Self::LateCleanup => "late-cleanup",
            Self::ModuleFinalization => "module-finalization",
        }
    }
}

/// One transformation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassStep {
    Mem2Reg,
    InstCombine,
    SimplifyCfg,
    EarlyCse { memory_aware: bool },
    Dce,
    GepLoad { memory: ArgRef, policy: MemoryPolicy },
    ReplaceTruncWithLoad,
    PromotePseudoStack { stack: ArgRef },
    PromotePseudoMemory { memory: ArgRef },
    Gvn,
    Adce,
    GlobalDce,
    StripDeadPrototypes,
}

impl PassStep {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mem2Reg => "mem2reg",
            Self::InstCombine => "instcombine",
            Self::SimplifyCfg => "simplifycfg",
            Self::EarlyCse { .. } => "early-cse",
            Self::Dce => "dce",
            Self::GepLoad { .. } => "gep-load",
            Self::ReplaceTruncWithLoad => "replace-trunc-with-load",
            Self::PromotePseudoStack { .. } => "promote-pseudo-stack",
            Self::PromotePseudoMemory { .. } => "promote-pseudo-memory",
            Self::Gvn => "gvn",
            Self::Adce => "adce",
            Self::GlobalDce => "globaldce",
            Self::StripDeadPrototypes => "strip-dead-prototypes",
        }
    }
}

impl fmt::Display for PassStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs to [`build_schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleParams {
    /// Pseudo-stack parameter of the lifted function.
    pub stack: ArgRef,
    /// Pseudo-memory parameter of the lifted function.
    pub memory: ArgRef,
    pub memory_policy: MemoryPolicy,
}

impl ScheduleParams {
    pub fn new(stack: ArgRef, memory: ArgRef) -> Self {
        Self {
            stack,
            memory,
            memory_policy: MemoryPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }
}

/// Immutable, ordered list of steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassSchedule {
    steps: Vec<(Phase, PassStep)>,
}

impl PassSchedule {
    pub fn steps(&self) -> &[(Phase, PassStep)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps of one phase, in order.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = PassStep> + '_ {
        self.steps
            .iter()
            .filter(move |(p, _)| *p == phase)
            .map(|(_, step)| *step)
    }
}

impl fmt::Display for PassSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut current = None;
        for (phase, step) in &self.steps {
            if current != Some(*phase) {
                if current.is_some() {
                    writeln!(f)?;
                }
                write!(f, "{}:", phase.name())?;
                current = Some(*phase);
            }
            write!(f, " {step}")?;
        }
        Ok(())
    }
}

/// The fixed pipeline for one lifted function.
///
/// Promotion to registers comes before instruction combining, and the pseudo
/// memory and stack promotions come after the rewrites that expose direct
/// accesses. Reordering any of this weakens the result.
pub fn build_schedule(params: &ScheduleParams) -> PassSchedule {
    use Phase::{EarlyCleanup, LateCleanup, LifterCanonicalization, ModuleFinalization};

    let steps = vec![
        (EarlyCleanup, PassStep::Mem2Reg),
        (EarlyCleanup, PassStep::InstCombine),
        (EarlyCleanup, PassStep::SimplifyCfg),
        (EarlyCleanup, PassStep::EarlyCse { memory_aware: true }),
        (EarlyCleanup, PassStep::Dce),
        (
            LifterCanonicalization,
            PassStep::GepLoad {
                memory: params.memory,
                policy: params.memory_policy,
            },
        ),
        (LifterCanonicalization, PassStep::ReplaceTruncWithLoad),
        (
            LifterCanonicalization,
            PassStep::PromotePseudoStack {
                stack: params.stack,
            },
        ),
        (
            LifterCanonicalization,
            PassStep::PromotePseudoMemory {
                memory: params.memory,
            },
        ),
        (LateCleanup, PassStep::InstCombine),
        (LateCleanup, PassStep::SimplifyCfg),
        (LateCleanup, PassStep::Gvn),
        (LateCleanup, PassStep::Adce),
        (ModuleFinalization, PassStep::GlobalDce),
        (ModuleFinalization, PassStep::StripDeadPrototypes),
    ];
    PassSchedule { steps }
}
