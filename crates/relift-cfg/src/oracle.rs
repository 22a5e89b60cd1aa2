//! Value classification oracles.
//!
//! Two tiers sit behind the resolver's literal check:
//!
//! - a [`ConstraintSolver`] that answers with one value only when the value
//!   is the same on every path ([`FoldingSolver`]), and
//! - a [`CandidateEnumerator`] that lists the bounded set of values a
//!   destination may take ([`BoundedEnumerator`]). The enumerator is allowed
//!   to be optimistic: it ignores loop back-edges it cannot evaluate and reads
//!   writable image memory at its initial contents.

use std::collections::BTreeSet;
use std::sync::Arc;

use relift_image::ImageLayout;
use relift_ir::{CastOp, Function, InstId, InstKind, Ty, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::value::ValueSet;

/// Maximum def-chain depth followed from the queried value.
pub const MAX_EVAL_DEPTH: usize = 64;

/// Constraint oracle: a value that holds on every path, or nothing.
pub trait ConstraintSolver {
    fn solve_deterministic(&self, func: &Function, value: Value) -> Option<u64>;
}

/// Value-set oracle: de-duplicated candidate values (possibly empty).
pub trait CandidateEnumerator {
    fn enumerate_candidates(&self, func: &Function, value: Value) -> BTreeSet<u64>;
}

/// Where loads may be evaluated from.
#[derive(Clone, Debug, Default)]
struct MemoryView {
    image: Option<Arc<ImageLayout>>,
    /// Parameter index of the pseudo-memory base, if loads through it should be followed.
    memory_arg: Option<u32>,
    /// Read only from read-only sections, whatever the evaluation mode.
    readonly: bool,
}

/// Constraint solver that folds the def-chain of a value over constants.
#[derive(Clone, Debug, Default)]
pub struct FoldingSolver {
    memory: MemoryView,
}

impl FoldingSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow folding loads from read-only sections of `image`.
    #[must_use]
    pub fn with_image(mut self, image: Arc<ImageLayout>, memory_arg: Option<u32>) -> Self {
        self.memory = MemoryView {
            image: Some(image),
            memory_arg,
            readonly: true,
        };
        self
    }
}

impl ConstraintSolver for FoldingSolver {
    fn solve_deterministic(&self, func: &Function, value: Value) -> Option<u64> {
        let mut eval = Evaluator::new(func, &self.memory, Mode::Strict);
        eval.eval(value, 0).single()
    }
}

/// Enumerator producing bounded constant sets through selects, phis and arithmetic.
#[derive(Clone, Debug, Default)]
pub struct BoundedEnumerator {
    memory: MemoryView,
}

impl BoundedEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow reading mapped sections of `image` (writable ones included) for loads.
    #[must_use]
    pub fn with_image(mut self, image: Arc<ImageLayout>, memory_arg: Option<u32>) -> Self {
        self.memory = MemoryView {
            image: Some(image),
            memory_arg,
            readonly: false,
        };
        self
    }

    /// Like [`Self::with_image`], but loads from writable sections stay unknown.
    #[must_use]
    pub fn with_readonly_image(self, image: Arc<ImageLayout>, memory_arg: Option<u32>) -> Self {
        let mut enumerator = self.with_image(image, memory_arg);
        enumerator.memory.readonly = true;
        enumerator
    }
}

impl CandidateEnumerator for BoundedEnumerator {
    fn enumerate_candidates(&self, func: &Function, value: Value) -> BTreeSet<u64> {
        let mut eval = Evaluator::new(func, &self.memory, Mode::Speculative);
        eval.eval(value, 0)
            .values()
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Cycles and writable memory make a value unknown.
    Strict,
    /// Cycles contribute nothing; writable memory is read at its initial contents.
    Speculative,
}

struct Evaluator<'a> {
    func: &'a Function,
    memory: &'a MemoryView,
    mode: Mode,
    visiting: FxHashSet<InstId>,
    cache: FxHashMap<InstId, ValueSet>,
}

impl<'a> Evaluator<'a> {
    fn new(func: &'a Function, memory: &'a MemoryView, mode: Mode) -> Self {
        Self {
            func,
            memory,
            mode,
            visiting: FxHashSet::default(),
            cache: FxHashMap::default(),
        }
    }

    fn ty(&self, value: Value) -> Ty {
        self.func.value_ty(value).unwrap_or(Ty::I64)
    }

    fn eval(&mut self, value: Value, depth: usize) -> ValueSet {
        let id = match value {
            Value::Const(c) => return ValueSet::constant(c.bits()),
            Value::Arg(_) => return ValueSet::Unknown,
            Value::Inst(id) => id,
        };
        if !self.func.is_live(id) || depth > MAX_EVAL_DEPTH {
            return ValueSet::Unknown;
        }
        if let Some(cached) = self.cache.get(&id) {
            return cached.clone();
        }
        if !self.visiting.insert(id) {
            return match self.mode {
                Mode::Strict => ValueSet::Unknown,
                Mode::Speculative => ValueSet::empty(),
            };
        }

        let result = self.eval_inst(id, depth + 1);

        self.visiting.remove(&id);
        self.cache.insert(id, result.clone());
        result
    }

    fn eval_inst(&mut self, id: InstId, depth: usize) -> ValueSet {
        let inst = self.func.inst(id);
        let ty = inst.ty.unwrap_or(Ty::I64);
        match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let a = self.eval(lhs, depth);
                let b = self.eval(rhs, depth);
                a.product(&b, |x, y| op.fold(x, y, ty))
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                let (pred, lhs, rhs) = (*pred, *lhs, *rhs);
                let operand_ty = self.ty(lhs);
                let a = self.eval(lhs, depth);
                let b = self.eval(rhs, depth);
                a.product(&b, |x, y| Some(u64::from(pred.fold(x, y, operand_ty))))
            }
            InstKind::Cast { op, value } => {
                let (op, value) = (*op, *value);
                let from = self.ty(value);
                self.eval(value, depth).map(|v| Some(op.fold(v, from, ty)))
            }
            InstKind::PtrAdd { base, offset } => {
                let (base, offset) = (*base, *offset);
                let a = self.eval(base, depth);
                let b = self.eval(offset, depth);
                a.product(&b, |x, y| Some(x.wrapping_add(y)))
            }
            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
                match self.eval(cond, depth).values() {
                    Some([1]) => self.eval(if_true, depth),
                    Some([0]) => self.eval(if_false, depth),
                    _ => {
                        let t = self.eval(if_true, depth);
                        let f = self.eval(if_false, depth);
                        t.merge(&f)
                    }
                }
            }
            InstKind::Phi { incoming } => {
                let values: Vec<Value> = incoming.iter().map(|(_, v)| *v).collect();
                let mut merged = ValueSet::empty();
                for value in values {
                    merged = merged.merge(&self.eval(value, depth));
                    if merged.is_unknown() {
                        break;
                    }
                }
                merged
            }
            InstKind::Load { ptr } => {
                let ptr = *ptr;
                self.eval_load(ptr, ty, depth)
            }
            InstKind::Alloca { .. } | InstKind::Store { .. } | InstKind::Call { .. } => {
                ValueSet::Unknown
            }
        }
    }

    fn eval_load(&mut self, ptr: Value, ty: Ty, depth: usize) -> ValueSet {
        let Some(image) = self.memory.image.clone() else {
            return ValueSet::Unknown;
        };
        let addresses = self.eval_address(ptr, depth);
        let width = ty.bytes();
        let readonly = self.mode == Mode::Strict || self.memory.readonly;
        addresses.map(|addr| {
            if readonly {
                image.read_readonly(addr, width)
            } else {
                image.read(addr, width)
            }
        })
    }

    /// Absolute addresses a pointer may hold: `inttoptr x` or `memory + x`.
    fn eval_address(&mut self, ptr: Value, depth: usize) -> ValueSet {
        let Some(id) = ptr.as_inst() else {
            return ValueSet::Unknown;
        };
        if !self.func.is_live(id) {
            return ValueSet::Unknown;
        }
        match self.func.inst(id).kind.clone() {
            InstKind::Cast {
                op: CastOp::IntToPtr,
                value,
            } => self.eval(value, depth),
            InstKind::PtrAdd {
                base: Value::Arg(index),
                offset,
            } if Some(index) == self.memory.memory_arg => self.eval(offset, depth),
            InstKind::PtrAdd { base, offset } => {
                let base = self.eval_address(base, depth);
                let offset = self.eval(offset, depth);
                base.product(&offset, |x, y| Some(x.wrapping_add(y)))
            }
            _ => ValueSet::Unknown,
        }
    }
}
