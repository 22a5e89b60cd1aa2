//! Turn pseudo-stack slots into locals.

use std::collections::BTreeMap;

use relift_ir::{ArgRef, Function, InstId, InstKind, Module, Ty, User, Value};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::pass::{ModulePass, PassContext};
use crate::passes::mem2reg::promote_allocas;

/// Replaces accesses through the pseudo-stack argument with allocas and
/// promotes those to SSA values.
///
/// The rewrite is all-or-nothing. It only happens when every use of the stack
/// argument is `stack + c` feeding the pointer operand of loads and stores,
/// each offset is always accessed with the same width, and no two slots
/// overlap. Anything else (escaping pointers, computed offsets, mixed widths)
/// leaves the function untouched.
#[derive(Clone, Copy, Debug)]
pub struct PromotePseudoStack {
    pub stack: ArgRef,
}

impl PromotePseudoStack {
    pub const fn new(stack: ArgRef) -> Self {
        Self { stack }
    }
}

/// Stack slots keyed by signed offset: access width in bytes and the address
/// computations that reach it.
type Slots = BTreeMap<i64, (u32, Vec<InstId>)>;

impl ModulePass for PromotePseudoStack {
    fn name(&self) -> &'static str {
        "promote-pseudo-stack"
    }

    fn run_on_module(&self, module: &mut Module, _ctx: &PassContext<'_>) -> bool {
        let Some(func) = module.function_mut(self.stack.func) else {
            return false;
        };
        if func.is_declaration() {
            return false;
        }
        let Some(slots) = collect_slots(func, self.stack.value()) else {
            debug!(func = %func.name, "pseudo stack escapes, left in place");
            return false;
        };
        if slots.is_empty() {
            return false;
        }
        let Some(entry) = func.entry() else {
            return false;
        };

        let mut allocas = Vec::with_capacity(slots.len());
        let mut replacements: FxHashMap<InstId, InstId> = FxHashMap::default();
        for (width, addresses) in slots.values() {
            let at = func.phis(entry).len();
            let alloca = func.insert_inst(
                entry,
                at,
                InstKind::Alloca { size: *width },
                Some(Ty::Ptr),
            );
            allocas.push(alloca);
            for &address in addresses {
                replacements.insert(address, alloca);
            }
        }
        func.rewrite_operands(|v| {
            if let Value::Inst(id) = *v {
                if let Some(&alloca) = replacements.get(&id) {
                    *v = Value::Inst(alloca);
                }
            }
        });
        for &address in replacements.keys() {
            func.remove_inst(address);
        }
        let promoted = promote_allocas(func, &allocas);
        debug!(func = %func.name, slots = allocas.len(), promoted, "promoted pseudo stack");
        true
    }
}

fn collect_slots(func: &Function, stack: Value) -> Option<Slots> {
    let users = func.users();
    let mut slots = Slots::new();
    for user in users.get(&stack).into_iter().flatten() {
        let User::Inst(address) = *user else {
            return None;
        };
        let InstKind::PtrAdd {
            base,
            offset: Value::Const(offset),
        } = func.inst(address).kind
        else {
            return None;
        };
        if base != stack {
            return None;
        }
        let me = Value::Inst(address);
        let mut width = None;
        for access in users.get(&me).into_iter().flatten() {
            let User::Inst(access) = *access else {
                return None;
            };
            let ty = match func.inst(access).kind {
                InstKind::Load { ptr } if ptr == me => func.inst(access).ty?,
                InstKind::Store { ptr, value } if ptr == me && value != me => {
                    func.value_ty(value)?
                }
                _ => return None,
            };
            if width.is_some_and(|w| w != ty.bytes()) {
                return None;
            }
            width = Some(ty.bytes());
        }
        let Some(width) = width else {
            // Never dereferenced; dead-code elimination drops it.
            continue;
        };
        let (slot_width, addresses) = slots
            .entry(offset.as_signed())
            .or_insert_with(|| (width, Vec::new()));
        if *slot_width != width {
            return None;
        }
        addresses.push(address);
    }

    let mut end = i64::MIN;
    for (&offset, &(width, _)) in &slots {
        if offset < end {
            return None;
        }
        end = offset.checked_add(i64::from(width))?;
    }
    Some(slots)
}
