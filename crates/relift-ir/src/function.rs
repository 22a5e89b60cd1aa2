//! Function bodies: blocks, the instruction arena and use queries.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::instr::{Inst, InstKind};
use crate::terminator::Terminator;
use crate::types::{BlockId, InstId, Ty, Value};

/// A formal parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

impl Param {
    pub fn new(name: &str, ty: Ty) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Symbol visibility. External functions are roots for global dead-code elimination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Linkage {
    #[default]
    External,
    Internal,
}

/// A basic block: ordered instructions followed by one terminator.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// Machine address this block was lifted from, if any.
    pub address: Option<u64>,
    pub insts: Vec<InstId>,
    pub terminator: Terminator,
}

#[derive(Clone, Debug)]
struct InstSlot {
    inst: Inst,
    /// Owning block, `None` once the instruction is removed.
    block: Option<BlockId>,
}

/// Something that reads a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum User {
    Inst(InstId),
    Terminator(BlockId),
}

/// A function definition or declaration.
///
/// Instructions and blocks live in arenas indexed by [`InstId`] and [`BlockId`];
/// removing one leaves a tombstone so the remaining handles stay valid.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Ty>,
    pub linkage: Linkage,
    insts: Vec<InstSlot>,
    blocks: Vec<Option<BlockData>>,
    entry: Option<BlockId>,
}

impl Function {
    /// Create a function with no body. It stays a declaration until a block is added.
    pub fn new(name: &str, params: Vec<Param>, ret: Option<Ty>) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret,
            linkage: Linkage::External,
            insts: Vec::new(),
            blocks: Vec::new(),
            entry: None,
        }
    }

    #[must_use]
    pub const fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub const fn is_declaration(&self) -> bool {
        self.entry.is_none()
    }

    pub const fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    /// Operand referring to parameter `index`.
    pub const fn arg(&self, index: u32) -> Value {
        Value::Arg(index)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Add an empty block. The first block added becomes the entry.
    pub fn add_block(&mut self, address: Option<u64>) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        self.blocks.push(Some(BlockData {
            address,
            ..BlockData::default()
        }));
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        matches!(self.blocks.get(id.index()), Some(Some(_)))
    }

    pub fn try_block(&self, id: BlockId) -> Option<&BlockData> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// # Panics
    ///
    /// Panics if `id` was removed or never existed.
    pub fn block(&self, id: BlockId) -> &BlockData {
        self.try_block(id)
            .unwrap_or_else(|| panic!("{id} is not a live block of {}", self.name))
    }

    /// # Panics
    ///
    /// Panics if `id` was removed or never existed.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        let name = &self.name;
        self.blocks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("{id} is not a live block of {name}"))
    }

    /// Live block handles in creation order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BlockData)> {
        self.blocks.iter().enumerate().filter_map(|(i, b)| {
            b.as_ref()
                .map(|b| (BlockId(u32::try_from(i).unwrap_or(u32::MAX)), b))
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    /// Remove a block and every instruction in it. The entry block cannot be removed.
    pub fn remove_block(&mut self, id: BlockId) {
        if Some(id) == self.entry {
            return;
        }
        if let Some(block) = self.blocks.get_mut(id.index()).and_then(Option::take) {
            for inst in block.insts {
                self.insts[inst.index()].block = None;
            }
        }
    }

    /// Append the instructions and terminator of `from` to `into` and delete `from`.
    ///
    /// Phis in the successors of `from` are rewired to `into`. Phis of `from`
    /// itself move along unchanged, so callers must resolve them first.
    pub fn merge_blocks(&mut self, into: BlockId, from: BlockId) {
        if into == from || Some(from) == self.entry {
            return;
        }
        let Some(data) = self.blocks.get_mut(from.index()).and_then(Option::take) else {
            return;
        };
        for &inst in &data.insts {
            self.insts[inst.index()].block = Some(into);
        }
        for succ in data.terminator.successors() {
            if !self.contains_block(succ) {
                continue;
            }
            for phi in self.phis(succ) {
                if let InstKind::Phi { incoming } = &mut self.inst_mut(phi).kind {
                    for (pred, _) in incoming.iter_mut() {
                        if *pred == from {
                            *pred = into;
                        }
                    }
                }
            }
        }
        let target = self.block_mut(into);
        target.insts.extend(data.insts);
        target.terminator = data.terminator;
    }

    pub fn address_block(&self, address: u64) -> Option<BlockId> {
        self.blocks()
            .find(|(_, b)| b.address == Some(address))
            .map(|(id, _)| id)
    }

    pub fn terminator(&self, block: BlockId) -> &Terminator {
        &self.block(block).terminator
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.block_mut(block).terminator = terminator;
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block).successors()
    }

    /// Predecessor lists; each predecessor appears once even for two-armed edges.
    pub fn predecessors(&self) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (id, block) in self.blocks() {
            preds.entry(id).or_default();
            for succ in block.terminator.successors() {
                let list = preds.entry(succ).or_default();
                if !list.contains(&id) {
                    list.push(id);
                }
            }
        }
        preds
    }

    /// Blocks reachable from the entry, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::new();
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);

        while let Some((block, next)) = stack.last_mut() {
            let succs = self.successors(*block);
            if let Some(&succ) = succs.get(*next) {
                *next += 1;
                if self.contains_block(succ) && visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(*block);
                stack.pop();
            }
        }

        postorder.reverse();
        postorder
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    fn alloc_inst(&mut self, block: BlockId, kind: InstKind, ty: Option<Ty>) -> InstId {
        let id = InstId(u32::try_from(self.insts.len()).unwrap_or(u32::MAX));
        self.insts.push(InstSlot {
            inst: Inst::new(kind, ty),
            block: Some(block),
        });
        id
    }

    /// Append an instruction at the end of `block` (before its terminator).
    pub fn append_inst(&mut self, block: BlockId, kind: InstKind, ty: Option<Ty>) -> InstId {
        let id = self.alloc_inst(block, kind, ty);
        self.block_mut(block).insts.push(id);
        id
    }

    /// Insert an instruction at position `index` within `block`.
    pub fn insert_inst(
        &mut self,
        block: BlockId,
        index: usize,
        kind: InstKind,
        ty: Option<Ty>,
    ) -> InstId {
        let id = self.alloc_inst(block, kind, ty);
        let insts = &mut self.block_mut(block).insts;
        let index = index.min(insts.len());
        insts.insert(index, id);
        id
    }

    /// Insert an instruction directly before `anchor`.
    pub fn insert_before(&mut self, anchor: InstId, kind: InstKind, ty: Option<Ty>) -> InstId {
        let block = self.inst_block(anchor).unwrap_or_else(|| {
            panic!("cannot insert before removed instruction {anchor}")
        });
        let index = self
            .block(block)
            .insts
            .iter()
            .position(|&i| i == anchor)
            .unwrap_or(0);
        self.insert_inst(block, index, kind, ty)
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()].inst
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()].inst
    }

    pub fn inst_block(&self, id: InstId) -> Option<BlockId> {
        self.insts.get(id.index()).and_then(|slot| slot.block)
    }

    pub fn is_live(&self, id: InstId) -> bool {
        self.inst_block(id).is_some()
    }

    /// Detach an instruction from its block. Its handle stays valid but dead.
    pub fn remove_inst(&mut self, id: InstId) {
        if let Some(block) = self.inst_block(id) {
            self.block_mut(block).insts.retain(|&i| i != id);
            self.insts[id.index()].block = None;
        }
    }

    /// Every live instruction, block by block.
    pub fn live_insts(&self) -> Vec<InstId> {
        self.blocks()
            .flat_map(|(_, b)| b.insts.iter().copied())
            .collect()
    }

    /// Live instructions plus one terminator per block.
    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|(_, b)| b.insts.len() + 1).sum()
    }

    /// Result type of an operand.
    pub fn value_ty(&self, value: Value) -> Option<Ty> {
        match value {
            Value::Const(c) => Some(c.ty()),
            Value::Arg(n) => self.params.get(n as usize).map(|p| p.ty),
            Value::Inst(id) => self.inst(id).ty,
        }
    }

    // ------------------------------------------------------------------
    // Uses
    // ------------------------------------------------------------------

    /// Rewrite every use of `from` (in live instructions and terminators) to `to`.
    pub fn replace_all_uses(&mut self, from: Value, to: Value) {
        if from == to {
            return;
        }
        self.rewrite_operands(|v| {
            if *v == from {
                *v = to;
            }
        });
    }

    /// Apply `f` to every operand of every live instruction and terminator.
    pub fn rewrite_operands(&mut self, mut f: impl FnMut(&mut Value)) {
        for id in self.live_insts() {
            self.insts[id.index()].inst.kind.map_operands(&mut f);
        }
        for block in self.blocks.iter_mut().flatten() {
            block.terminator.map_operands(&mut f);
        }
    }

    /// Map from instruction/argument operands to their users.
    pub fn users(&self) -> FxHashMap<Value, Vec<User>> {
        let mut users: FxHashMap<Value, Vec<User>> = FxHashMap::default();
        for (block_id, block) in self.blocks() {
            for &id in &block.insts {
                self.inst(id).kind.for_each_operand(|v| {
                    if !v.is_const() {
                        users.entry(v).or_default().push(User::Inst(id));
                    }
                });
            }
            block.terminator.for_each_operand(|v| {
                if !v.is_const() {
                    users.entry(v).or_default().push(User::Terminator(block_id));
                }
            });
        }
        users
    }

    /// Number of uses of each instruction result.
    pub fn use_counts(&self) -> FxHashMap<InstId, usize> {
        let mut counts: FxHashMap<InstId, usize> = FxHashMap::default();
        let mut bump = |v: Value| {
            if let Value::Inst(id) = v {
                *counts.entry(id).or_default() += 1;
            }
        };
        for (_, block) in self.blocks() {
            for &id in &block.insts {
                self.inst(id).kind.for_each_operand(&mut bump);
            }
            block.terminator.for_each_operand(&mut bump);
        }
        counts
    }

    /// Drop the phi entries for edges coming from `pred` into `block`.
    pub fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) {
        let insts = self.block(block).insts.clone();
        for id in insts {
            if let InstKind::Phi { incoming } = &mut self.inst_mut(id).kind {
                incoming.retain(|(from, _)| *from != pred);
            }
        }
    }

    /// Phi instructions at the head of `block`.
    pub fn phis(&self, block: BlockId) -> Vec<InstId> {
        self.block(block)
            .insts
            .iter()
            .copied()
            .take_while(|&id| self.inst(id).kind.is_phi())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::BinOp;

    fn sample() -> (Function, BlockId, BlockId, InstId) {
        let mut func = Function::new("f", vec![Param::new("x", Ty::I64)], Some(Ty::I64));
        let entry = func.add_block(Some(0x1000));
        let exit = func.add_block(Some(0x1010));
        let add = func.append_inst(
            entry,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Arg(0),
                rhs: Value::int(1, Ty::I64),
            },
            Some(Ty::I64),
        );
        func.set_terminator(entry, Terminator::Jump(exit));
        func.set_terminator(exit, Terminator::Return(Some(add.into())));
        (func, entry, exit, add)
    }

    #[test]
    fn test_first_block_is_entry() {
        let (func, entry, _, _) = sample();
        assert_eq!(func.entry(), Some(entry));
        assert!(!func.is_declaration());
        assert!(Function::new("decl", Vec::new(), None).is_declaration());
    }

    #[test]
    fn test_instruction_count_includes_terminators() {
        let (func, _, _, _) = sample();
        assert_eq!(func.instruction_count(), 3);
    }

    #[test]
    fn test_replace_all_uses_reaches_terminators() {
        let (mut func, _, exit, add) = sample();
        func.replace_all_uses(add.into(), Value::Arg(0));
        assert_eq!(func.terminator(exit), &Terminator::Return(Some(Value::Arg(0))));
        assert!(func.use_counts().get(&add).is_none());
    }

    #[test]
    fn test_remove_block_kills_instructions() {
        let (mut func, entry, exit, add) = sample();
        let extra = func.add_block(None);
        let moved = func.append_inst(extra, InstKind::Alloca { size: 8 }, Some(Ty::Ptr));
        func.remove_block(extra);
        assert!(!func.is_live(moved));
        assert!(func.is_live(add));
        func.remove_block(entry);
        assert!(func.contains_block(entry));
        assert_eq!(func.block_ids(), vec![entry, exit]);
    }

    #[test]
    fn test_reverse_postorder_skips_unreachable() {
        let (mut func, entry, exit, _) = sample();
        let orphan = func.add_block(None);
        func.set_terminator(orphan, Terminator::Jump(exit));
        assert_eq!(func.reverse_postorder(), vec![entry, exit]);
        let preds = func.predecessors();
        assert_eq!(preds[&exit].len(), 2);
    }

    #[test]
    fn test_merge_blocks() {
        let (mut func, entry, exit, add) = sample();
        let tail = func.add_block(Some(0x1020));
        func.set_terminator(exit, Terminator::Jump(tail));
        let phi = func.append_inst(
            tail,
            InstKind::Phi {
                incoming: vec![(exit, Value::Inst(add))],
            },
            Some(Ty::I64),
        );
        func.set_terminator(tail, Terminator::Return(Some(Value::Inst(phi))));

        func.merge_blocks(entry, exit);
        assert!(!func.contains_block(exit));
        assert_eq!(func.inst_block(add), Some(entry));
        assert_eq!(func.terminator(entry), &Terminator::Jump(tail));
        assert_eq!(
            func.inst(phi).kind,
            InstKind::Phi {
                incoming: vec![(entry, Value::Inst(add))]
            }
        );
        assert_eq!(func.address_block(0x1020), Some(tail));
    }
}
