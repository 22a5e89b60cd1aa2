//! Block registry: address to block mapping plus the pending-work queue.

use std::collections::VecDeque;
use std::fmt;

use relift_ir::{BlockId, Function};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

/// Why an address was scheduled for lifting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscoveryReason {
    /// Function entry point.
    Entry,
    /// Literal jump or branch target decoded from the instruction.
    DirectTarget,
    /// Computed destination that folded to a literal.
    ConstantResolved,
    /// Computed destination pinned down by the constraint solver.
    ConstraintResolved,
    /// Only candidate reported by value-set enumeration.
    SingleCandidate,
    /// First of two enumerated candidates.
    BranchTrueEdge,
    /// Second of two enumerated candidates.
    BranchFalseEdge,
}

impl DiscoveryReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::DirectTarget => "direct",
            Self::ConstantResolved => "solved-constant",
            Self::ConstraintResolved => "solved",
            Self::SingleCandidate => "single-candidate",
            Self::BranchTrueEdge => "true-edge",
            Self::BranchFalseEdge => "false-edge",
        }
    }
}

impl fmt::Display for DiscoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Narrow interface the resolver and the lifting driver use to discover blocks.
pub trait BlockRegistry {
    /// Block for `address`, created in `func` on first request. The same address
    /// always yields the same block.
    fn get_or_create_block(
        &mut self,
        func: &mut Function,
        address: u64,
        reason: DiscoveryReason,
    ) -> BlockId;

    /// Queue `address` for lifting unless it was queued before.
    fn enqueue_pending(&mut self, address: u64, block: BlockId);

    /// Next address waiting to be lifted.
    fn next_pending(&mut self) -> Option<(u64, BlockId)>;

    /// Block previously created for `address`.
    fn block_at(&self, address: u64) -> Option<BlockId>;
}

/// In-memory [`BlockRegistry`] for one function.
///
/// Pending addresses are lifted in discovery order. An address is enqueued at
/// most once over the lifetime of the map, even after it has been dequeued.
#[derive(Clone, Debug, Default)]
pub struct BlockMap {
    blocks: FxHashMap<u64, BlockId>,
    reasons: FxHashMap<u64, DiscoveryReason>,
    pending: VecDeque<(u64, BlockId)>,
    scheduled: FxHashSet<u64>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reason recorded when the block for `address` was first created.
    pub fn reason(&self, address: u64) -> Option<DiscoveryReason> {
        self.reasons.get(&address).copied()
    }

    /// Number of distinct addresses with a block.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_scheduled(&self, address: u64) -> bool {
        self.scheduled.contains(&address)
    }

    /// Known addresses in ascending order.
    pub fn addresses(&self) -> Vec<u64> {
        let mut addresses: Vec<u64> = self.blocks.keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }
}

impl BlockRegistry for BlockMap {
    fn get_or_create_block(
        &mut self,
        func: &mut Function,
        address: u64,
        reason: DiscoveryReason,
    ) -> BlockId {
        if let Some(&block) = self.blocks.get(&address) {
            return block;
        }
        let block = func.add_block(Some(address));
        trace!(address, %block, %reason, "created block");
        self.blocks.insert(address, block);
        self.reasons.insert(address, reason);
        block
    }

    fn enqueue_pending(&mut self, address: u64, block: BlockId) {
        if self.scheduled.insert(address) {
            self.pending.push_back((address, block));
        }
    }

    fn next_pending(&mut self) -> Option<(u64, BlockId)> {
        self.pending.pop_front()
    }

    fn block_at(&self, address: u64) -> Option<BlockId> {
        self.blocks.get(&address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_address_same_block() {
        let mut func = Function::new("f", Vec::new(), None);
        let mut map = BlockMap::new();
        let a = map.get_or_create_block(&mut func, 0x1000, DiscoveryReason::Entry);
        let b = map.get_or_create_block(&mut func, 0x1000, DiscoveryReason::SingleCandidate);
        assert_eq!(a, b);
        assert_eq!(func.block_count(), 1);
        assert_eq!(map.reason(0x1000), Some(DiscoveryReason::Entry));
    }

    #[test]
    fn test_enqueue_is_deduplicated() {
        let mut func = Function::new("f", Vec::new(), None);
        let mut map = BlockMap::new();
        let a = map.get_or_create_block(&mut func, 0x1000, DiscoveryReason::Entry);
        map.enqueue_pending(0x1000, a);
        map.enqueue_pending(0x1000, a);
        assert_eq!(map.pending_len(), 1);
        assert_eq!(map.next_pending(), Some((0x1000, a)));
        map.enqueue_pending(0x1000, a);
        assert_eq!(map.next_pending(), None);
    }

    #[test]
    fn test_pending_is_fifo() {
        let mut func = Function::new("f", Vec::new(), None);
        let mut map = BlockMap::new();
        for addr in [0x3000, 0x1000, 0x2000] {
            let block = map.get_or_create_block(&mut func, addr, DiscoveryReason::DirectTarget);
            map.enqueue_pending(addr, block);
        }
        let order: Vec<u64> = std::iter::from_fn(|| map.next_pending().map(|(a, _)| a)).collect();
        assert_eq!(order, vec![0x3000, 0x1000, 0x2000]);
        assert_eq!(map.addresses(), vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_labels() {
        assert_eq!(DiscoveryReason::ConstantResolved.to_string(), "solved-constant");
        assert_eq!(DiscoveryReason::BranchFalseEdge.label(), "false-edge");
    }
}
