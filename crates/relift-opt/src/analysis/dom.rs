//! Dominator tree and dominance frontiers.
//!
//! Uses the iterative algorithm of Cooper, Harvey and Kennedy over reverse
//! postorder. Blocks unreachable from the entry have no dominator and are not
//! part of the tree.

use relift_ir::{BlockId, Function};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, Debug, Default)]
pub struct DominatorTree {
    /// Reachable blocks in reverse postorder; the entry is first.
    rpo: Vec<BlockId>,
    order: FxHashMap<BlockId, usize>,
    /// Immediate dominator by RPO index. The entry maps to itself.
    idom: Vec<usize>,
    children: FxHashMap<BlockId, Vec<BlockId>>,
    preds: FxHashMap<BlockId, Vec<BlockId>>,
}

impl DominatorTree {
    pub fn compute(func: &Function) -> Self {
        let rpo = func.reverse_postorder();
        let order: FxHashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let mut preds = func.predecessors();
        for list in preds.values_mut() {
            list.retain(|p| order.contains_key(p));
        }

        const UNDEF: usize = usize::MAX;
        let mut idom = vec![UNDEF; rpo.len()];
        if !rpo.is_empty() {
            idom[0] = 0;
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (i, block) in rpo.iter().enumerate().skip(1) {
                let mut new_idom = UNDEF;
                for pred in preds.get(block).map_or(&[][..], Vec::as_slice) {
                    let p = order[pred];
                    if idom[p] == UNDEF {
                        continue;
                    }
                    new_idom = if new_idom == UNDEF {
                        p
                    } else {
                        intersect(&idom, p, new_idom)
                    };
                }
                if new_idom != UNDEF && idom[i] != new_idom {
                    idom[i] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate().skip(1) {
            if idom[i] != UNDEF {
                children.entry(rpo[idom[i]]).or_default().push(block);
            }
        }

        Self {
            rpo,
            order,
            idom,
            children,
            preds,
        }
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.rpo.first().copied()
    }

    /// Reachable blocks in reverse postorder.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.order.contains_key(&block)
    }

    /// Immediate dominator; `None` for the entry and for unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let &i = self.order.get(&block)?;
        (i != 0).then(|| self.rpo[self.idom[i]])
    }

    /// Blocks immediately dominated by `block`, in reverse postorder.
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Reachable predecessors of `block`.
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        self.preds.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(&a), Some(&b)) = (self.order.get(&a), self.order.get(&b)) else {
            return false;
        };
        let mut b = b;
        loop {
            if a == b {
                return true;
            }
            if b == 0 {
                return false;
            }
            b = self.idom[b];
        }
    }

    /// Tree preorder starting from the entry.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut out = Vec::with_capacity(self.rpo.len());
        let mut stack: Vec<BlockId> = self.entry().into_iter().collect();
        while let Some(block) = stack.pop() {
            out.push(block);
            stack.extend(self.children(block).iter().rev());
        }
        out
    }

    /// Dominance frontier of every reachable block.
    pub fn frontiers(&self) -> FxHashMap<BlockId, FxHashSet<BlockId>> {
        let mut frontiers: FxHashMap<BlockId, FxHashSet<BlockId>> =
            self.rpo.iter().map(|&b| (b, FxHashSet::default())).collect();
        for &block in &self.rpo {
            let preds = self.preds(block);
            if preds.len() < 2 {
                continue;
            }
            let Some(idom) = self.idom(block) else {
                continue;
            };
            for &pred in preds {
                let mut runner = pred;
                while runner != idom {
                    frontiers.entry(runner).or_default().insert(block);
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        frontiers
    }

    /// Iterated dominance frontier of `blocks`.
    pub fn iterated_frontier(
        &self,
        frontiers: &FxHashMap<BlockId, FxHashSet<BlockId>>,
        blocks: impl IntoIterator<Item = BlockId>,
    ) -> FxHashSet<BlockId> {
        let mut result = FxHashSet::default();
        let mut work: Vec<BlockId> = blocks.into_iter().collect();
        while let Some(block) = work.pop() {
            if let Some(frontier) = frontiers.get(&block) {
                for &f in frontier {
                    if result.insert(f) {
                        work.push(f);
                    }
                }
            }
        }
        result
    }
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}
