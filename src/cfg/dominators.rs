//! Immediate-dominator computation (spec.md §4.5): the Cooper/Harvey/Kennedy
//! "A Simple, Fast Dominance Algorithm" — postorder numbering, then an
//! iterative fixpoint over reverse-postorder using `intersect`.
//!
//! Spec.md's own description of the algorithm uses "reverse-postorder" for
//! two different things: the *iteration order* of the outer fixpoint loop,
//! and the plain postorder numbers `intersect` uses to walk two candidate
//! idoms up to their common ancestor (the entry always gets the highest
//! postorder number, since it is visited last by the DFS). Both appear
//! below, kept as two distinct values rather than conflated into one.

use std::collections::BTreeMap as Map;
use std::collections::BTreeSet as Set;

use crate::ir::MethodItem;

use super::{BlockId, ControlFlowGraph};

/// The immediate-dominator tree of a [`ControlFlowGraph`], plus the
/// postorder numbering used to compute it.
#[derive(Clone, Debug)]
pub struct Dominators {
    idom: Map<BlockId, BlockId>,
    postorder_number: Map<BlockId, usize>,
}

impl Dominators {
    /// The immediate dominator of `block`, or `None` if `block` was
    /// unreachable (and so absent from the graph entirely).
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn postorder_number(&self, block: BlockId) -> Option<usize> {
        self.postorder_number.get(&block).copied()
    }

    /// Non-strict dominance: every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&next) if next != cur => cur = next,
                _ => return false,
            }
        }
    }
}

pub fn compute<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> Dominators {
    let postorder = postorder(cfg);
    let postorder_number: Map<BlockId, usize> =
        postorder.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    // Reverse-postorder: entry first, since a DFS postorder visits the
    // entry last (every other reachable block is some descendant of it).
    let rpo: Vec<BlockId> = postorder.iter().rev().copied().collect();

    let mut idom: Map<BlockId, BlockId> = Map::new();
    idom.insert(cfg.entry(), cfg.entry());

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let mut new_idom: Option<BlockId> = None;
            for p in cfg.predecessors(b) {
                if !idom.contains_key(&p) {
                    continue; // not yet processed this round
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, &postorder_number),
                });
            }
            if let Some(ni) = new_idom {
                if idom.get(&b) != Some(&ni) {
                    idom.insert(b, ni);
                    changed = true;
                }
            }
        }
    }

    Dominators {
        idom,
        postorder_number,
    }
}

fn postorder<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> Vec<BlockId> {
    let mut visited: Set<BlockId> = Set::new();
    let mut order = Vec::new();
    let mut stack: Vec<(BlockId, std::vec::IntoIter<BlockId>)> = Vec::new();

    visited.insert(cfg.entry());
    stack.push((cfg.entry(), cfg.successors(cfg.entry()).collect::<Vec<_>>().into_iter()));

    while let Some((block, mut succs)) = stack.pop() {
        match succs.next() {
            Some(next) => {
                stack.push((block, succs));
                if visited.insert(next) {
                    stack.push((next, cfg.successors(next).collect::<Vec<_>>().into_iter()));
                }
            }
            None => order.push(block),
        }
    }
    order
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &Map<BlockId, BlockId>,
    num: &Map<BlockId, usize>,
) -> BlockId {
    while a != b {
        while num[&a] < num[&b] {
            a = idom[&a];
        }
        while num[&b] < num[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Reverse-postorder over the graph's reachable blocks, entry first. Used
/// both by [`compute`]'s outer fixpoint loop and by
/// [`crate::cfg::linearize`] as the base block order (spec.md §4.4 step 1).
pub fn reverse_postorder<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> Vec<BlockId> {
    let mut po = postorder(cfg);
    po.reverse();
    po
}
