//! Control-flow graph construction and the structural queries built on top
//! of it (spec.md §3, §4.3).
//!
//! Only the editable mode described in the original system survives here;
//! spec.md §9 itself flags the non-editable view as transitional baggage a
//! fresh implementation should drop, so `ControlFlowGraph::build` always
//! takes ownership of its input stream.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::ops::Range;

use crate::ir::{EntryKind, Flow, MethodItem, TargetId, TryId};

pub mod dominators;
pub mod dot;
pub mod iter;
pub mod linearize;

#[cfg(test)]
mod tests;

pub use dominators::Dominators;
pub use iter::InstructionIter;

/// A stable, arena-style identifier for a basic block, unique within its
/// graph. Ordering matches id order, which is also default iteration order
/// (spec.md §3: "ordering is the id order and drives default iteration").
#[derive(derive_more::Display, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// A stable identifier for an edge, used so predecessor/successor lists can
/// hold ids into a single shared edge table rather than duplicating edge
/// data at both endpoints (spec.md §9: "Shared edge objects").
#[derive(derive_more::Display, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub u32);

/// The three edge kinds a CFG edge may carry (spec.md glossary).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Fall-through or unconditional transfer.
    Goto,
    /// One arm of a conditional or switch.
    Branch,
    /// Exception-flow transfer into a catch handler.
    Throw,
}

impl EdgeKind {
    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::Goto => "goto",
            EdgeKind::Branch => "branch",
            EdgeKind::Throw => "throw",
        }
    }
}

/// A directed edge `(src, target, kind)`. Logically owned by the graph; both
/// endpoints hold only the [`EdgeId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub src: BlockId,
    pub target: BlockId,
    pub kind: EdgeKind,
}

/// A maximal straight-line region of the method's IR, plus its typed edges.
#[derive(Clone, Debug)]
pub struct BasicBlock<E> {
    id: BlockId,
    entries: Vec<E>,
    preds: Vec<EdgeId>,
    succs: Vec<EdgeId>,
    default_succ: Option<BlockId>,
    catch_region: Option<TryId>,
}

impl<E> BasicBlock<E> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// Direct access to the block's owned entries, for passes that rewrite
    /// instructions in place. Editable-mode CFGs own their entries outright
    /// (spec.md §4.3), so this is a plain `&mut Vec`, not a guarded cursor.
    pub fn entries_mut(&mut self) -> &mut Vec<E> {
        &mut self.entries
    }

    pub fn preds(&self) -> &[EdgeId] {
        &self.preds
    }

    pub fn succs(&self) -> &[EdgeId] {
        &self.succs
    }

    /// The block taken on fall-through, or on the default/declared-implicit
    /// arm of a branch — `None` for blocks that end in a throw, a return,
    /// or an explicit (non-default) unconditional goto.
    pub fn default_successor(&self) -> Option<BlockId> {
        self.default_succ
    }

    /// The try region this block is protected by, if any. At most one:
    /// spec.md §3 describes this as a single non-owning reference, not a
    /// stack, so nested try regions are not represented.
    pub fn catch_region(&self) -> Option<TryId> {
        self.catch_region
    }
}

/// A try region: the ordered chain of handler blocks exceptions raised in
/// its protected blocks are routed to.
#[derive(Clone, Debug, Default)]
pub struct TryRegion {
    pub handlers: Vec<BlockId>,
}

/// The control-flow graph for one method body.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph<E> {
    blocks: Map<BlockId, BasicBlock<E>>,
    edges: Map<EdgeId, Edge>,
    entry: BlockId,
    exit: Option<BlockId>,
    try_regions: Map<TryId, TryRegion>,
    /// Every `TargetId` the *original* stream declared, and the block it
    /// resolved to. Kept for the graph's lifetime (not just during
    /// construction) so `linearize` can re-use the same labels for branch
    /// instructions it never rewrites, rather than mint fresh ones that
    /// would no longer match what those instructions still embed.
    labels: Map<TargetId, BlockId>,
    next_edge: u32,
}

impl<E: MethodItem> ControlFlowGraph<E> {
    /// Build a CFG from a flat IR stream, taking ownership of it.
    ///
    /// Panics (spec.md §7: structural violations are fatal, never
    /// recovered) on a dangling branch target, an unterminated try region,
    /// or a block nested under more than one try region.
    pub fn build(stream: Vec<E>) -> Self {
        assert!(
            !stream.is_empty(),
            "cannot build a control-flow graph from an empty instruction stream"
        );

        let starts = Self::find_boundaries(&stream);
        let ranges = Self::block_ranges(&starts, stream.len());
        let (labels, try_spans, catch_chains) = Self::index_markers(&stream, &ranges);

        let mut blocks = Map::new();
        for (i, range) in ranges.iter().enumerate() {
            let id = BlockId(i as u32);
            let entries: Vec<E> = stream[range.clone()]
                .iter()
                .filter(|e| {
                    !matches!(
                        e.kind(),
                        EntryKind::Target(_)
                            | EntryKind::TryStart(_)
                            | EntryKind::TryEnd(_)
                            | EntryKind::Catch(_)
                    )
                })
                .cloned()
                .collect();
            blocks.insert(
                id,
                BasicBlock {
                    id,
                    entries,
                    preds: Vec::new(),
                    succs: Vec::new(),
                    default_succ: None,
                    catch_region: None,
                },
            );
        }

        let mut cfg = ControlFlowGraph {
            blocks,
            edges: Map::new(),
            entry: BlockId(0),
            exit: None,
            try_regions: Map::new(),
            labels,
            next_edge: 0,
        };

        cfg.connect(&stream, &ranges);
        cfg.add_catch_edges(&ranges, &try_spans, &catch_chains);
        cfg.prune_unreachable();
        cfg.choose_exit();
        cfg.sanity_check();
        cfg
    }

    // ---- phase 1: partition -------------------------------------------

    fn find_boundaries(stream: &[E]) -> Vec<usize> {
        let mut starts: Set<usize> = Set::new();
        starts.insert(0);
        for (i, e) in stream.iter().enumerate() {
            if e.kind().starts_block() {
                starts.insert(i);
            }
            if matches!(e.kind(), EntryKind::TryEnd(_)) && i + 1 < stream.len() {
                starts.insert(i + 1);
            }
            if e.kind() == EntryKind::Instruction
                && !matches!(e.flow(), Flow::Fallthrough)
                && i + 1 < stream.len()
            {
                starts.insert(i + 1);
            }
        }
        starts.into_iter().collect()
    }

    fn block_ranges(starts: &[usize], len: usize) -> Vec<Range<usize>> {
        starts
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let e = starts.get(i + 1).copied().unwrap_or(len);
                s..e
            })
            .collect()
    }

    #[allow(clippy::type_complexity)]
    fn index_markers(
        stream: &[E],
        ranges: &[Range<usize>],
    ) -> (
        Map<TargetId, BlockId>,
        Map<TryId, (usize, usize)>,
        Map<TryId, Vec<BlockId>>,
    ) {
        let block_of = |pos: usize| -> BlockId {
            let idx = ranges
                .iter()
                .position(|r| r.contains(&pos))
                .unwrap_or_else(|| panic!("position {pos} does not belong to any block"));
            BlockId(idx as u32)
        };

        let mut labels = Map::new();
        let mut try_start_pos: Map<TryId, usize> = Map::new();
        let mut try_spans = Map::new();
        let mut catch_chains: Map<TryId, Vec<BlockId>> = Map::new();

        for (i, e) in stream.iter().enumerate() {
            match e.kind() {
                EntryKind::Target(id) => {
                    let prior = labels.insert(id, block_of(i));
                    assert!(prior.is_none(), "duplicate Target label {id:?} in IR stream");
                }
                EntryKind::TryStart(id) => {
                    let prior = try_start_pos.insert(id, i);
                    assert!(prior.is_none(), "duplicate TryStart for region {id:?}");
                }
                EntryKind::TryEnd(id) => {
                    let start = try_start_pos
                        .remove(&id)
                        .unwrap_or_else(|| panic!("TryEnd for region {id:?} has no matching TryStart"));
                    try_spans.insert(id, (start, i));
                }
                EntryKind::Catch(id) => {
                    catch_chains.entry(id).or_default().push(block_of(i));
                }
                _ => {}
            }
        }

        assert!(
            try_start_pos.is_empty(),
            "unterminated try region(s): {:?}",
            try_start_pos.keys().collect::<Vec<_>>()
        );

        (labels, try_spans, catch_chains)
    }

    // ---- phase 2: connect blocks ---------------------------------------

    fn connect(&mut self, stream: &[E], ranges: &[Range<usize>]) {
        let n = ranges.len();
        for i in 0..n {
            let id = BlockId(i as u32);
            let range = ranges[i].clone();
            let last = &stream[range.end - 1];
            let next_block = (i + 1 < n).then(|| BlockId((i + 1) as u32));

            if last.kind() != EntryKind::Instruction {
                // A block closed by a TryEnd/Catch/Target/Debug/Position
                // entry (rather than a real terminator) simply falls
                // through, same as a block with no terminator at all.
                if let Some(next) = next_block {
                    self.add_edge(id, next, EdgeKind::Goto);
                    self.set_default_succ(id, next);
                }
                continue;
            }

            match last.flow() {
                Flow::Fallthrough => {
                    if let Some(next) = next_block {
                        self.add_edge(id, next, EdgeKind::Goto);
                        self.set_default_succ(id, next);
                    }
                }
                Flow::Goto { target, implicit } => {
                    let dest = self.resolve(target);
                    self.add_edge(id, dest, EdgeKind::Goto);
                    if implicit {
                        self.set_default_succ(id, dest);
                    }
                }
                Flow::If { taken } => {
                    let dest = self.resolve(taken);
                    self.add_edge(id, dest, EdgeKind::Branch);
                    let next = next_block.unwrap_or_else(|| {
                        panic!("conditional branch in the final block has no fall-through target")
                    });
                    self.add_edge(id, next, EdgeKind::Goto);
                    self.set_default_succ(id, next);
                }
                Flow::Switch { cases, default } => {
                    for case in &cases {
                        let dest = self.resolve(*case);
                        self.add_edge(id, dest, EdgeKind::Branch);
                    }
                    let dest = self.resolve(default);
                    self.add_edge(id, dest, EdgeKind::Goto);
                    self.set_default_succ(id, dest);
                }
                Flow::Throw | Flow::Return => {}
            }
        }
    }

    fn resolve(&self, target: TargetId) -> BlockId {
        *self
            .labels
            .get(&target)
            .unwrap_or_else(|| panic!("branch to undeclared target {target:?}"))
    }

    fn add_edge(&mut self, src: BlockId, target: BlockId, kind: EdgeKind) {
        let exists = self.blocks[&src]
            .succs
            .iter()
            .any(|e| self.edges[e].target == target && self.edges[e].kind == kind);
        if exists {
            return;
        }
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(id, Edge { src, target, kind });
        self.blocks.get_mut(&src).unwrap().succs.push(id);
        self.blocks.get_mut(&target).unwrap().preds.push(id);
    }

    fn set_default_succ(&mut self, block: BlockId, succ: BlockId) {
        self.blocks.get_mut(&block).unwrap().default_succ = Some(succ);
    }

    // ---- phase 3: catch edges -------------------------------------------

    fn add_catch_edges(
        &mut self,
        ranges: &[Range<usize>],
        try_spans: &Map<TryId, (usize, usize)>,
        catch_chains: &Map<TryId, Vec<BlockId>>,
    ) {
        for (&try_id, &(start, end)) in try_spans {
            let handlers = catch_chains
                .get(&try_id)
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| panic!("try region {try_id:?} declares no catch handler"));

            self.try_regions.insert(
                try_id,
                TryRegion {
                    handlers: handlers.clone(),
                },
            );

            for (i, range) in ranges.iter().enumerate() {
                if range.start > end || range.end <= start {
                    continue; // outside [start, end]
                }
                let block = BlockId(i as u32);
                let prior = self.blocks.get_mut(&block).unwrap().catch_region;
                assert!(
                    prior.is_none() || prior == Some(try_id),
                    "block {block:?} is protected by more than one try region"
                );
                self.blocks.get_mut(&block).unwrap().catch_region = Some(try_id);
                for &handler in handlers {
                    self.add_edge(block, handler, EdgeKind::Throw);
                }
            }
        }
    }

    // ---- phase 4: prune + exit -------------------------------------------

    fn prune_unreachable(&mut self) {
        let mut visited: Set<BlockId> = Set::new();
        let mut stack = vec![self.entry];
        visited.insert(self.entry);
        while let Some(b) = stack.pop() {
            for succ in self.successors(b).collect::<Vec<_>>() {
                if visited.insert(succ) {
                    stack.push(succ);
                }
            }
        }

        let dead_edges: Set<EdgeId> = self
            .edges
            .iter()
            .filter(|(_, e)| !visited.contains(&e.src) || !visited.contains(&e.target))
            .map(|(id, _)| *id)
            .collect();

        for id in &dead_edges {
            self.edges.remove(id);
        }
        for block in self.blocks.values_mut() {
            block.succs.retain(|e| !dead_edges.contains(e));
            block.preds.retain(|e| !dead_edges.contains(e));
            if block.default_succ.is_some() && !block.succs.iter().any(|e| {
                self.edges.get(e).map_or(false, |edge| Some(edge.target) == block.default_succ)
            }) {
                block.default_succ = None;
            }
        }

        self.blocks.retain(|id, _| visited.contains(id));
        self.try_regions.retain(|_, region| {
            region.handlers.retain(|h| visited.contains(h));
            !region.handlers.is_empty()
        });
    }

    fn choose_exit(&mut self) {
        let terminal: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|b| b.succs.is_empty())
            .map(|b| b.id)
            .collect();

        self.exit = match terminal.len() {
            0 => None,
            1 => Some(terminal[0]),
            _ => {
                let ghost_id = BlockId(self.blocks.keys().map(|b| b.0).max().unwrap() + 1);
                self.blocks.insert(
                    ghost_id,
                    BasicBlock {
                        id: ghost_id,
                        entries: Vec::new(),
                        preds: Vec::new(),
                        succs: Vec::new(),
                        default_succ: None,
                        catch_region: None,
                    },
                );
                for b in terminal {
                    self.add_edge(b, ghost_id, EdgeKind::Goto);
                }
                Some(ghost_id)
            }
        };
    }

    fn sanity_check(&self) {
        for (id, block) in &self.blocks {
            for e in &block.succs {
                let edge = &self.edges[e];
                assert_eq!(edge.src, *id, "edge {e:?} is not owned by the block it's listed under");
                assert!(
                    self.blocks.contains_key(&edge.target),
                    "edge target {:?} is not a registered block",
                    edge.target
                );
            }
            for e in &block.preds {
                let edge = &self.edges[e];
                assert_eq!(edge.target, *id, "edge {e:?} is not incoming to the block it's listed under");
                assert!(
                    self.blocks.contains_key(&edge.src),
                    "edge source {:?} is not a registered block",
                    edge.src
                );
            }
            if *id != self.entry {
                assert!(!block.preds.is_empty(), "block {id:?} has no predecessor and is not the entry");
            }
            if let Some(def) = block.default_succ {
                assert!(
                    block.succs.iter().any(|e| self.edges[e].target == def),
                    "default successor {def:?} of {id:?} is not among its successors"
                );
            }
        }
    }
}

impl<E> ControlFlowGraph<E> {
    // ---- graph interface (spec.md §6) ----------------------------------

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> Option<BlockId> {
        self.exit
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock<E> {
        &self.blocks[&id]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock<E>> {
        self.blocks.values()
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock<E> {
        self.blocks.get_mut(&id).expect("unknown block id")
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[&id]
    }

    pub fn predecessors(&self, b: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[&b].preds.iter().map(move |e| self.edges[e].src)
    }

    pub fn successors(&self, b: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[&b].succs.iter().map(move |e| self.edges[e].target)
    }

    pub fn source(&self, e: EdgeId) -> BlockId {
        self.edges[&e].src
    }

    pub fn target(&self, e: EdgeId) -> BlockId {
        self.edges[&e].target
    }

    pub fn try_region(&self, id: TryId) -> Option<&TryRegion> {
        self.try_regions.get(&id)
    }

    pub fn try_regions(&self) -> impl Iterator<Item = (TryId, &TryRegion)> {
        self.try_regions.iter().map(|(id, r)| (*id, r))
    }

    pub(crate) fn labels(&self) -> &Map<TargetId, BlockId> {
        &self.labels
    }

    /// A forward iterator over every `Instruction`-kind entry in the graph
    /// (spec.md §4.6).
    pub fn instructions(&self) -> InstructionIter<'_, E>
    where
        E: MethodItem,
    {
        InstructionIter::new(self)
    }

    /// Immediate-dominator tree (spec.md §4.5).
    pub fn dominators(&self) -> Dominators
    where
        E: MethodItem,
    {
        dominators::compute(self)
    }

    /// Render as a Graphviz `digraph` (spec.md §4.7).
    pub fn to_dot(&self) -> String
    where
        E: MethodItem,
    {
        dot::to_dot(self)
    }

    /// Produce a flat IR stream equivalent to this graph (spec.md §4.4).
    pub fn linearize(&self) -> Vec<E>
    where
        E: MethodItem,
    {
        linearize::linearize(self)
    }
}
