//! CFG → flat IR stream (spec.md §4.4), the inverse of construction:
//!
//! 1. Choose a deterministic block order (reverse-postorder, entry first;
//!    try-region handler blocks are relocated to sit right after their
//!    region's last protected block, matching the canonical shape spec.md
//!    §8's scenario 5 pictures).
//! 2. Reintroduce an explicit branch wherever the new order breaks a
//!    block's recorded default successor.
//! 3. Drop an existing unconditional branch that the new order makes
//!    redundant (its target is already the immediately following block).
//! 4. Re-wrap contiguous protected runs in `TryStart`/`TryEnd`, and prepend
//!    a `Catch` marker to each handler block.
//! 5. Emit a `Target` entry at the head of every block some branch still
//!    references, reusing the block's original label if it has one.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use crate::ir::{EntryKind, Flow, MethodItem, TargetId, TryId};

use super::{dominators, BlockId, ControlFlowGraph};

pub fn linearize<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> Vec<E> {
    let order = choose_order(cfg);
    let next_of: Map<BlockId, Option<BlockId>> = order
        .iter()
        .enumerate()
        .map(|(i, &b)| (b, order.get(i + 1).copied()))
        .collect();

    let mut labeler = Labeler::new(cfg);
    let mut bodies: Map<BlockId, Vec<E>> = Map::new();
    let mut referenced: Set<BlockId> = Set::new();

    for &b in &order {
        let block = cfg.block(b);
        let next = next_of[&b];
        let mut entries: Vec<E> = block.entries().to_vec();

        let last_goto_target = entries.last().and_then(|e| {
            if e.kind() != EntryKind::Instruction {
                return None;
            }
            match e.flow() {
                Flow::Goto { target, .. } => Some(labeler.resolve(target)),
                _ => None,
            }
        });

        // Step 3: drop a now-redundant trailing unconditional branch.
        if last_goto_target.is_some() && last_goto_target == next {
            entries.pop();
        } else if let Some(t) = last_goto_target {
            referenced.insert(t);
        }

        // Any surviving If/Switch still needs its destinations labelled.
        for e in &entries {
            if e.kind() != EntryKind::Instruction {
                continue;
            }
            match e.flow() {
                Flow::If { taken } => {
                    referenced.insert(labeler.resolve(taken));
                }
                Flow::Switch { cases, default } => {
                    for c in cases {
                        referenced.insert(labeler.resolve(c));
                    }
                    referenced.insert(labeler.resolve(default));
                }
                _ => {}
            }
        }

        // Step 2: reintroduce an explicit branch if the order broke
        // fall-through to the recorded default successor.
        if let Some(def) = block.default_successor() {
            let already_present = entries.last().map_or(false, |e| {
                e.kind() == EntryKind::Instruction
                    && matches!(e.flow(), Flow::Goto { target, .. } if labeler.resolve(target) == def)
            });
            if Some(def) != next && !already_present {
                let label = labeler.label_for(def);
                entries.push(E::make_goto(label));
                referenced.insert(def);
            }
        }

        bodies.insert(b, entries);
    }

    // Step 5: label every still-referenced block.
    for &b in &referenced {
        let label = labeler.label_for(b);
        bodies.get_mut(&b).unwrap().insert(0, E::make_target(label));
    }

    wrap_regions(cfg, &order, bodies)
}

/// Reverse-postorder, then pull each try region's handler chain to sit
/// immediately after the last block it protects.
fn choose_order<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> Vec<BlockId> {
    let base = dominators::reverse_postorder(cfg);

    let handler_set: Set<BlockId> = cfg
        .try_regions()
        .flat_map(|(_, r)| r.handlers.iter().copied())
        .collect();

    let mut last_index_of_region: Map<TryId, usize> = Map::new();
    for (i, &b) in base.iter().enumerate() {
        if let Some(region) = cfg.block(b).catch_region() {
            last_index_of_region.insert(region, i);
        }
    }

    let mut order = Vec::with_capacity(base.len());
    let mut inserted: Set<TryId> = Set::new();
    for (i, &b) in base.iter().enumerate() {
        if handler_set.contains(&b) {
            continue; // placed explicitly below
        }
        order.push(b);
        if let Some(region) = cfg.block(b).catch_region() {
            if last_index_of_region.get(&region) == Some(&i) && inserted.insert(region) {
                for &h in &cfg.try_region(region).unwrap().handlers {
                    order.push(h);
                }
            }
        }
    }
    // Any handler never reached above (e.g. unreachable protected blocks
    // pruned entirely) is still appended so no block is lost.
    for &h in &handler_set {
        if !order.contains(&h) {
            order.push(h);
        }
    }
    order
}

/// Walk the chosen order, wrapping contiguous protected runs in
/// `TryStart`/`TryEnd` and prepending `Catch` markers to handler blocks.
fn wrap_regions<E: MethodItem>(
    cfg: &ControlFlowGraph<E>,
    order: &[BlockId],
    mut bodies: Map<BlockId, Vec<E>>,
) -> Vec<E> {
    let mut out = Vec::new();
    let mut open: Option<TryId> = None;

    for &b in order {
        let block = cfg.block(b);
        let region = block.catch_region();

        if open.is_some() && open != region {
            out.push(E::make_try_end(open.unwrap()));
            open = None;
        }
        if let Some(r) = region {
            if open != Some(r) {
                out.push(E::make_try_start(r));
                open = Some(r);
            }
        }

        let mut body = bodies.remove(&b).unwrap();
        if let Some((region_id, _)) = cfg.try_regions().find(|(_, tr)| tr.handlers.contains(&b)) {
            body.insert(0, E::make_catch(region_id));
        }
        out.append(&mut body);
    }
    if let Some(r) = open {
        out.push(E::make_try_end(r));
    }
    out
}

/// Tracks the `TargetId <-> BlockId` correspondence while emitting: starts
/// from every label the original stream declared (so retained branch
/// instructions keep resolving to the same block), and mints a fresh,
/// collision-free id the first time a block needs one it didn't already
/// have.
struct Labeler {
    block_of_target: Map<TargetId, BlockId>,
    target_of_block: Map<BlockId, TargetId>,
    next: u32,
}

impl Labeler {
    fn new<E>(cfg: &ControlFlowGraph<E>) -> Self {
        let block_of_target = cfg.labels().clone();
        let target_of_block = block_of_target.iter().map(|(t, b)| (*b, *t)).collect();
        let next = block_of_target.keys().map(|t| t.0).max().map_or(0, |m| m + 1);
        Labeler {
            block_of_target,
            target_of_block,
            next,
        }
    }

    fn resolve(&self, target: TargetId) -> BlockId {
        self.block_of_target[&target]
    }

    fn label_for(&mut self, block: BlockId) -> TargetId {
        if let Some(&t) = self.target_of_block.get(&block) {
            return t;
        }
        let t = TargetId(self.next);
        self.next += 1;
        self.target_of_block.insert(block, t);
        self.block_of_target.insert(t, block);
        t
    }
}
