use std::fmt;

use pretty_assertions::assert_eq;

use crate::ir::{EntryKind, Flow, MethodItem, TargetId, TryId};

use super::ControlFlowGraph;

/// An in-memory `MethodItem` fixture: just enough of an instruction to
/// drive block partitioning and edge wiring, with a name for readable
/// failures.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Item {
    Insn(&'static str, TestFlow),
    Target(TargetId),
    TryStart(TryId),
    TryEnd(TryId),
    Catch(TryId),
}

/// [`Flow`] isn't `PartialEq`/`Eq` (`Flow::Switch` holds a `Vec`, fine for
/// equality, but there's no reason to derive it on the production type) —
/// local mirror so `Item` can derive them for assertion convenience.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TestFlow {
    Fallthrough,
    Goto { target: TargetId, implicit: bool },
    If { taken: TargetId },
    Throw,
    Return,
}

impl From<TestFlow> for Flow {
    fn from(f: TestFlow) -> Flow {
        match f {
            TestFlow::Fallthrough => Flow::Fallthrough,
            TestFlow::Goto { target, implicit } => Flow::Goto { target, implicit },
            TestFlow::If { taken } => Flow::If { taken },
            TestFlow::Throw => Flow::Throw,
            TestFlow::Return => Flow::Return,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Insn(name, _) => write!(f, "{name}"),
            Item::Target(id) => write!(f, "target {id}"),
            Item::TryStart(id) => write!(f, "try_start {id}"),
            Item::TryEnd(id) => write!(f, "try_end {id}"),
            Item::Catch(id) => write!(f, "catch {id}"),
        }
    }
}

impl MethodItem for Item {
    fn kind(&self) -> EntryKind {
        match self {
            Item::Insn(..) => EntryKind::Instruction,
            Item::Target(id) => EntryKind::Target(*id),
            Item::TryStart(id) => EntryKind::TryStart(*id),
            Item::TryEnd(id) => EntryKind::TryEnd(*id),
            Item::Catch(id) => EntryKind::Catch(*id),
        }
    }

    fn flow(&self) -> Flow {
        match self {
            Item::Insn(_, f) => f.clone().into(),
            other => panic!("flow() called on non-instruction entry {other}"),
        }
    }

    fn make_target(id: TargetId) -> Self {
        Item::Target(id)
    }
    fn make_goto(id: TargetId) -> Self {
        Item::Insn(
            "goto",
            TestFlow::Goto {
                target: id,
                implicit: false,
            },
        )
    }
    fn make_try_start(region: TryId) -> Self {
        Item::TryStart(region)
    }
    fn make_try_end(region: TryId) -> Self {
        Item::TryEnd(region)
    }
    fn make_catch(region: TryId) -> Self {
        Item::Catch(region)
    }
}

fn insn(name: &'static str) -> Item {
    Item::Insn(name, TestFlow::Fallthrough)
}
fn branch_if(taken: TargetId) -> Item {
    Item::Insn("branch_if", TestFlow::If { taken })
}
fn goto(target: TargetId, implicit: bool) -> Item {
    Item::Insn("goto", TestFlow::Goto { target, implicit })
}
fn ret() -> Item {
    Item::Insn("return", TestFlow::Return)
}
fn throw() -> Item {
    Item::Insn("throw", TestFlow::Throw)
}
fn target(id: u32) -> Item {
    Item::Target(TargetId(id))
}
fn try_start(id: u32) -> Item {
    Item::TryStart(TryId(id))
}
fn try_end(id: u32) -> Item {
    Item::TryEnd(TryId(id))
}
fn catch(id: u32) -> Item {
    Item::Catch(TryId(id))
}

/// Every block but the entry must have a predecessor, and every edge must
/// be listed at both of its endpoints (spec.md §3's graph invariants).
fn assert_well_formed(cfg: &ControlFlowGraph<Item>) {
    for block in cfg.blocks() {
        if block.id() != cfg.entry() {
            assert!(!block.preds().is_empty(), "block {} has no predecessor", block.id());
        }
        for &e in block.succs() {
            assert_eq!(cfg.source(e), block.id());
        }
        for &e in block.preds() {
            assert_eq!(cfg.target(e), block.id());
        }
    }
}

#[test]
fn straight_line() {
    let cfg = ControlFlowGraph::build(vec![insn("i1"), insn("i2"), ret()]);
    assert_well_formed(&cfg);
    assert_eq!(cfg.blocks().count(), 1);
    assert_eq!(cfg.exit(), Some(cfg.entry()));
    assert_eq!(cfg.successors(cfg.entry()).count(), 0);

    let names: Vec<&'static str> = cfg
        .instructions()
        .map(|e| match e {
            Item::Insn(name, _) => *name,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(names, vec!["i1", "i2", "return"]);
}

#[test]
fn diamond() {
    let l = TargetId(1);
    let end = TargetId(2);
    let cfg = ControlFlowGraph::build(vec![
        insn("i1"),
        branch_if(l),
        insn("i2"),
        goto(end, false),
        target(1),
        insn("i3"),
        target(2),
        insn("i4"),
        ret(),
    ]);
    assert_well_formed(&cfg);
    assert_eq!(cfg.blocks().count(), 4);

    let entry = cfg.entry();
    assert_eq!(cfg.successors(entry).count(), 2);

    let exit = cfg.exit().expect("diamond has a unique exit");
    assert_eq!(cfg.predecessors(exit).count(), 2);

    let dom = cfg.dominators();
    assert_eq!(dom.idom(exit), Some(entry));
    assert!(dom.dominates(entry, exit));
}

#[test]
fn loop_back_edge() {
    let h = TargetId(1);
    let cfg = ControlFlowGraph::build(vec![target(1), insn("i1"), branch_if(h), ret()]);
    assert_well_formed(&cfg);
    assert_eq!(cfg.blocks().count(), 2);

    let entry = cfg.entry();
    let successors: Vec<_> = cfg.successors(entry).collect();
    assert!(successors.contains(&entry), "header must branch back to itself");

    let exit = cfg.exit().expect("loop has a unique exit");
    assert_ne!(exit, entry);

    let dom = cfg.dominators();
    assert_eq!(dom.idom(entry), Some(entry));
    assert_eq!(dom.idom(exit), Some(entry));
}

#[test]
fn try_catch() {
    let cfg = ControlFlowGraph::build(vec![
        try_start(1),
        insn("i1"),
        throw(),
        try_end(1),
        catch(1),
        insn("i2"),
        ret(),
    ]);
    assert_well_formed(&cfg);
    // The TryEnd-only slice between the protected block and the handler
    // carries no instructions and is never reached by fall-through (the
    // protected block ends in `throw`, which has no ordinary successor),
    // so it is pruned as unreachable.
    assert_eq!(cfg.blocks().count(), 2);

    let entry = cfg.entry();
    let succs: Vec<_> = cfg.block(entry).succs().iter().map(|&e| cfg.edge(e)).collect();
    assert_eq!(succs.len(), 1);
    assert_eq!(succs[0].kind, super::EdgeKind::Throw);

    let region = cfg.try_region(TryId(1)).expect("region 1 survives");
    assert_eq!(region.handlers.len(), 1);
    assert_eq!(cfg.block(entry).catch_region(), Some(TryId(1)));
}

#[test]
fn unreachable_block_is_pruned() {
    let l2 = TargetId(1);
    let cfg = ControlFlowGraph::build(vec![goto(l2, false), insn("i1"), target(1), insn("i2"), ret()]);
    assert_well_formed(&cfg);
    assert_eq!(cfg.blocks().count(), 2);

    let bodies: Vec<Vec<&Item>> = cfg.blocks().map(|b| b.entries().iter().collect()).collect();
    let has_i1 = bodies
        .iter()
        .any(|b| b.iter().any(|e| matches!(e, Item::Insn("i1", _))));
    assert!(!has_i1, "the unreachable block holding i1 must not survive pruning");
}

#[test]
fn linearize_then_rebuild_preserves_shape() {
    let l = TargetId(1);
    let end = TargetId(2);
    let cfg = ControlFlowGraph::build(vec![
        insn("i1"),
        branch_if(l),
        insn("i2"),
        goto(end, false),
        target(1),
        insn("i3"),
        target(2),
        insn("i4"),
        ret(),
    ]);

    let stream = cfg.linearize();
    let rebuilt = ControlFlowGraph::build(stream);
    assert_well_formed(&rebuilt);
    assert_eq!(rebuilt.blocks().count(), cfg.blocks().count());
    assert_eq!(
        rebuilt.successors(rebuilt.entry()).count(),
        cfg.successors(cfg.entry()).count()
    );

    let exit = rebuilt.exit().expect("diamond still has a unique exit after a round trip");
    assert_eq!(rebuilt.predecessors(exit).count(), 2);
}

#[test]
fn linearize_drops_redundant_fallthrough_goto() {
    let cfg = ControlFlowGraph::build(vec![insn("i1"), insn("i2"), ret()]);
    let stream = cfg.linearize();
    assert!(
        stream.iter().all(|e| !matches!(e, Item::Insn("goto", _))),
        "a single straight-line block needs no synthesized goto"
    );
}

#[test]
fn linearize_round_trips_try_catch() {
    let cfg = ControlFlowGraph::build(vec![
        try_start(1),
        insn("i1"),
        throw(),
        try_end(1),
        catch(1),
        insn("i2"),
        ret(),
    ]);
    let stream = cfg.linearize();
    let rebuilt = ControlFlowGraph::build(stream);
    assert_well_formed(&rebuilt);
    assert_eq!(rebuilt.blocks().count(), 2);
    assert!(rebuilt.try_region(TryId(1)).is_some());
}
