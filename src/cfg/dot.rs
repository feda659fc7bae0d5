//! DOT debug printer (spec.md §4.7). Purely observational: never mutates
//! the graph it renders. Grounded on the teacher's `dump_cfg` in
//! `middle_end/lir/cfg_dump_impl.rs`, which builds the same per-block,
//! left-justified instruction dump before emitting edges.

use std::fmt::Write as _;

use crate::ir::MethodItem;

use super::{ControlFlowGraph, EdgeKind};

pub fn to_dot<E: MethodItem>(cfg: &ControlFlowGraph<E>) -> String {
    let mut out = String::from("digraph cfg {\n");

    for block in cfg.blocks() {
        let mut label = format!("B{}\\l", block.id());
        for entry in block.entries() {
            let _ = write!(label, "{entry}\\l");
        }
        let _ = writeln!(out, "  \"{}\" [shape=box, label=\"{}\"];", block.id(), label);
    }

    for block in cfg.blocks() {
        for &edge_id in block.succs() {
            let edge = cfg.edge(edge_id);
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                edge.src,
                edge.target,
                edge_label(edge.kind)
            );
        }
    }

    out.push_str("}\n");
    out
}

fn edge_label(kind: EdgeKind) -> &'static str {
    kind.label()
}
