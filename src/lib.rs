//! Two reusable primitives for a bytecode static-analysis framework: a
//! generic flat-lattice abstract domain, and a control-flow graph over a
//! method's linear IR (construction, dominators, an instruction iterator,
//! a linearizer, and a DOT debug printer).
//!
//! Instruction/opcode semantics, the fixpoint iterator that would consume
//! a CFG and a lattice together, and any concrete analysis instantiating
//! the domain are all out of scope — this crate exposes the interfaces
//! those collaborators need and implements none of them.

pub mod cfg;
pub mod ir;
pub mod lattice;

pub use cfg::ControlFlowGraph;
pub use ir::MethodItem;
pub use lattice::{ConstantValue, Flat};
