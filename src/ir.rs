//! The IR stream interface the CFG builder consumes.
//!
//! This module owns no instruction semantics. It only describes the shape a
//! method-item entry must expose for block partitioning and edge wiring:
//! what kind of entry it is, and — when it is an instruction — how control
//! leaves it. Opcode/operand modelling belongs to the caller.

use derive_more::Display;
use std::fmt;

/// A block-local label minted by an IR producer to connect a branch source
/// to its `Target` entry. Opaque outside this crate; stripped once the CFG
/// is built (see [`crate::cfg::ControlFlowGraph::build`]).
#[derive(Display, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(pub u32);

/// Identifies a try region, correlating a `TryStart`/`TryEnd` pair with the
/// `Catch` entries that form its handler chain.
#[derive(Display, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TryId(pub u32);

/// The discriminated kind of a method-item entry (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// An ordinary instruction. Its control-flow shape is given by
    /// [`MethodItem::flow`].
    Instruction,
    /// A branch destination. Valid only as the first entry of a block.
    Target(TargetId),
    /// The first instruction of a protected (`try`) region.
    TryStart(TryId),
    /// The last instruction of a protected region, inclusive.
    TryEnd(TryId),
    /// The first entry of an exception handler.
    Catch(TryId),
    /// Debug metadata (source map, line table, ...). Not control flow.
    Debug,
    /// A position marker (source line/column). Not control flow.
    Position,
}

impl EntryKind {
    /// `Target` and `Catch` entries both mark the start of a block: a
    /// `Target` is a branch destination, a `Catch` is its handler's entry
    /// point. Everything else about them is producer-defined.
    pub fn starts_block(self) -> bool {
        matches!(self, EntryKind::Target(_) | EntryKind::Catch(_))
    }
}

/// How control leaves an instruction. Only meaningful when
/// [`MethodItem::kind`] returns [`EntryKind::Instruction`]; the CFG builder
/// never calls it otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// No terminator: control falls through to the next entry.
    Fallthrough,
    /// An unconditional transfer to `target`.
    ///
    /// `implicit` distinguishes a branch the producer wrote explicitly from
    /// one that exists only to express an otherwise-implicit fall-through
    /// (spec.md §4.3 phase 2: "record the target as the block's default
    /// successor only if it is a fall-through"). Implicit gotos are the
    /// ones [`crate::cfg::linearize`] is allowed to drop when re-emitting a
    /// stream (spec.md §4.4 step 4).
    Goto { target: TargetId, implicit: bool },
    /// A conditional branch: `taken` on true, fall through to the next
    /// block in stream order otherwise.
    If { taken: TargetId },
    /// A multi-way branch: one edge per case, plus a default.
    Switch {
        cases: Vec<TargetId>,
        default: TargetId,
    },
    /// An exception throw. No ordinary successor.
    Throw,
    /// A return. No ordinary successor.
    Return,
}

/// A single element of the method's linear IR, and the trait the CFG
/// builder is generic over.
///
/// `Display` is required so the DOT printer (§4.7) can render each
/// instruction's "textual instruction dump" without knowing its concrete
/// type.
pub trait MethodItem: Clone + fmt::Display {
    fn kind(&self) -> EntryKind;

    /// Control-flow shape of this entry. Implementations may panic if
    /// called on a non-`Instruction` entry; the builder never does so.
    fn flow(&self) -> Flow;

    /// Synthesize a `Target` entry labelling `id`, for [`crate::cfg::linearize`].
    fn make_target(id: TargetId) -> Self;
    /// Synthesize an explicit unconditional branch to `id`.
    fn make_goto(id: TargetId) -> Self;
    /// Synthesize a `TryStart` marker for `region`.
    fn make_try_start(region: TryId) -> Self;
    /// Synthesize a `TryEnd` marker for `region`.
    fn make_try_end(region: TryId) -> Self;
    /// Synthesize a `Catch` marker beginning `region`'s handler.
    fn make_catch(region: TryId) -> Self;
}
