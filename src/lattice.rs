//! A generic three-level ("flat") lattice: `Bottom ⊑ Value(c) ⊑ Top` for
//! every `c`, with `Value(a) ⊑ Value(b)` iff `a = b` (spec.md §4.1).
//!
//! The original system builds this by inheriting from an abstract-domain
//! base class. Per the redesign note in spec.md §9 ("Polymorphic lattice
//! scaffold"), this is re-expressed as a plain tagged enum with free
//! functions; any caller that needs to write an analysis generic over "any
//! lattice" does so over this type directly, parameterized by its own
//! carrier `C`.

use std::fmt;

/// A flat-lattice element over carrier `C`.
///
/// `C` need only support value equality (`PartialEq`) for the lattice
/// operations to be well-defined; `Clone` lets elements be values, matching
/// spec.md §5 ("Lattice elements are values; copies are independent").
#[derive(Clone, Copy, Debug)]
pub enum Flat<C> {
    Bottom,
    Value(C),
    Top,
}

impl<C: PartialEq + Clone> Flat<C> {
    /// The lattice top, `⊤`. Also the default constructor (spec.md §3:
    /// "created at Top by default constructor").
    pub fn top() -> Self {
        Flat::Top
    }

    /// The lattice bottom, `⊥`.
    pub fn bottom() -> Self {
        Flat::Bottom
    }

    /// A specific value.
    pub fn of(c: C) -> Self {
        Flat::Value(c)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Flat::Bottom)
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Flat::Top)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Flat::Value(_))
    }

    /// Structural equality. `Value(a).equals(Value(b))` iff `a == b`.
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Flat::Bottom, Flat::Bottom) => true,
            (Flat::Top, Flat::Top) => true,
            (Flat::Value(a), Flat::Value(b)) => a == b,
            _ => false,
        }
    }

    /// The observer: present iff `self` is `Value`.
    pub fn as_value(&self) -> Option<&C> {
        match self {
            Flat::Value(c) => Some(c),
            _ => None,
        }
    }

    /// Like [`Flat::as_value`], but panics if `self` isn't `Value`.
    ///
    /// Reading the carried value of a `Bottom`/`Top` element is a contract
    /// violation (spec.md §7), not an empty result — callers that expect a
    /// value in hand should use this; callers that are probing for one
    /// should use `as_value`.
    pub fn unwrap_value(&self) -> &C {
        self.as_value()
            .unwrap_or_else(|| panic!("unwrap_value called on a non-Value lattice element"))
    }

    /// The partial order: `a ⊑ b`. Reflexive, transitive, antisymmetric
    /// w.r.t. `equals`.
    pub fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (Flat::Bottom, _) => true,
            (_, Flat::Top) => true,
            (Flat::Value(a), Flat::Value(b)) => a == b,
            _ => false,
        }
    }

    /// Least upper bound.
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Flat::Bottom, x) | (x, Flat::Bottom) => x.clone(),
            (Flat::Top, _) | (_, Flat::Top) => Flat::Top,
            (Flat::Value(a), Flat::Value(b)) => {
                if a == b {
                    Flat::Value(a.clone())
                } else {
                    Flat::Top
                }
            }
        }
    }

    /// Greatest lower bound, dual to [`Flat::join`].
    pub fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Flat::Top, x) | (x, Flat::Top) => x.clone(),
            (Flat::Bottom, _) | (_, Flat::Bottom) => Flat::Bottom,
            (Flat::Value(a), Flat::Value(b)) => {
                if a == b {
                    Flat::Value(a.clone())
                } else {
                    Flat::Bottom
                }
            }
        }
    }

    /// Widening. Chains in a flat lattice have length <= 3, so no
    /// accelerator is needed beyond the join itself (spec.md §4.1).
    pub fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }

    /// Narrowing, dual to [`Flat::widen`].
    pub fn narrow(&self, other: &Self) -> Self {
        self.meet(other)
    }
}

impl<C: PartialEq> PartialEq for Flat<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Flat::Bottom, Flat::Bottom) => true,
            (Flat::Top, Flat::Top) => true,
            (Flat::Value(a), Flat::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl<C: Eq> Eq for Flat<C> {}

impl<C: fmt::Display> fmt::Display for Flat<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flat::Bottom => write!(f, "_|_"),
            Flat::Top => write!(f, "T"),
            Flat::Value(c) => write!(f, "{c}"),
        }
    }
}

impl<C: PartialEq + Clone> Default for Flat<C> {
    /// Matches the default constructor in spec.md §3: created at `Top`.
    fn default() -> Self {
        Flat::top()
    }
}

/// The constant-propagation domain: the flat lattice instantiated with a
/// value-equality-comparable carrier, usable as a cell in a map from
/// analysis variables to domain values (spec.md §4.2).
///
/// This is a thin named alias rather than a distinct type: the constant
/// domain adds no operations beyond what [`Flat`] already provides
/// generically (equality, join/meet/widen/narrow, the `_|_`/`T`/value
/// `Display` impl, and the `as_value` observer). Giving it its own name
/// keeps call sites that mean "the constant domain" readable without
/// duplicating the scaffold.
pub type ConstantValue<C> = Flat<C>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn top() -> Flat<i32> {
        Flat::top()
    }
    fn bot() -> Flat<i32> {
        Flat::bottom()
    }
    fn val(n: i32) -> Flat<i32> {
        Flat::of(n)
    }

    #[test]
    fn trivial_lattice_scenarios() {
        assert_eq!(top().join(&bot()), top());
        assert_eq!(top().meet(&bot()), bot());
        assert_eq!(val(5).join(&val(5)), val(5));
        assert_eq!(val(5).join(&val(6)), top());
        assert_eq!(val(5).meet(&val(6)), bot());
    }

    #[test]
    fn idempotence() {
        for a in [top(), bot(), val(5)] {
            assert_eq!(a.join(&a), a);
            assert_eq!(a.meet(&a), a);
        }
    }

    #[test]
    fn commutativity() {
        let elems = [top(), bot(), val(5), val(6)];
        for a in &elems {
            for b in &elems {
                assert_eq!(a.join(b), b.join(a));
                assert_eq!(a.meet(b), b.meet(a));
            }
        }
    }

    #[test]
    fn associativity() {
        let elems = [top(), bot(), val(5), val(6), val(7)];
        for a in &elems {
            for b in &elems {
                for c in &elems {
                    assert_eq!(a.join(b).join(c), a.join(&b.join(c)));
                    assert_eq!(a.meet(b).meet(c), a.meet(&b.meet(c)));
                }
            }
        }
    }

    #[test]
    fn absorption() {
        let elems = [top(), bot(), val(5), val(6)];
        for a in &elems {
            for b in &elems {
                assert_eq!(a.join(&a.meet(b)), *a);
                assert_eq!(a.meet(&a.join(b)), *a);
            }
        }
    }

    #[test]
    fn order_consistency() {
        let elems = [top(), bot(), val(5), val(6)];
        for a in &elems {
            for b in &elems {
                let leq = a.leq(b);
                assert_eq!(leq, a.join(b) == *b);
                assert_eq!(leq, a.meet(b) == *a);
            }
        }
    }

    #[test]
    fn identity() {
        for a in [top(), bot(), val(5)] {
            assert_eq!(a.join(&bot()), a);
            assert_eq!(a.meet(&top()), a);
        }
    }

    #[test]
    fn as_value_presence() {
        assert_eq!(val(5).as_value(), Some(&5));
        assert_eq!(top().as_value(), None);
        assert_eq!(bot().as_value(), None);
    }

    #[test]
    fn flat_specific_incomparability() {
        assert_eq!(val(5).join(&val(6)), top());
        assert!(!val(5).leq(&val(6)));
        assert!(!val(6).leq(&val(5)));
    }

    #[test]
    #[should_panic(expected = "unwrap_value")]
    fn unwrap_value_panics_on_non_value() {
        top().unwrap_value();
    }

    #[test]
    fn display_form() {
        assert_eq!(top().to_string(), "T");
        assert_eq!(bot().to_string(), "_|_");
        assert_eq!(val(5).to_string(), "5");
    }

    #[test]
    fn default_is_top() {
        assert_eq!(Flat::<i32>::default(), top());
    }
}
