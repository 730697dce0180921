//! The scalar-kind lattice (SPEC_FULL.md §3.1 / §4.1).
//!
//! `ScalarKind` is the leaf value of the `OffsetMap` lattice. `Unknown` is
//! bottom, `Anything` is top; the two merge operators (join `∨`, used
//! wherever facts from different flow paths accumulate into the same
//! storage, and meet `∧`, used wherever a value must satisfy two
//! constraints simultaneously, e.g. a `select`'s result versus its two
//! arms) both collapse disagreeing concrete kinds rather than panicking —
//! panicking on a *specific* disagreement (a pointer-typed SSA value
//! receiving an `Integer` fact) is the analyzer's job, layered on top of
//! this lattice, not this lattice's own job (see `analyzer::update`).

use std::fmt;

use crate::ir::Precision;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKind {
    Unknown,
    Integer,
    Pointer,
    Float(Precision),
    Anything,
}

impl ScalarKind {
    pub const BOTTOM: ScalarKind = ScalarKind::Unknown;
    pub const TOP: ScalarKind = ScalarKind::Anything;

    pub fn is_known(self) -> bool {
        !matches!(self, ScalarKind::Unknown)
    }

    pub fn is_concrete(self) -> bool {
        matches!(self, ScalarKind::Unknown) == false && matches!(self, ScalarKind::Anything) == false
    }

    /// `∨`: join. `Unknown ∨ x = x`; `Anything ∨ x = Anything`; equal kinds
    /// are idempotent; anything else widens all the way to `Anything`
    /// (SPEC_FULL.md §3.1).
    pub fn join(self, other: ScalarKind) -> ScalarKind {
        match (self, other) {
            (ScalarKind::Unknown, x) => x,
            (x, ScalarKind::Unknown) => x,
            (ScalarKind::Anything, _) | (_, ScalarKind::Anything) => ScalarKind::Anything,
            (a, b) if a == b => a,
            _ => ScalarKind::Anything,
        }
    }

    /// `∧`: meet. Same shape as `join`, but a disagreement demotes to
    /// `Unknown` (bottom) instead of widening to `Anything`, since a meet
    /// represents "both must hold" and neither concrete kind can.
    pub fn meet(self, other: ScalarKind) -> ScalarKind {
        match (self, other) {
            (ScalarKind::Unknown, _) | (_, ScalarKind::Unknown) => ScalarKind::Unknown,
            (ScalarKind::Anything, x) => x,
            (x, ScalarKind::Anything) => x,
            (a, b) if a == b => a,
            _ => ScalarKind::Unknown,
        }
    }

    /// The "pointer-aware union" used for `add`/`mul`/bit-level binary ops
    /// (§4.3.5): if one side is concretely `Pointer` and the other is
    /// concretely `Integer`, the combination is `Pointer` (pointer
    /// arithmetic); otherwise it's the plain join.
    pub fn pointer_int_merge(self, other: ScalarKind) -> ScalarKind {
        match (self, other) {
            (ScalarKind::Pointer, ScalarKind::Integer) | (ScalarKind::Integer, ScalarKind::Pointer) => {
                ScalarKind::Pointer
            }
            _ => self.join(other),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Unknown => write!(f, "Unknown"),
            ScalarKind::Integer => write!(f, "Integer"),
            ScalarKind::Pointer => write!(f, "Pointer"),
            ScalarKind::Float(p) => write!(f, "Float<{p}>"),
            ScalarKind::Anything => write!(f, "Anything"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn join_identities() {
        assert_eq!(ScalarKind::Unknown.join(ScalarKind::Integer), ScalarKind::Integer);
        assert_eq!(ScalarKind::Anything.join(ScalarKind::Integer), ScalarKind::Anything);
        assert_eq!(ScalarKind::Integer.join(ScalarKind::Integer), ScalarKind::Integer);
        assert_eq!(ScalarKind::Integer.join(ScalarKind::Pointer), ScalarKind::Anything);
    }

    #[test]
    fn join_is_commutative_and_idempotent() {
        let kinds = [
            ScalarKind::Unknown,
            ScalarKind::Integer,
            ScalarKind::Pointer,
            ScalarKind::Float(Precision::Double),
            ScalarKind::Anything,
        ];
        for &a in &kinds {
            assert_eq!(a.join(a), a);
            for &b in &kinds {
                assert_eq!(a.join(b), b.join(a));
            }
        }
    }

    #[test]
    fn meet_demotes_disagreements_to_unknown() {
        assert_eq!(ScalarKind::Integer.meet(ScalarKind::Pointer), ScalarKind::Unknown);
        assert_eq!(ScalarKind::Anything.meet(ScalarKind::Integer), ScalarKind::Integer);
    }

    #[test]
    fn pointer_int_merge_prefers_pointer() {
        assert_eq!(ScalarKind::Pointer.pointer_int_merge(ScalarKind::Integer), ScalarKind::Pointer);
        assert_eq!(ScalarKind::Integer.pointer_int_merge(ScalarKind::Integer), ScalarKind::Integer);
    }
}
