//! `OffsetMap`: a finite map from offset sequences to `ScalarKind`
//! (SPEC_FULL.md §3.2 / §4.1).
//!
//! Offset sequences are bounded to `MAX_DEPTH` entries (§5: "depths beyond 3
//! are pruned") so that the mutually recursive GEP/bitcast/phi transfer
//! functions can't grow an unbounded key through repeated nesting; this is
//! the concrete form of §5's termination argument ("finiteness of
//! (instructions × offset entries produced by the transfer functions)").
//! Keys and iteration are kept in a `BTreeMap` rather than a hash map for
//! the same reason the teacher crate uses `BTreeMap`/`BTreeSet` aliased as
//! `Map`/`Set` everywhere in `middle_end/analysis.rs`: deterministic
//! iteration order is required for golden-test reproducibility (§5,
//! "Ordering").

use std::collections::BTreeMap;
use std::fmt;

use super::scalar_kind::ScalarKind;

pub const MAX_DEPTH: usize = 3;

pub type Offset = Vec<i64>;

#[derive(Clone, Debug, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct OffsetMap {
    entries: BTreeMap<Offset, ScalarKind>,
}

impl OffsetMap {
    pub fn new() -> Self {
        OffsetMap::default()
    }

    /// A map with a single fact about the value itself (`[] ↦ kind`).
    pub fn scalar(kind: ScalarKind) -> Self {
        let mut m = OffsetMap::new();
        if kind != ScalarKind::Unknown {
            m.entries.insert(vec![], kind);
        }
        m
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|k| *k == ScalarKind::Unknown)
    }

    pub fn get(&self, key: &[i64]) -> ScalarKind {
        self.entries.get(key).copied().unwrap_or(ScalarKind::Unknown)
    }

    /// The scalar of the value itself (`[] ↦ kind`).
    pub fn top(&self) -> ScalarKind {
        self.get(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Offset, &ScalarKind)> {
        self.entries.iter().filter(|(_, k)| **k != ScalarKind::Unknown)
    }

    fn set(&mut self, mut key: Offset, kind: ScalarKind) {
        if key.len() > MAX_DEPTH {
            key.truncate(MAX_DEPTH);
        }
        if kind == ScalarKind::Unknown {
            return;
        }
        self.entries.insert(key, kind);
    }

    /// Invariant 2 (§3.2): the empty-offset entry can't simultaneously claim
    /// both `Pointer` and `Integer` — that specific clash is the one kind of
    /// offset-map contradiction the spec calls fatal at the lattice level
    /// (everything else just widens to `Anything`, see `ScalarKind::join`).
    fn check_top_contradiction(&self, incoming: &OffsetMap) {
        let existing = self.top();
        let new = incoming.top();
        let clash = matches!(
            (existing, new),
            (ScalarKind::Pointer, ScalarKind::Integer) | (ScalarKind::Integer, ScalarKind::Pointer)
        );
        if clash {
            panic!(
                "OffsetMap contradiction: [] already {existing} but incoming fact says {new}\n  existing = {self}\n  incoming = {incoming}"
            );
        }
    }

    /// `∨=`. Pointwise join on shared keys; keys present in only one
    /// operand are inserted as-is. Returns whether `self` changed, which is
    /// exactly the bit the worklist driver uses to decide whether to
    /// re-enqueue dependents (§4.1, §4.3.2).
    pub fn join_with(&mut self, other: &OffsetMap) -> bool {
        self.check_top_contradiction(other);

        let mut changed = false;
        for (key, &kind) in other.entries.iter() {
            let existing = self.entries.get(key).copied().unwrap_or(ScalarKind::Unknown);
            let joined = existing.join(kind);
            if joined != existing {
                self.entries.insert(key.clone(), joined);
                changed = true;
            }
        }
        self.normalize();
        changed
    }

    pub fn joined(&self, other: &OffsetMap) -> OffsetMap {
        let mut out = self.clone();
        out.join_with(other);
        out
    }

    /// `∧`. Pointwise meet; keys present in only one operand are dropped
    /// (a constraint neither side states isn't a joint constraint).
    pub fn met(&self, other: &OffsetMap) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            if let Some(&other_kind) = other.entries.get(key) {
                out.set(key.clone(), kind.meet(other_kind));
            }
        }
        out.normalize();
        out
    }

    /// Collapses a specific offset `[i, tail...]` into `[-1, tail...]` when
    /// the specific entry adds no information beyond what the wildcard
    /// entry already states (invariant 1, §3.2).
    fn normalize(&mut self) {
        let wildcard_tails: Vec<Offset> = self
            .entries
            .keys()
            .filter(|k| k.first() == Some(&-1))
            .map(|k| k[1..].to_vec())
            .collect();

        if wildcard_tails.is_empty() {
            return;
        }

        let mut to_remove = Vec::new();
        for (key, &kind) in self.entries.iter() {
            if key.first().is_some_and(|&i| i >= 0) {
                let tail = &key[1..];
                if wildcard_tails.iter().any(|t| t == tail) {
                    let mut wildcard_key = vec![-1];
                    wildcard_key.extend_from_slice(tail);
                    let wildcard_kind = self.entries[&wildcard_key];
                    if kind.join(wildcard_kind) == wildcard_kind {
                        to_remove.push(key.clone());
                    }
                }
            }
        }
        for key in to_remove {
            self.entries.remove(&key);
        }
    }

    /// Returns the sub-map rooted at prefix `[i]`, shifted so `[i, a, b]`
    /// becomes `[a, b]`.
    pub fn lookup(&self, i: i64) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            if key.first() == Some(&i) {
                out.set(key[1..].to_vec(), kind);
            }
        }
        out
    }

    /// Wraps `self` under a one-level prefix `[i]`. Inverse of `lookup`.
    pub fn only(&self, i: i64) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            let mut new_key = vec![i];
            new_key.extend_from_slice(key);
            out.set(new_key, kind);
        }
        out
    }

    /// For a GEP with constant byte offset `off`: rewrites outer keys
    /// `[k, ...]` to `[k + off, ...]` for `k >= 0`; `[-1, ...]` entries are
    /// preserved unshifted.
    pub fn merge_indices(&self, off: i64) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            match key.first() {
                Some(&k) if k >= 0 => {
                    let mut new_key = key.clone();
                    new_key[0] = k + off;
                    out.set(new_key, kind);
                }
                _ => out.set(key.clone(), kind),
            }
        }
        out
    }

    /// The inverse projection used when propagating from a GEP result back
    /// to its base pointer: only keys within `[off, off + max_size)` (or
    /// all non-negative keys if `max_size` is `None`) survive, shifted by
    /// `-off`. `[-1, ...]` entries are handled separately by
    /// `keep_minus_one`, not by this projection.
    pub fn unmerge_indices(&self, off: i64, max_size: Option<i64>) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            match key.first() {
                Some(&k) if k >= off && max_size.is_none_or(|m| k < off + m) => {
                    let mut new_key = key.clone();
                    new_key[0] = k - off;
                    out.set(new_key, kind);
                }
                Some(&k) if k < 0 => {
                    let _ = k;
                }
                _ => {}
            }
        }
        out
    }

    /// The core bitcast/type-punning rule (§4.1): entries keyed by `[]`
    /// always survive; entries whose first index fits inside the new
    /// pointee survive unchanged; entries beyond the new pointee's size
    /// survive but are demoted (kept, not shifted, since they remain valid
    /// facts about bytes past the new type); wildcard entries survive as a
    /// wildcard only when the sizes divide evenly, otherwise collapse to a
    /// concrete offset 0.
    pub fn keep_for_cast(&self, from_bytes: u64, to_bytes: u64) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            if key.is_empty() {
                out.set(key.clone(), kind);
                continue;
            }

            if from_bytes == to_bytes {
                out.set(key.clone(), kind);
                continue;
            }

            let first = key[0];
            if first >= 0 && (first as u64) < to_bytes {
                out.set(key.clone(), kind);
                continue;
            }

            if first >= 0 {
                // beyond the new pointee: kept as-is, not invented.
                out.set(key.clone(), kind);
                continue;
            }

            // first == -1 (wildcard stride)
            if from_bytes < to_bytes && to_bytes % from_bytes == 0 {
                out.set(key.clone(), kind);
            } else {
                let mut zeroed = key.clone();
                zeroed[0] = 0;
                out.set(zeroed, kind);
            }
        }
        out
    }

    /// Removes entries whose scalar is `Anything`, so an insert's result
    /// doesn't contaminate the destination with top (§4.1).
    pub fn purge_anything(&self) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            if kind != ScalarKind::Anything {
                out.set(key.clone(), kind);
            }
        }
        out
    }

    /// Restricts to entries whose first offset is `< n`, bounding a memcpy
    /// of length `n`. The `[]` entry (a fact about the pointer itself, not
    /// an offset within it) is always kept; `[-1, ...]` wildcard entries
    /// are dropped since "any index up to an unknown stride" isn't bounded
    /// by a concrete byte count.
    pub fn at_most(&self, n: i64) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            match key.first() {
                None => out.set(key.clone(), kind),
                Some(&k) if k >= 0 && k < n => out.set(key.clone(), kind),
                _ => {}
            }
        }
        out
    }

    /// If every recorded scalar is `Integer`, returns a clone of `self`;
    /// otherwise returns the empty map. Used by `add`/`mul`: if the result
    /// is known to be an integer, the operands must be too, but any other
    /// fact about the result (pointer, float, anything) doesn't transfer.
    pub fn just_int(&self) -> OffsetMap {
        let all_int = self.entries.values().all(|&k| k == ScalarKind::Integer);
        if all_int && !self.entries.is_empty() {
            self.clone()
        } else {
            OffsetMap::new()
        }
    }

    /// Retains only `[-1, ...]` entries — the stride rule used when a GEP's
    /// concrete index is not known.
    pub fn keep_minus_one(&self) -> OffsetMap {
        let mut out = OffsetMap::new();
        for (key, &kind) in self.entries.iter() {
            if key.first() == Some(&-1) {
                out.set(key.clone(), kind);
            }
        }
        out
    }

    /// The "pointer-aware union" from §4.3.5, lifted pointwise over shared
    /// keys.
    pub fn pointer_int_merge(&self, other: &OffsetMap) -> OffsetMap {
        let mut out = self.clone();
        for (key, &kind) in other.entries.iter() {
            let existing = out.entries.get(key).copied().unwrap_or(ScalarKind::Unknown);
            out.set(key.clone(), existing.pointer_int_merge(kind));
        }
        for (key, &kind) in self.entries.iter() {
            if !other.entries.contains_key(key) {
                out.set(key.clone(), kind);
            }
        }
        out
    }
}

impl fmt::Display for OffsetMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (key, kind) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "[")?;
            for (i, o) in key.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{o}")?;
            }
            write!(f, "]={kind}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::Precision;

    #[test]
    fn join_idempotent_commutative_associative() {
        let a = OffsetMap::scalar(ScalarKind::Integer);
        let mut b = OffsetMap::new();
        b.set(vec![0], ScalarKind::Pointer);
        let mut c = OffsetMap::new();
        c.set(vec![0, 4], ScalarKind::Float(Precision::Double));

        assert_eq!(a.joined(&a), a);

        let ab = a.joined(&b);
        let ba = b.joined(&a);
        assert_eq!(ab, ba);

        let ab_c = ab.joined(&c);
        let a_bc = a.joined(&b.joined(&c));
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn cast_involution_is_identity() {
        let mut m = OffsetMap::new();
        m.set(vec![], ScalarKind::Pointer);
        m.set(vec![0], ScalarKind::Integer);
        m.set(vec![8], ScalarKind::Float(Precision::Double));
        assert_eq!(m.keep_for_cast(16, 16), m);
    }

    #[test]
    fn lookup_and_only_are_inverses() {
        let mut m = OffsetMap::new();
        m.set(vec![], ScalarKind::Pointer);
        m.set(vec![0], ScalarKind::Integer);
        m.set(vec![4], ScalarKind::Float(Precision::Single));

        let looked_up = m.lookup(0);
        assert_eq!(looked_up.top(), ScalarKind::Integer);

        let wrapped = looked_up.only(0);
        assert_eq!(wrapped.get(&[0]), ScalarKind::Integer);
    }

    #[test]
    fn gep_round_trip_modulo_keep_minus_one() {
        let mut base = OffsetMap::new();
        base.set(vec![8], ScalarKind::Float(Precision::Double));
        base.set(vec![16], ScalarKind::Integer);

        let off = 8;
        let unmerged = base.unmerge_indices(off, None);
        let merged = unmerged.merge_indices(off);
        assert_eq!(merged, base);
    }

    #[test]
    fn at_most_bounds_memcpy_length() {
        let mut m = OffsetMap::new();
        m.set(vec![0], ScalarKind::Float(Precision::Double));
        m.set(vec![8], ScalarKind::Float(Precision::Double));
        m.set(vec![20], ScalarKind::Integer);

        let bounded = m.at_most(16);
        assert_eq!(bounded.get(&[0]), ScalarKind::Float(Precision::Double));
        assert_eq!(bounded.get(&[8]), ScalarKind::Float(Precision::Double));
        assert_eq!(bounded.get(&[20]), ScalarKind::Unknown);
    }

    #[test]
    fn just_int_filters_non_integer_maps() {
        let ints = OffsetMap::scalar(ScalarKind::Integer);
        assert_eq!(ints.just_int(), ints);

        let ptrs = OffsetMap::scalar(ScalarKind::Pointer);
        assert_eq!(ptrs.just_int(), OffsetMap::new());
    }

    #[test]
    #[should_panic(expected = "contradiction")]
    fn join_fails_hard_on_pointer_integer_clash_at_top() {
        let mut a = OffsetMap::scalar(ScalarKind::Pointer);
        let b = OffsetMap::scalar(ScalarKind::Integer);
        a.join_with(&b);
    }
}
