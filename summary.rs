//! Function summaries (SPEC_FULL.md §4.4, module B): the incoming facts a
//! caller supplies about a callee's arguments, and the facts the callee's
//! analysis hands back about its return value.
//!
//! This is the unit the inter-procedural cache (`cache::TypeAnalysisSession`)
//! keys on. It has to be compared and hashed *structurally* rather than by
//! call-site identity — two call sites that happen to pass arguments with
//! the same known facts must share one analysis, exactly as the teacher
//! crate's `PointwiseEnv<A>` keys its per-variable facts by value rather
//! than by occurrence (`middle_end/analysis.rs`).

use std::collections::BTreeMap as Map;

use crate::ir::ValueId;
use crate::lattice::OffsetMap;

/// The facts a caller supplies about one argument: its `OffsetMap`, plus a
/// known constant integer value if the call site passes a literal (used by
/// `couldBeZero`-style reasoning in the analyzer, §4.3.4).
#[derive(Clone, Debug, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct ArgumentInfo {
    pub facts: OffsetMap,
    pub known_constant: Option<i64>,
}

impl ArgumentInfo {
    pub fn unknown() -> Self {
        ArgumentInfo::default()
    }

    pub fn with_facts(facts: OffsetMap) -> Self {
        ArgumentInfo { facts, known_constant: None }
    }

    /// Builds the facts side of an `ArgumentInfo` for a call-site argument
    /// that is a known integer literal, following the inter-procedural
    /// `query` constant rule (SPEC_FULL.md §4.4): a literal in `[1, 4096]`
    /// or the single byte `0` is assumed to be an `Integer` (a plausible
    /// size/count/flag), and anything else widens to `Anything` rather than
    /// being trusted as a number — unlike a literal used directly as an
    /// arithmetic operand within the same function (which the ordinary
    /// transfer rules classify as `Integer` unconditionally), a literal
    /// crossing a call boundary carries no such guarantee about how the
    /// callee will use it.
    pub fn from_constant(value: i64) -> Self {
        use crate::lattice::ScalarKind;
        let kind = if (1..=4096).contains(&value) || value == 0 { ScalarKind::Integer } else { ScalarKind::Anything };
        ArgumentInfo { facts: OffsetMap::scalar(kind), known_constant: Some(value) }
    }
}

/// The full incoming-facts vector for a call, keyed by argument position in
/// declaration order (not by `ValueId`, since the callee's own `ValueId`s
/// are meaningless at the call site). This is the analogue of the original
/// analyzer's `NewFnTypeInfo`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct FunctionSummary {
    pub function_name: String,
    pub arguments: Vec<ArgumentInfo>,
}

impl FunctionSummary {
    pub fn new(function_name: impl Into<String>, arguments: Vec<ArgumentInfo>) -> Self {
        FunctionSummary { function_name: function_name.into(), arguments }
    }

    pub fn argument(&self, index: usize) -> ArgumentInfo {
        self.arguments.get(index).cloned().unwrap_or_default()
    }
}

/// The result of fully analyzing a function under one `FunctionSummary`:
/// facts for every value in the function, plus the return value's facts
/// pulled out for convenient reuse at call sites.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ReturnSummary {
    pub return_facts: OffsetMap,
    pub per_value: Map<ValueId, OffsetMap>,
}

impl ReturnSummary {
    pub fn facts_of(&self, v: ValueId) -> OffsetMap {
        self.per_value.get(&v).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lattice::ScalarKind;

    #[test]
    fn summaries_with_equal_facts_compare_equal() {
        let a = FunctionSummary::new("f", vec![ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Integer))]);
        let b = FunctionSummary::new("f", vec![ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Integer))]);
        assert_eq!(a, b);
    }

    #[test]
    fn summaries_differ_when_argument_facts_differ() {
        let a = FunctionSummary::new("f", vec![ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Integer))]);
        let b = FunctionSummary::new("f", vec![ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Pointer))]);
        assert_ne!(a, b);
    }

    #[test]
    fn constant_in_plausible_range_is_integer() {
        let zero = ArgumentInfo::from_constant(0);
        let small = ArgumentInfo::from_constant(4096);
        assert_eq!(zero.facts.top(), ScalarKind::Integer);
        assert_eq!(small.facts.top(), ScalarKind::Integer);
        assert_eq!(small.known_constant, Some(4096));
    }

    #[test]
    fn constant_outside_plausible_range_widens_to_anything() {
        let negative = ArgumentInfo::from_constant(-1);
        let huge = ArgumentInfo::from_constant(4097);
        assert_eq!(negative.facts.top(), ScalarKind::Anything);
        assert_eq!(huge.facts.top(), ScalarKind::Anything);
    }
}
