//! Ambient diagnostics (SPEC_FULL.md §2.H, §6, §7): the "one diagnostic
//! flag" that controls verbose tracing of fact updates, and the
//! full-facts dump fatal errors are required to carry.
//!
//! The teacher crate has no logging framework either — every diagnostic
//! print in `middle_end/*` is a bare `println!`/`eprintln!`/`dbg!` gated by
//! nothing more than a commented-out call site (see e.g.
//! `middle_end/analysis.rs`'s `println!("{:#?}", Cfg { .. })`). This module
//! keeps that same idiom rather than reaching for a `log`/`tracing`
//! dependency the teacher never carries: `AnalysisOptions::trace` gates a
//! plain `eprintln!` instead of a structured log record.

use std::fmt;

use crate::ir::ValueId;
use crate::lattice::OffsetMap;

/// Session-wide analysis options. Currently just the one diagnostic flag
/// named in §6 ("one diagnostic flag controls verbose tracing of
/// updates"); kept as its own struct (rather than a bare `bool` parameter)
/// so a future flag has somewhere to land without changing every call site.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnalysisOptions {
    pub trace: bool,
}

impl AnalysisOptions {
    pub fn traced() -> Self {
        AnalysisOptions { trace: true }
    }

    /// Prints one worklist update if tracing is on; a no-op otherwise. Takes
    /// a closure so the (possibly expensive) `Display` formatting of large
    /// fact maps is skipped entirely when tracing is off.
    pub fn trace_update(&self, v: ValueId, facts: &OffsetMap) {
        if self.trace {
            eprintln!("update {v} -> {facts}");
        }
    }
}

/// Formats the "full facts dump" every fatal error in §7 is required to
/// carry: the offending value (or values) plus every fact recorded so far,
/// in deterministic order (the same `BTreeMap` iteration order used
/// throughout this crate for reproducibility, §5).
pub fn facts_dump(function_name: &str, facts: &std::collections::BTreeMap<ValueId, OffsetMap>) -> String {
    let mut out = format!("facts dump for `{function_name}`:\n");
    for (v, f) in facts {
        out += &format!("  {v} -> {f}\n");
    }
    out
}

/// A deduction failure (§7): a consumer demanded a concrete scalar
/// (`required = true`) but the value was still `Unknown`/`Anything` after
/// the fixed point. Implements `Display` so `panic!("{err}")` callers get a
/// readable message without re-deriving the format string at each call
/// site.
#[derive(Debug)]
pub struct DeductionFailure {
    pub value: ValueId,
    pub found: crate::lattice::ScalarKind,
}

impl fmt::Display for DeductionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deduction failure: {} required a concrete scalar but analysis found only {}",
            self.value, self.found
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::ValueId;
    use crate::lattice::ScalarKind;

    #[test]
    fn default_options_do_not_trace() {
        let opts = AnalysisOptions::default();
        assert!(!opts.trace);
        opts.trace_update(ValueId(0), &OffsetMap::scalar(ScalarKind::Integer));
    }

    #[test]
    fn facts_dump_lists_every_recorded_value() {
        let mut facts = std::collections::BTreeMap::new();
        facts.insert(ValueId(0), OffsetMap::scalar(ScalarKind::Integer));
        facts.insert(ValueId(1), OffsetMap::scalar(ScalarKind::Pointer));

        let dump = facts_dump("f", &facts);
        assert!(dump.contains("facts dump for `f`"));
        assert!(dump.contains(&ValueId(0).to_string()));
        assert!(dump.contains(&ValueId(1).to_string()));
    }

    #[test]
    fn deduction_failure_message_names_the_value_and_kind() {
        let err = DeductionFailure { value: ValueId(3), found: ScalarKind::Unknown };
        let msg = err.to_string();
        assert!(msg.contains("deduction failure"));
        assert!(msg.contains(&ValueId(3).to_string()));
    }
}
