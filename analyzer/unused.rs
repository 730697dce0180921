//! The "unused value" heuristics (SPEC_FULL.md §4.3.6, grounded in
//! `TypeAnalyzer::hasAnyUse`/`hasNonIntegralUse` in the original analyzer).
//!
//! A handful of instructions (`malloc`'s size argument, a GEP index that
//! only ever feeds another GEP) never get any positive fact from the
//! regular transfer rules simply because nothing downstream constrains
//! them. Left at `Unknown`, such a value would silently read as "not yet
//! analyzed" rather than "known to be an integer because nothing non-integer
//! ever happens to it". `run_unused_checks` makes that distinction explicit:
//! after the main fixed point settles, any value that still has no fact and
//! provably has no non-integral use is promoted to `Integer`.

use std::collections::BTreeMap as Map;

use crate::ir::{Callee, Function, Instruction, Operand, ValueId};
use crate::lattice::{OffsetMap, ScalarKind};

/// Extern functions known to leave their arguments untouched in a way that
/// never constrains their type (matches the hardcoded allowlist in
/// `hasNonIntegralUse`, e.g. `__cxa_guard_acquire`).
const KNOWN_INERT_CALLEES: &[&str] = &["__cxa_guard_acquire", "__cxa_guard_release"];

/// True if `v` has at least one use anywhere in `function` (as an
/// instruction operand, a terminator operand, or a jump argument feeding a
/// block parameter).
pub fn has_any_use(v: ValueId, function: &Function) -> bool {
    !function.users_of(v).is_empty() || used_in_terminator(v, function)
}

fn used_in_terminator(v: ValueId, function: &Function) -> bool {
    function.blocks.values().any(|b| b.term.operands().iter().any(|op| op.as_value() == Some(v)))
}

/// True if `v` is used only in positions that can never demand anything but
/// `Integer` of it: a GEP index, an allocation's element count, or an
/// argument to a recognized inert extern call. Recursing into a use whose
/// own result is itself only used this way lets the check see through
/// "integer laundering" chains the way the original `hasNonIntegralUse`
/// does by walking each use's users in turn.
pub fn has_only_integral_uses(v: ValueId, function: &Function, facts: &Map<ValueId, OffsetMap>) -> bool {
    if let Some(known) = facts.get(&v) {
        if known.top() == ScalarKind::Anything || known.top() == ScalarKind::Pointer {
            return false;
        }
    }

    let mut seen = std::collections::BTreeSet::new();
    all_uses_integral(v, function, &mut seen)
}

fn all_uses_integral(v: ValueId, function: &Function, seen: &mut std::collections::BTreeSet<ValueId>) -> bool {
    if !seen.insert(v) {
        return true;
    }

    for block in function.blocks.values() {
        for inst in &block.insts {
            if !inst.operands().iter().any(|op| op.as_value() == Some(v)) {
                continue;
            }
            if !instruction_use_is_integral(inst, v, function, seen) {
                return false;
            }
        }
    }
    true
}

fn instruction_use_is_integral(
    inst: &Instruction,
    v: ValueId,
    function: &Function,
    seen: &mut std::collections::BTreeSet<ValueId>,
) -> bool {
    match inst {
        Instruction::Gep { indices, .. } => indices.iter().any(|op| op.as_value() == Some(v)),
        Instruction::Alloca { n, .. } => n.as_value() == Some(v),
        Instruction::Call { callee: Callee::Function(name), args, .. } => {
            KNOWN_INERT_CALLEES.contains(&name.as_str())
                && args.iter().any(|op| op.as_value() == Some(v))
        }
        Instruction::Arith { lhs, .. } => all_uses_integral(*lhs, function, seen),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::i64_ty;

    #[test]
    fn gep_index_with_no_other_use_is_integral_only() {
        let mut b = FunctionBuilder::new("only_gep_index");
        let ptr_arg = b.add_arg(crate::ir::types::pointer_ty(i64_ty()));
        let idx_arg = b.add_arg(i64_ty());
        let entry = b.entry();
        b.push(entry, Some(i64_ty()), |lhs| Instruction::Gep {
            lhs,
            base: Operand::Value(ptr_arg),
            indices: vec![Operand::Value(idx_arg)],
            in_bounds: true,
        });
        b.set_return(entry, None);
        let f = b.finish();

        let facts = Map::new();
        assert!(has_only_integral_uses(idx_arg, &f, &facts));
    }
}
