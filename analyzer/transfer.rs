//! Per-instruction transfer rules (SPEC_FULL.md §4.3.3).
//!
//! Each rule is bidirectional: it both computes a forward fact for the
//! instruction's result from its operands, and pushes a backward fact onto
//! one or more operands from the result (and, for multi-operand
//! instructions, sometimes operand-to-operand). This mirrors
//! `TypeAnalyzer::visit*` in the original analyzer, which calls
//! `updateAnalysis` on whichever values are informative regardless of
//! forward/backward direction, rather than running two separate forward and
//! backward dataflow passes (contrast with the teacher crate's
//! `forward_analysis`/`backward_analysis`, which the teacher itself leaves
//! `backward_analysis` a `todo!()` stub for — this analyzer needs both
//! directions in lockstep, so they're fused into one transfer function per
//! opcode instead).
//!
//! A rule returns the list of `(target, facts)` updates to join into the
//! analyzer's state; it never mutates state directly, keeping the rule
//! itself trivially testable in isolation from the worklist driver.

use std::collections::BTreeMap as Map;

use crate::ir::{ArithOp, Callee, DataLayout, FloatOp, Function, Instruction, Operand, Ty, ValueId};
use crate::lattice::{OffsetMap, ScalarKind};

/// The static type of an operand, when one can be recovered: a value looks
/// itself up in the function's type table; a typed-null constant carries its
/// own type; every other constant kind (no pointer type attached) has none.
fn operand_ty(op: &Operand, function: &Function) -> Option<Ty> {
    match op {
        Operand::Value(v) => Some(function.type_of(*v)),
        Operand::Constant(crate::ir::Constant::Null { ty }) => Some(ty.clone()),
        _ => None,
    }
}

/// Resolves an operand to its current facts: block/instruction values look
/// themselves up in `facts`; constants are classified directly from their
/// literal kind (§4.4's rule for literal operands).
pub fn operand_facts(op: &Operand, facts: &Map<ValueId, OffsetMap>) -> OffsetMap {
    match op {
        Operand::Value(v) => facts.get(v).cloned().unwrap_or_default(),
        Operand::Constant(crate::ir::Constant::Int { .. }) => OffsetMap::scalar(ScalarKind::Integer),
        Operand::Constant(crate::ir::Constant::Float { precision, .. }) => {
            OffsetMap::scalar(ScalarKind::Float(*precision))
        }
        Operand::Constant(crate::ir::Constant::Null { .. }) => OffsetMap::scalar(ScalarKind::Pointer),
        Operand::Constant(crate::ir::Constant::FunctionHandle { .. }) => OffsetMap::new(),
    }
}

/// What a `transfer` call asks the driver to do with a call instruction it
/// can't resolve locally.
pub enum CallAction {
    /// Fully handled locally (malloc, memcpy, memmove, cpuid, or an
    /// unresolvable external function).
    None,
    /// Needs the inter-procedural cache; re-enqueue via `pending_calls`.
    Defer,
}

pub struct TransferResult {
    pub updates: Vec<(ValueId, OffsetMap)>,
    pub call_action: CallAction,
}

impl TransferResult {
    fn just(updates: Vec<(ValueId, OffsetMap)>) -> Self {
        TransferResult { updates, call_action: CallAction::None }
    }
}

pub fn transfer(
    inst: &Instruction,
    function: &Function,
    layout: &DataLayout,
    facts: &Map<ValueId, OffsetMap>,
) -> TransferResult {
    use Instruction::*;

    match inst {
        Alloca { lhs, .. } => TransferResult::just(vec![(*lhs, OffsetMap::scalar(ScalarKind::Pointer))]),

        Load { lhs, ptr } => {
            let ptr_facts = operand_facts(ptr, facts);
            let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();

            let mut updates = vec![(*lhs, ptr_facts.lookup(0))];

            // Backward: whatever we know the loaded value to be is also a
            // fact about `*ptr` at offset 0; `ptr` itself must be a pointer.
            let mut ptr_update = lhs_facts.only(0);
            ptr_update.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
            if let Some(ptr_value) = ptr.as_value() {
                updates.push((ptr_value, ptr_update));
            }
            TransferResult::just(updates)
        }

        Store { ptr, value } => {
            let value_facts = operand_facts(value, facts);
            let mut ptr_update = value_facts.purge_anything().only(0);
            ptr_update.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
            let mut updates = Vec::new();
            if let Some(ptr_value) = ptr.as_value() {
                updates.push((ptr_value, ptr_update));
            }
            // Forward: the existing contents of `*ptr` (if known) also
            // constrain `value`, the same way a load's result would.
            let ptr_facts = operand_facts(ptr, facts);
            if let Some(value_value) = value.as_value() {
                updates.push((value_value, ptr_facts.lookup(0)));
            }
            TransferResult::just(updates)
        }

        Gep { lhs, base, indices, in_bounds } => {
            let base_facts = operand_facts(base, facts);
            let const_offset = constant_gep_offset(indices, layout);

            let mut updates = Vec::new();
            if let Some(off) = const_offset {
                // §4.3.3: `maxSize` is the pointee size when the leading
                // index is the literal 0 (the GEP stays within the base
                // object), otherwise unbounded (a different array element
                // entirely may be addressed).
                let max_size = match indices.first() {
                    Some(Operand::Constant(crate::ir::Constant::Int { value: 0, .. })) => {
                        operand_ty(base, function).and_then(|t| crate::ir::types::pointee(&t)).map(|p| layout.size_of_bytes(&p) as i64)
                    }
                    _ => None,
                };
                // Forward: project the base's offset map through the
                // constant displacement. The base's wildcard-stride entries
                // survive unconditionally (§4.3.3: "the result also
                // inherits `facts[base].KeepMinusOne()`").
                let mut lhs_update = base_facts.unmerge_indices(off, max_size);
                lhs_update.join_with(&base_facts.keep_minus_one());
                updates.push((*lhs, lhs_update));
                // Backward: the GEP's own facts (shifted back) and the
                // base's wildcard-stride entries both flow back to base.
                let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();
                let mut base_update = lhs_facts.merge_indices(off);
                base_update.join_with(&base_facts.keep_minus_one());
                base_update.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                if let Some(base_value) = base.as_value() {
                    updates.push((base_value, base_update));
                }
            } else {
                // Non-constant index: only the wildcard-stride entries
                // survive the projection (§4.1's `KeepMinusOne` use).
                updates.push((*lhs, base_facts.keep_minus_one()));
                let mut base_update = OffsetMap::scalar(ScalarKind::Pointer);
                if let Some(lhs_facts) = facts.get(lhs) {
                    base_update.join_with(&lhs_facts.only(-1));
                }
                if let Some(base_value) = base.as_value() {
                    updates.push((base_value, base_update));
                }
            }

            if *in_bounds {
                for idx in indices {
                    if let Some(idx_value) = idx.as_value() {
                        updates.push((idx_value, OffsetMap::scalar(ScalarKind::Integer)));
                    }
                }
            }
            TransferResult::just(updates)
        }

        Trunc { lhs, operand } | ZExt { lhs, operand } | SExt { lhs, operand } => {
            let mut updates = vec![(*lhs, operand_facts(operand, facts).just_int())];
            if let Some(v) = operand.as_value() {
                let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();
                updates.push((v, lhs_facts.just_int()));
            }
            TransferResult::just(updates)
        }

        PtrToInt { lhs, operand } => {
            let mut updates = vec![(*lhs, OffsetMap::scalar(ScalarKind::Integer))];
            if let Some(v) = operand.as_value() {
                updates.push((v, OffsetMap::scalar(ScalarKind::Pointer)));
            }
            TransferResult::just(updates)
        }

        IntToPtr { lhs, operand } => {
            let mut updates = vec![(*lhs, OffsetMap::scalar(ScalarKind::Pointer))];
            if let Some(v) = operand.as_value() {
                updates.push((v, OffsetMap::scalar(ScalarKind::Integer)));
            }
            TransferResult::just(updates)
        }

        FpToUi { lhs, operand } | FpToSi { lhs, operand } => {
            let mut updates = vec![(*lhs, OffsetMap::scalar(ScalarKind::Integer))];
            if let Some(v) = operand.as_value() {
                let precision = match function.type_of(v).get() {
                    crate::ir::types::ActualTy::Float(p) => *p,
                    _ => crate::ir::types::Precision::Double,
                };
                updates.push((v, OffsetMap::scalar(ScalarKind::Float(precision))));
            }
            TransferResult::just(updates)
        }

        UiToFp { lhs, operand } | SiToFp { lhs, operand } => {
            let precision = crate::ir::types::Precision::Double;
            let _ = operand;
            TransferResult::just(vec![(*lhs, OffsetMap::scalar(ScalarKind::Float(precision)))])
        }

        AddrSpaceCast { lhs, operand } => {
            let op_facts = operand_facts(operand, facts);
            let mut updates = vec![(*lhs, op_facts.clone())];
            if let Some(v) = operand.as_value() {
                let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();
                updates.push((v, lhs_facts));
            }
            TransferResult::just(updates)
        }

        BitCast { lhs, operand } => {
            // §4.1's `KeepForCast` is keyed on the *pointee* sizes for a
            // pointer-to-pointer bitcast (the whole point of the rule is
            // reasoning about what punning a `T*` as a `U*` preserves at
            // offsets inside the pointee); every pointer is itself a fixed
            // 64-bit value, so sizing off the pointer types directly would
            // make every pointer bitcast degenerate to the identity branch.
            // A scalar (int/fp) bitcast has no pointee to unwrap and is
            // sized off the value's own type, same as before.
            let lhs_ty = function.type_of(*lhs);
            let op_ty = operand_ty(operand, function);
            let size_for_cast = |ty: &Ty| -> u64 {
                match crate::ir::types::pointee(ty) {
                    Some(pointee) => layout.size_of_bytes(&pointee),
                    None => layout.size_of_bytes(ty),
                }
            };
            let from_bytes = op_ty.as_ref().map(size_for_cast).unwrap_or_else(|| size_for_cast(&lhs_ty));
            let to_bytes = size_for_cast(&lhs_ty);

            let op_facts = operand_facts(operand, facts);
            let mut updates = vec![(*lhs, op_facts.keep_for_cast(from_bytes, to_bytes))];
            if let Some(v) = operand.as_value() {
                let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();
                updates.push((v, lhs_facts.keep_for_cast(to_bytes, from_bytes)));
            }
            TransferResult::just(updates)
        }

        Select { lhs, t, f, .. } => {
            let t_facts = operand_facts(t, facts);
            let f_facts = operand_facts(f, facts);
            let mut updates = vec![(*lhs, t_facts.met(&f_facts))];
            let lhs_facts = facts.get(lhs).cloned().unwrap_or_default();
            if let Some(tv) = t.as_value() {
                updates.push((tv, lhs_facts.clone()));
            }
            if let Some(fv) = f.as_value() {
                updates.push((fv, lhs_facts));
            }
            TransferResult::just(updates)
        }

        ExtractElement { lhs, vector, .. } => {
            TransferResult::just(vec![(*lhs, operand_facts(vector, facts))])
        }

        InsertElement { lhs, vector, inserted, .. } => {
            let mut result = operand_facts(vector, facts);
            result.join_with(&operand_facts(inserted, facts));
            TransferResult::just(vec![(*lhs, result)])
        }

        ShuffleVector { lhs, a, b, .. } => {
            let mut result = operand_facts(a, facts);
            result.join_with(&operand_facts(b, facts));
            TransferResult::just(vec![(*lhs, result)])
        }

        Arith { lhs, op, lhs_op, rhs_op } => arith_transfer(*lhs, *op, lhs_op, rhs_op, facts),

        // A comparison's operands can be integers or pointers; the result
        // itself is always `Integer` (`i1`), and carries no information
        // back about what's being compared.
        Icmp { lhs, .. } => TransferResult::just(vec![(*lhs, OffsetMap::scalar(ScalarKind::Integer))]),

        FloatArith { lhs, precision, lhs_op, rhs_op, .. } => {
            let result = OffsetMap::scalar(ScalarKind::Float(*precision));
            let mut updates = vec![(*lhs, result.clone())];
            if let Some(v) = lhs_op.as_value() {
                updates.push((v, result.clone()));
            }
            if let Some(v) = rhs_op.as_value() {
                updates.push((v, result));
            }
            TransferResult::just(updates)
        }

        Call { lhs, callee, args } => call_transfer(*lhs, callee, args, facts),

        // Aggregate flow through `extractvalue`/`insertvalue` is opaque
        // except for the `cpuid` special case: its result is only known
        // when the aggregate is itself a `cpuid` call, in which case every
        // extracted register is `Integer` (matching `call_transfer`'s own
        // "result and all operands are `Integer`" rule for the call).
        ExtractValue { lhs, aggregate, .. } => {
            let updates = if aggregate_is_cpuid_call(aggregate, function) {
                vec![(*lhs, OffsetMap::scalar(ScalarKind::Integer))]
            } else {
                vec![]
            };
            TransferResult::just(updates)
        }

        InsertValue { .. } => TransferResult::just(vec![]),
    }
}

/// Whether `operand` is the result of a `call cpuid` instruction somewhere
/// in `function` — the one case `extractvalue` isn't opaque in.
fn aggregate_is_cpuid_call(operand: &Operand, function: &Function) -> bool {
    let Some(v) = operand.as_value() else { return false };
    function.blocks.values().flat_map(|b| b.insts.iter()).any(|inst| {
        matches!(inst, Instruction::Call { lhs: Some(lhs), callee: Callee::CpuId, .. } if *lhs == v)
    })
}

fn arith_transfer(
    lhs: ValueId,
    op: ArithOp,
    lhs_op: &Operand,
    rhs_op: &Operand,
    facts: &Map<ValueId, OffsetMap>,
) -> TransferResult {
    // `sub` deliberately gets no direct scalar propagation in either
    // direction (§4.3.3, §9's open question): `ptr - ptr -> int` and
    // `ptr - int -> ptr` both occur, so neither a forward joint-merge nor a
    // backward Integer-implies-operands rule can be applied without
    // guessing which shape this particular `sub` is. Tightening this
    // without a broader rule set is explicitly out of scope.
    if op == ArithOp::Sub {
        return TransferResult::just(vec![]);
    }

    let l = operand_facts(lhs_op, facts);
    let r = operand_facts(rhs_op, facts);

    let result = match op {
        // §4.3.5: `add`, `mul`, and the other bit-level binary operators
        // all combine operand facts through the pointer-aware union.
        // `add`/`mul` are the pair the spec's table also singles out for
        // unconditional backward propagation below; in practice only `add`
        // ever sees a `Pointer` operand (`ptr + int`), but `mul` takes the
        // same forward rule for fidelity with §4.3.5's grouping.
        ArithOp::Add | ArithOp::Mul => l.pointer_int_merge(&r),
        // Every other integer op can't produce a pointer; anything the
        // result is known to be an integer demands the operands were too.
        _ => {
            let joined = l.joined(&r);
            joined.just_int().joined(&OffsetMap::scalar(ScalarKind::Integer))
        }
    };

    let lhs_facts = facts.get(&lhs).cloned().unwrap_or_default();
    let mut updates = vec![(lhs, result)];

    // Backward: if the result must be an integer, both operands must be
    // too (mirrors the `analysis.JustInt()` propagation in the original
    // `visitBinaryOperator` for `Add`/`Mul`/bitwise ops).
    let back = match op {
        ArithOp::Add | ArithOp::Mul => lhs_facts,
        _ => lhs_facts.just_int(),
    };
    if let Some(v) = lhs_op.as_value() {
        updates.push((v, back.clone()));
    }
    if let Some(v) = rhs_op.as_value() {
        updates.push((v, back));
    }

    // `and` with a small literal mask (0..16): whichever operand isn't the
    // constant mask must be an integer (§4.3.3's `and`/small-mask rule).
    if op == ArithOp::And {
        if let Some(v) = small_mask_partner(lhs_op, rhs_op) {
            updates.push((v, OffsetMap::scalar(ScalarKind::Integer)));
        }
    }

    TransferResult::just(updates)
}

/// If exactly one side of an `and` is a small literal mask (`0..16`),
/// returns the other side's value id (if it is a value, not itself a
/// constant).
fn small_mask_partner(lhs_op: &Operand, rhs_op: &Operand) -> Option<ValueId> {
    let is_small_mask = |op: &Operand| matches!(op, Operand::Constant(crate::ir::Constant::Int { value, .. }) if (0..16).contains(value));
    match (is_small_mask(lhs_op), is_small_mask(rhs_op)) {
        (true, false) => rhs_op.as_value(),
        (false, true) => lhs_op.as_value(),
        _ => None,
    }
}

fn call_transfer(lhs: Option<ValueId>, callee: &Callee, args: &[Operand], facts: &Map<ValueId, OffsetMap>) -> TransferResult {
    match callee {
        Callee::Malloc => {
            // §4.3.3's one rule for `malloc(n)`: the size argument is
            // `Integer`. The call's own result isn't pinned here — its
            // pointer-ness is left to whatever consumes the result (a
            // store, a GEP, TBAA), the same way the original only ever
            // calls `updateAnalysis` on `getArgOperand(0)` for `malloc`.
            let updates = args.first().and_then(Operand::as_value).map(|n| vec![(n, OffsetMap::scalar(ScalarKind::Integer))]).unwrap_or_default();
            TransferResult::just(updates)
        }
        Callee::CpuId => {
            // `call cpuid` (asm): result and all operands are `Integer`
            // (§4.3.3's cpuid special case).
            let mut updates: Vec<(ValueId, OffsetMap)> =
                lhs.map(|v| vec![(v, OffsetMap::scalar(ScalarKind::Integer))]).unwrap_or_default();
            updates.extend(args.iter().filter_map(Operand::as_value).map(|v| (v, OffsetMap::scalar(ScalarKind::Integer))));
            TransferResult::just(updates)
        }
        Callee::Memcpy | Callee::Memmove => {
            // `memcpy(dst, src, n)`: whatever is known about `*src` up to
            // `n` bytes also becomes known about `*dst`, and vice versa
            // (§4.3.3's `AtMost(sz)` rule). `n` isn't tracked symbolically
            // here, so the bound is conservative (unbounded) unless a
            // constant literal is present.
            if args.len() < 2 {
                return TransferResult::just(vec![]);
            }
            // `facts[dst]`/`facts[src]` already carry pointee facts directly
            // at their top-level offset keys (the same convention the TBAA
            // seeding in `consider_tbaa` builds for memcpy/memmove), so no
            // `lookup`/`only` unwrap-rewrap is needed here — doing so would
            // keep only the offset-0 entry and silently drop every other
            // offset.
            let dst_facts = operand_facts(&args[0], facts);
            let src_facts = operand_facts(&args[1], facts);
            let bound = match args.get(2) {
                Some(Operand::Constant(crate::ir::Constant::Int { value, .. })) => Some(*value),
                _ => None,
            };
            let (dst_facts, src_facts) = match bound {
                Some(n) => (dst_facts.at_most(n), src_facts.at_most(n)),
                None => (dst_facts, src_facts),
            };
            let mut updates = Vec::new();
            if let Some(dst) = args[0].as_value() {
                let mut u = src_facts.clone();
                u.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                updates.push((dst, u));
            }
            if let Some(src) = args[1].as_value() {
                let mut u = dst_facts.clone();
                u.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                updates.push((src, u));
            }
            // Every argument past the two pointers (length, alignment, the
            // `volatile` flag) is `Integer` (§4.3.3's "the length and
            // alignment arguments are Integer", matching the original's
            // `for (i = 2; i < numArgOperands; i++) updateAnalysis(..,
            // Integer)`).
            updates.extend(args.iter().skip(2).filter_map(Operand::as_value).map(|v| (v, OffsetMap::scalar(ScalarKind::Integer))));
            TransferResult::just(updates)
        }
        Callee::Function(_) => TransferResult { updates: vec![], call_action: CallAction::Defer },
    }
}

/// Accumulates the constant byte offset of a GEP's index list, or `None` if
/// any index past the first isn't a compile-time constant (§4.1,
/// `accumulateConstantOffset`). The pruning to `None` on the first
/// non-constant index (rather than partial folding) matches the original's
/// all-or-nothing `accumulateConstantOffset` call.
fn constant_gep_offset(indices: &[Operand], layout: &DataLayout) -> Option<i64> {
    let mut total = 0i64;
    for idx in indices {
        match idx {
            Operand::Constant(crate::ir::Constant::Int { value, ty }) => {
                let elem_bytes = layout.size_of_bytes(ty).max(1) as i64;
                total += value * elem_bytes;
            }
            _ => return None,
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Map;
    use crate::analyzer::{NoCalls, TypeAnalyzer};
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::{float_ty, i32_ty, i64_ty, pointer_ty, struct_ty, Precision};
    use crate::ir::{Callee, Constant, DataLayout, Instruction, Operand};
    use crate::lattice::{OffsetMap, ScalarKind};
    use crate::summary::{ArgumentInfo, FunctionSummary};

    #[test]
    fn sub_transfer_produces_no_updates_in_either_direction() {
        // `ptr - ptr` and `ptr - int` both lower to the same `sub`
        // instruction, so neither operand nor the result may be pinned
        // down from the instruction alone (§4.3.3, §9's open question).
        // Exercised against `arith_transfer` directly (rather than through
        // a full analyzer run) so the unused-value promotion pass — which
        // would otherwise independently classify both untyped operands as
        // `Integer` once the rest of a toy function gives them no other
        // use — can't mask a regression in the transfer rule itself.
        let mut b = FunctionBuilder::new("sub_is_opaque");
        let p = b.add_arg(i64_ty());
        let q = b.add_arg(i64_ty());
        let entry = b.entry();
        let d = b
            .push(entry, Some(i64_ty()), |lhs| Instruction::Arith {
                lhs,
                op: crate::ir::ArithOp::Sub,
                lhs_op: Operand::Value(p),
                rhs_op: Operand::Value(q),
            })
            .unwrap();
        b.set_return(entry, Some(Operand::Value(d)));
        let f = b.finish();

        let inst = Instruction::Arith { lhs: d, op: crate::ir::ArithOp::Sub, lhs_op: Operand::Value(p), rhs_op: Operand::Value(q) };
        let facts = Map::new();
        let result = super::transfer(&inst, &f, &DataLayout::default(), &facts);
        assert!(result.updates.is_empty());
    }

    #[test]
    fn and_with_small_mask_forces_the_other_operand_to_integer() {
        // fn(x) { %m = and x, 15; ret %m }
        let mut b = FunctionBuilder::new("and_mask");
        let x = b.add_arg(i64_ty());
        let entry = b.entry();
        let mask = Operand::Constant(Constant::Int { value: 15, ty: i64_ty() });
        let m = b
            .push(entry, Some(i64_ty()), |lhs| Instruction::Arith { lhs, op: crate::ir::ArithOp::And, lhs_op: Operand::Value(x), rhs_op: mask })
            .unwrap();
        b.set_return(entry, Some(Operand::Value(m)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("and_mask", vec![ArgumentInfo::unknown()]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(x).top(), ScalarKind::Integer);
    }

    #[test]
    fn cpuid_call_forces_result_and_every_operand_to_integer() {
        // fn(a) { %r = call cpuid(a); ret %r }
        let mut b = FunctionBuilder::new("cpuid_fn");
        let a = b.add_arg(i64_ty());
        let entry = b.entry();
        let r = b
            .push(entry, Some(i64_ty()), |lhs| Instruction::Call { lhs: Some(lhs), callee: Callee::CpuId, args: vec![Operand::Value(a)] })
            .unwrap();
        b.set_return(entry, Some(Operand::Value(r)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("cpuid_fn", vec![ArgumentInfo::unknown()]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(r).top(), ScalarKind::Integer);
        assert_eq!(result.facts_of(a).top(), ScalarKind::Integer);
    }

    #[test]
    fn extractvalue_of_a_cpuid_result_is_integer_but_otherwise_opaque() {
        // fn() {
        //   %regs = call cpuid();
        //   %eax = extractvalue %regs, 0;
        //   %other = alloca [struct]; %dummy = extractvalue %other, 0;
        //   ret %eax
        // }
        let mut b = FunctionBuilder::new("extract_cpuid");
        let entry = b.entry();
        let agg_ty = struct_ty(vec![i64_ty(), i64_ty()]);
        let regs = b
            .push(entry, Some(agg_ty.clone()), |lhs| Instruction::Call { lhs: Some(lhs), callee: Callee::CpuId, args: vec![] })
            .unwrap();
        let eax = b.push(entry, Some(i64_ty()), |lhs| Instruction::ExtractValue { lhs, aggregate: Operand::Value(regs), index: 0 }).unwrap();

        let other = b
            .push(entry, Some(agg_ty), |lhs| Instruction::Call { lhs: Some(lhs), callee: Callee::Function("opaque".into()), args: vec![] })
            .unwrap();
        let dummy = b.push(entry, Some(i64_ty()), |lhs| Instruction::ExtractValue { lhs, aggregate: Operand::Value(other), index: 0 }).unwrap();

        b.set_return(entry, Some(Operand::Value(eax)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("extract_cpuid", vec![]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(eax).top(), ScalarKind::Integer);
        assert_eq!(result.facts_of(dummy).top(), ScalarKind::Unknown);
    }

    #[test]
    fn bitcast_sizes_keep_for_cast_off_the_pointees_not_the_pointers() {
        // `double* -> i32*`: both sides are 8-byte pointers, but the
        // pointees are 8 and 4 bytes. A wildcard-stride fact on the source
        // must collapse to a concrete offset-0 entry (§4.1's `KeepForCast`),
        // which only happens if the cast is sized off the pointees —
        // sizing off the pointers themselves makes every pointer bitcast
        // look like a same-size (8-to-8) identity cast.
        let mut b = FunctionBuilder::new("bitcast_punning");
        let ptr = b.add_arg(pointer_ty(float_ty(Precision::Double)));
        let entry = b.entry();
        let lhs = b
            .push(entry, Some(pointer_ty(i32_ty())), |lhs| Instruction::BitCast { lhs, operand: Operand::Value(ptr) })
            .unwrap();
        b.set_return(entry, Some(Operand::Value(lhs)));
        let f = b.finish();

        let inst = Instruction::BitCast { lhs, operand: Operand::Value(ptr) };
        let mut facts = Map::new();
        facts.insert(ptr, OffsetMap::scalar(ScalarKind::Integer).only(-1));
        let result = super::transfer(&inst, &f, &DataLayout::default(), &facts);

        let lhs_update = &result.updates.iter().find(|(v, _)| *v == lhs).unwrap().1;
        assert_eq!(lhs_update.get(&[0]), ScalarKind::Integer);
        assert_eq!(lhs_update.get(&[-1]), ScalarKind::Unknown);
    }

    #[test]
    fn memcpy_propagates_facts_at_every_offset_both_ways_and_marks_trailing_args_integer() {
        // `memcpy(dst, src, 16, 8)`: `*src` carries facts at both offset 0
        // and offset 8, both of which must show up on `*dst` (and
        // vice versa) — not just the offset-0 entry. The trailing length
        // and alignment arguments are `Integer` (§4.3.3).
        let mut b = FunctionBuilder::new("memcpy_fn");
        let dst = b.add_arg(pointer_ty(i32_ty()));
        let src = b.add_arg(pointer_ty(i32_ty()));
        let len = b.add_arg(i64_ty());
        let align = b.add_arg(i64_ty());
        let entry = b.entry();
        b.set_return(entry, None);
        let f = b.finish();

        let mut src_facts = OffsetMap::scalar(ScalarKind::Float(Precision::Double)).only(0);
        src_facts.join_with(&OffsetMap::scalar(ScalarKind::Integer).only(8));
        src_facts.join_with(&OffsetMap::scalar(ScalarKind::Pointer));

        let mut dst_facts = OffsetMap::scalar(ScalarKind::Integer).only(8);
        dst_facts.join_with(&OffsetMap::scalar(ScalarKind::Pointer));

        let mut facts = Map::new();
        facts.insert(src, src_facts);
        facts.insert(dst, dst_facts);

        let inst = Instruction::Call {
            lhs: None,
            callee: Callee::Memcpy,
            args: vec![Operand::Value(dst), Operand::Value(src), Operand::Value(len), Operand::Value(align)],
        };
        let result = super::transfer(&inst, &f, &DataLayout::default(), &facts);

        let dst_update = &result.updates.iter().find(|(v, _)| *v == dst).unwrap().1;
        assert_eq!(dst_update.get(&[0]), ScalarKind::Float(Precision::Double));
        assert_eq!(dst_update.get(&[8]), ScalarKind::Integer);

        let src_update = &result.updates.iter().find(|(v, _)| *v == src).unwrap().1;
        assert_eq!(src_update.get(&[8]), ScalarKind::Integer);

        assert_eq!(result.updates.iter().find(|(v, _)| *v == len).unwrap().1.top(), ScalarKind::Integer);
        assert_eq!(result.updates.iter().find(|(v, _)| *v == align).unwrap().1.top(), ScalarKind::Integer);
    }

    #[test]
    fn gep_with_constant_offset_bounds_by_pointee_size_and_keeps_wildcard_entries() {
        // `gep base, 0, 1` on a `{i64,i64,i64}*` base: the leading index is
        // the literal 0, so `maxSize` is the pointee's own size (24 bytes,
        // §4.3.3). A fact recorded 40 bytes into `*base` (outside the
        // object) must NOT reappear on the GEP result, while one at offset
        // 16 (inside, at off=8) shifts down to offset 8. The base's
        // wildcard-stride entries survive unconditionally either way.
        let mut b = FunctionBuilder::new("gep_field");
        let field_ty = i64_ty();
        let struct_ty_val = struct_ty(vec![field_ty.clone(), field_ty.clone(), field_ty.clone()]);
        let base = b.add_arg(pointer_ty(struct_ty_val.clone()));
        let entry = b.entry();
        let indices = vec![
            Operand::Constant(Constant::Int { value: 0, ty: i64_ty() }),
            Operand::Constant(Constant::Int { value: 1, ty: i64_ty() }),
        ];
        let lhs = b
            .push(entry, Some(pointer_ty(field_ty)), |lhs| Instruction::Gep {
                lhs,
                base: Operand::Value(base),
                indices: indices.clone(),
                in_bounds: false,
            })
            .unwrap();
        b.set_return(entry, Some(Operand::Value(lhs)));
        let f = b.finish();

        let mut base_facts = OffsetMap::scalar(ScalarKind::Integer).only(16);
        base_facts.join_with(&OffsetMap::scalar(ScalarKind::Float(Precision::Double)).only(40));
        base_facts.join_with(&OffsetMap::scalar(ScalarKind::Integer).only(-1));

        let mut facts = Map::new();
        facts.insert(base, base_facts);

        let inst = Instruction::Gep { lhs, base: Operand::Value(base), indices, in_bounds: false };
        let result = super::transfer(&inst, &f, &DataLayout::default(), &facts);

        let lhs_update = &result.updates.iter().find(|(v, _)| *v == lhs).unwrap().1;
        // offset 16 is within [8, 8+24): shifted down by the constant
        // displacement (8) to offset 8.
        assert_eq!(lhs_update.get(&[8]), ScalarKind::Integer);
        // offset 40 is past the pointee's 24-byte size: dropped, not
        // shifted to 32 the way an unbounded maxSize would have kept it.
        assert_eq!(lhs_update.get(&[32]), ScalarKind::Unknown);
        // the wildcard entry on base joins in unconditionally, even though
        // this GEP took the constant-offset branch.
        assert_eq!(lhs_update.get(&[-1]), ScalarKind::Integer);
    }
}
