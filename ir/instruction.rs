//! Instruction and terminator vocabulary.
//!
//! This is the fixed set of opcodes the transfer-function table in
//! SPEC_FULL.md §4.3.3 is written against. An `instruction visitor
//! framework dispatching by opcode` is one of the external interfaces the
//! original spec names (§6); `analyzer::transfer::visit_instruction`
//! plays that role by matching on this enum instead of a virtual-dispatch
//! visitor, which is the idiomatic Rust equivalent.

use super::types::{Precision, Ty};
use super::value::{Operand, ValueId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpOp {
    Eq,
    Ne,
    Slt,
    Sgt,
}

/// A known extern/intrinsic callee, recognized by name the way the original
/// analyzer special-cases `malloc`, `llvm.memcpy`/`llvm.memmove`, and the
/// `cpuid` inline-asm string (§4.3.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callee {
    Function(String),
    Memcpy,
    Memmove,
    Malloc,
    CpuId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `alloca n` — allocates stack space for `n` elements of `elem_ty`.
    Alloca { lhs: ValueId, elem_ty: Ty, n: Operand },
    Load { lhs: ValueId, ptr: Operand },
    Store { ptr: Operand, value: Operand },
    /// `getelementptr base, idx...`. `in_bounds` gates the "each idx is
    /// Integer" rule (§4.3.3).
    Gep {
        lhs: ValueId,
        base: Operand,
        indices: Vec<Operand>,
        in_bounds: bool,
    },
    Trunc { lhs: ValueId, operand: Operand },
    ZExt { lhs: ValueId, operand: Operand },
    SExt { lhs: ValueId, operand: Operand },
    AddrSpaceCast { lhs: ValueId, operand: Operand },
    FpToUi { lhs: ValueId, operand: Operand },
    FpToSi { lhs: ValueId, operand: Operand },
    UiToFp { lhs: ValueId, operand: Operand },
    SiToFp { lhs: ValueId, operand: Operand },
    PtrToInt { lhs: ValueId, operand: Operand },
    IntToPtr { lhs: ValueId, operand: Operand },
    /// Scalar/int/fp bitcast or pointer-to-pointer bitcast; which rule
    /// applies depends on the static types of `lhs`/`operand` (§4.3.3).
    BitCast { lhs: ValueId, operand: Operand },
    Select { lhs: ValueId, cond: Operand, t: Operand, f: Operand },
    ExtractElement { lhs: ValueId, vector: Operand, index: Operand },
    InsertElement { lhs: ValueId, vector: Operand, inserted: Operand, index: Operand },
    ShuffleVector { lhs: ValueId, a: Operand, b: Operand },
    Arith { lhs: ValueId, op: ArithOp, lhs_op: Operand, rhs_op: Operand },
    /// Integer comparison, producing `i1` (§0: a minimal addition to the
    /// original spec's scalar-only host-IR sketch, since a reverse-mode
    /// rewriter's predecessor dispatch needs a genuine boolean-producing
    /// instruction and no existing opcode fits).
    Icmp { lhs: ValueId, op: IcmpOp, lhs_op: Operand, rhs_op: Operand },
    FloatArith { lhs: ValueId, op: FloatOp, precision: Precision, lhs_op: Operand, rhs_op: Operand },
    /// `call`. `lhs` is `None` for void calls.
    Call { lhs: Option<ValueId>, callee: Callee, args: Vec<Operand> },
    ExtractValue { lhs: ValueId, aggregate: Operand, index: usize },
    InsertValue { lhs: ValueId, aggregate: Operand, value: Operand, index: usize },
}

impl Instruction {
    pub fn lhs(&self) -> Option<ValueId> {
        use Instruction::*;
        match self {
            Alloca { lhs, .. }
            | Load { lhs, .. }
            | Gep { lhs, .. }
            | Trunc { lhs, .. }
            | ZExt { lhs, .. }
            | SExt { lhs, .. }
            | AddrSpaceCast { lhs, .. }
            | FpToUi { lhs, .. }
            | FpToSi { lhs, .. }
            | UiToFp { lhs, .. }
            | SiToFp { lhs, .. }
            | PtrToInt { lhs, .. }
            | IntToPtr { lhs, .. }
            | BitCast { lhs, .. }
            | Select { lhs, .. }
            | ExtractElement { lhs, .. }
            | InsertElement { lhs, .. }
            | ShuffleVector { lhs, .. }
            | Arith { lhs, .. }
            | Icmp { lhs, .. }
            | FloatArith { lhs, .. }
            | ExtractValue { lhs, .. }
            | InsertValue { lhs, .. } => Some(*lhs),
            Store { .. } => None,
            Call { lhs, .. } => *lhs,
        }
    }

    /// All operands that are themselves SSA values (constants are filtered
    /// out by the caller via `Operand::as_value`).
    pub fn operands(&self) -> Vec<Operand> {
        use Instruction::*;
        match self {
            Alloca { n, .. } => vec![n.clone()],
            Load { ptr, .. } => vec![ptr.clone()],
            Store { ptr, value } => vec![ptr.clone(), value.clone()],
            Gep { base, indices, .. } => {
                let mut v = vec![base.clone()];
                v.extend(indices.iter().cloned());
                v
            }
            Trunc { operand, .. }
            | ZExt { operand, .. }
            | SExt { operand, .. }
            | AddrSpaceCast { operand, .. }
            | FpToUi { operand, .. }
            | FpToSi { operand, .. }
            | UiToFp { operand, .. }
            | SiToFp { operand, .. }
            | PtrToInt { operand, .. }
            | IntToPtr { operand, .. }
            | BitCast { operand, .. } => vec![operand.clone()],
            Select { cond, t, f, .. } => vec![cond.clone(), t.clone(), f.clone()],
            ExtractElement { vector, index, .. } => vec![vector.clone(), index.clone()],
            InsertElement { vector, inserted, index, .. } => {
                vec![vector.clone(), inserted.clone(), index.clone()]
            }
            ShuffleVector { a, b, .. } => vec![a.clone(), b.clone()],
            Arith { lhs_op, rhs_op, .. } => vec![lhs_op.clone(), rhs_op.clone()],
            Icmp { lhs_op, rhs_op, .. } => vec![lhs_op.clone(), rhs_op.clone()],
            FloatArith { lhs_op, rhs_op, .. } => vec![lhs_op.clone(), rhs_op.clone()],
            Call { args, .. } => args.clone(),
            ExtractValue { aggregate, .. } => vec![aggregate.clone()],
            InsertValue { aggregate, value, .. } => vec![aggregate.clone(), value.clone()],
        }
    }
}

/// A block's exit. Block parameters (see `ir::function::BasicBlock`) play
/// the role of phi nodes (§0 of SPEC_FULL.md): each jump target supplies one
/// argument per target-block parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Return(Option<Operand>),
    Jump { target: super::value::BlockId, args: Vec<Operand> },
    CondBranch {
        cond: Operand,
        true_target: super::value::BlockId,
        true_args: Vec<Operand>,
        false_target: super::value::BlockId,
        false_args: Vec<Operand>,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<super::value::BlockId> {
        match self {
            Terminator::Return(_) => vec![],
            Terminator::Jump { target, .. } => vec![*target],
            Terminator::CondBranch { true_target, false_target, .. } => {
                vec![*true_target, *false_target]
            }
        }
    }

    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Terminator::Return(v) => v.iter().cloned().collect(),
            Terminator::Jump { args, .. } => args.clone(),
            Terminator::CondBranch { cond, true_args, false_args, .. } => {
                let mut v = vec![cond.clone()];
                v.extend(true_args.iter().cloned());
                v.extend(false_args.iter().cloned());
                v
            }
        }
    }
}
