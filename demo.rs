//! A handful of canned example functions used by `bin/type_analysis_cli`
//! and referenced from tests elsewhere. Stands in for the textual host-IR
//! parser SPEC_FULL.md §0/§1 places out of scope: rather than parsing a
//! `.lir`-style file the way the teacher crate's `bin/rdef.rs` does, the
//! CLI front door picks one of these by name and seeds its arguments from a
//! JSON sidecar, matching the *shape* of the teacher's JSON-sidecar
//! convention without needing a full grammar.

use crate::ir::builder::FunctionBuilder;
use crate::ir::types::{i64_ty, pointer_ty};
use crate::ir::{Constant, Function, Instruction, Operand};

/// `fn store_then_load(p: i64*) -> i64 { store 7, p; %v = load p; ret %v }`
pub fn store_then_load() -> Function {
    let mut b = FunctionBuilder::new("store_then_load");
    let p = b.add_arg(pointer_ty(i64_ty()));
    let entry = b.entry();
    b.push(entry, None, |_| Instruction::Store {
        ptr: Operand::Value(p),
        value: Operand::Constant(Constant::Int { value: 7, ty: i64_ty() }),
    });
    let v = b.push(entry, Some(i64_ty()), |lhs| Instruction::Load { lhs, ptr: Operand::Value(p) }).unwrap();
    b.set_return(entry, Some(Operand::Value(v)));
    b.finish()
}

/// `fn diamond_phi(cond: i1) -> i64 { br cond, a, b; a: jmp join(1); b: jmp join(2); join(%x): ret %x }`
pub fn diamond_phi() -> Function {
    let mut b = FunctionBuilder::new("diamond_phi");
    let cond = b.add_arg(crate::ir::types::i1_ty());
    let entry = b.entry();
    let a = b.add_block();
    let bb = b.add_block();
    let join = b.add_block();
    let param = b.add_block_param(join, i64_ty());

    b.set_cond_branch(entry, Operand::Value(cond), a, vec![], bb, vec![]);
    b.set_jump(a, join, vec![Operand::Constant(Constant::Int { value: 1, ty: i64_ty() })]);
    b.set_jump(bb, join, vec![Operand::Constant(Constant::Int { value: 2, ty: i64_ty() })]);
    b.set_return(join, Some(Operand::Value(param)));
    b.finish()
}

/// `fn gep_chain(base: {i64, i64}*) -> i64 { %p = gep base, 0, 1; %v = load %p; ret %v }`
pub fn gep_chain() -> Function {
    let struct_ty = crate::ir::types::struct_ty(vec![i64_ty(), i64_ty()]);
    let mut b = FunctionBuilder::new("gep_chain");
    let base = b.add_arg(pointer_ty(struct_ty));
    let entry = b.entry();
    let p = b
        .push(entry, Some(pointer_ty(i64_ty())), |lhs| Instruction::Gep {
            lhs,
            base: Operand::Value(base),
            indices: vec![Operand::Constant(Constant::Int { value: 8, ty: i64_ty() })],
            in_bounds: true,
        })
        .unwrap();
    let v = b.push(entry, Some(i64_ty()), |lhs| Instruction::Load { lhs, ptr: Operand::Value(p) }).unwrap();
    b.set_return(entry, Some(Operand::Value(v)));
    b.finish()
}

pub fn by_name(name: &str) -> Option<Function> {
    match name {
        "store_then_load" => Some(store_then_load()),
        "diamond_phi" => Some(diamond_phi()),
        "gep_chain" => Some(gep_chain()),
        _ => None,
    }
}
