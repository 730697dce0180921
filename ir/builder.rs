//! A hand-rolled builder for constructing `Function`s in tests and in the
//! `bin/analyze` front door, in lieu of parsing a textual IR format (the
//! "host IR library" concern SPEC_FULL.md §0/§1 places out of scope).
//! Mirrors the way the teacher crate's own unit tests build a tiny
//! `Program`/`Function` by hand (see `middle_end/analysis/tests.rs`) rather
//! than round-tripping through `front_end::parser::parse`.

use std::collections::BTreeMap as Map;

use super::function::{BasicBlock, Function, InstId};
use super::instruction::{Instruction, Terminator};
use super::tbaa::TbaaTag;
use super::types::Ty;
use super::value::{BlockId, Operand, ValueId};

pub struct FunctionBuilder {
    name: String,
    next_value: u32,
    next_block: u32,
    entry: BlockId,
    args: Vec<ValueId>,
    value_types: Map<ValueId, Ty>,
    blocks: Map<BlockId, BasicBlock>,
    ret_ty: Option<Ty>,
    tbaa: Map<InstId, TbaaTag>,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        let entry = BlockId(0);
        let mut blocks = Map::new();
        blocks.insert(
            entry,
            BasicBlock { id: entry, params: vec![], insts: vec![], term: Terminator::Return(None) },
        );
        FunctionBuilder {
            name: name.to_string(),
            next_value: 0,
            next_block: 1,
            entry,
            args: vec![],
            value_types: Map::new(),
            blocks,
            ret_ty: None,
            tbaa: Map::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    fn fresh_value(&mut self, ty: Ty) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        self.value_types.insert(id, ty);
        id
    }

    pub fn add_arg(&mut self, ty: Ty) -> ValueId {
        let v = self.fresh_value(ty);
        self.args.push(v);
        v
    }

    pub fn set_return_ty(&mut self, ty: Ty) {
        self.ret_ty = Some(ty);
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, BasicBlock { id, params: vec![], insts: vec![], term: Terminator::Return(None) });
        id
    }

    pub fn add_block_param(&mut self, block: BlockId, ty: Ty) -> ValueId {
        let v = self.fresh_value(ty);
        self.blocks.get_mut(&block).unwrap().params.push(v);
        v
    }

    /// Appends `inst` to `block` and returns the value it defines, if any.
    pub fn push(&mut self, block: BlockId, ty: Option<Ty>, make: impl FnOnce(ValueId) -> Instruction) -> Option<ValueId> {
        let lhs = ty.map(|ty| self.fresh_value(ty));
        let placeholder = lhs.unwrap_or(ValueId(u32::MAX));
        let inst = make(placeholder);
        self.blocks.get_mut(&block).unwrap().insts.push(inst);
        lhs
    }

    pub fn last_inst_id(&self, block: BlockId) -> InstId {
        (block, self.blocks[&block].insts.len() - 1)
    }

    pub fn set_tbaa(&mut self, inst: InstId, tag: TbaaTag) {
        self.tbaa.insert(inst, tag);
    }

    pub fn set_jump(&mut self, block: BlockId, target: BlockId, args: Vec<Operand>) {
        self.blocks.get_mut(&block).unwrap().term = Terminator::Jump { target, args };
    }

    pub fn set_cond_branch(
        &mut self,
        block: BlockId,
        cond: Operand,
        true_target: BlockId,
        true_args: Vec<Operand>,
        false_target: BlockId,
        false_args: Vec<Operand>,
    ) {
        self.blocks.get_mut(&block).unwrap().term =
            Terminator::CondBranch { cond, true_target, true_args, false_target, false_args };
    }

    pub fn set_return(&mut self, block: BlockId, value: Option<Operand>) {
        self.blocks.get_mut(&block).unwrap().term = Terminator::Return(value);
    }

    pub fn finish(self) -> Function {
        Function {
            name: self.name,
            args: self.args,
            entry: self.entry,
            blocks: self.blocks,
            value_types: self.value_types,
            ret_ty: self.ret_ty,
            tbaa: self.tbaa,
        }
    }
}
