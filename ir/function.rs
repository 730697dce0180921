//! Functions, basic blocks, the CFG, and the dominator tree.
//!
//! The CFG/dominator machinery here is deliberately the teacher crate's own
//! approach generalized: `middle_end/analysis.rs::Cfg` builds successor and
//! predecessor edge maps with a single pass over terminators and finds loop
//! headers with a worklist-free recursive reachability search, and
//! `middle_end/control_analysis/control.rs` computes dominance itself as a
//! forward dataflow analysis (`Value(Set<BbId>)` with *intersection* as
//! join). This module keeps exactly that shape: `Cfg` for edges, and
//! `DominatorTree` built as one more small fixed point over the same kind of
//! `Map<BlockId, Set<BlockId>>` state, rather than reaching for a from-scratch
//! Lengauer-Tarjan implementation the teacher never needed either.

use std::collections::{BTreeMap as Map, BTreeSet as Set, VecDeque};

use super::instruction::{Instruction, Terminator};
use super::tbaa::TbaaTag;
use super::types::Ty;
use super::value::{BlockId, ValueId};

/// `(block, instruction index)` — the terminator is conventionally at index
/// `block.insts.len()`. Mirrors the teacher's `InstId = (BbId, usize)`.
pub type InstId = (BlockId, usize);

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Block parameters double as this IR's phi nodes (SPEC_FULL.md §0).
    pub params: Vec<ValueId>,
    pub insts: Vec<Instruction>,
    pub term: Terminator,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub args: Vec<ValueId>,
    pub entry: BlockId,
    pub blocks: Map<BlockId, BasicBlock>,
    pub value_types: Map<ValueId, Ty>,
    pub ret_ty: Option<Ty>,
    pub tbaa: Map<InstId, TbaaTag>,
}

impl Function {
    pub fn type_of(&self, v: ValueId) -> Ty {
        self.value_types
            .get(&v)
            .unwrap_or_else(|| panic!("no type recorded for {v}"))
            .clone()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[&id]
    }

    /// Every instruction result and block parameter defined by this
    /// function, in deterministic (block, then in-block) order.
    pub fn all_values(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        for block in self.blocks.values() {
            out.extend(block.params.iter().copied());
            for inst in &block.insts {
                if let Some(lhs) = inst.lhs() {
                    out.push(lhs);
                }
            }
        }
        out
    }

    /// Users of `v`: every other value whose defining instruction (or
    /// terminator, or block-parameter incoming edge) takes `v` as an
    /// operand. Built once and reused by the analyzer's worklist driver
    /// (§4.3.2: "enqueue ... its users (restricted to the current
    /// function)").
    pub fn users_of(&self, v: ValueId) -> Vec<ValueId> {
        let mut users = Vec::new();
        for block in self.blocks.values() {
            for (i, inst) in block.insts.iter().enumerate() {
                let _ = i;
                if inst.operands().iter().any(|op| op.as_value() == Some(v)) {
                    if let Some(lhs) = inst.lhs() {
                        users.push(lhs);
                    }
                }
            }
            // A value flowing into a jump's argument list "uses" that value
            // and is used-by the corresponding target block parameter
            // (§4.3.3's phi rule: incoming values and the phi itself
            // co-update).
            for (target, args) in jump_edges(&block.term) {
                let target_params = &self.blocks[&target].params;
                for (slot, arg) in args.iter().enumerate() {
                    if arg.as_value() == Some(v) {
                        if let Some(param) = target_params.get(slot) {
                            users.push(*param);
                        }
                    }
                }
            }
        }
        users.sort();
        users.dedup();
        users
    }

    /// The operands feeding a block parameter: one per predecessor edge
    /// that targets this block, in `(predecessor, argument)` pairs.
    pub fn incoming_to_param(&self, block: BlockId, slot: usize) -> Vec<(BlockId, super::value::Operand)> {
        let mut out = Vec::new();
        for (pred_id, pred) in &self.blocks {
            for (target, args) in jump_edges(&pred.term) {
                if target == block {
                    if let Some(arg) = args.get(slot) {
                        out.push((*pred_id, arg.clone()));
                    }
                }
            }
        }
        out
    }

    /// If `v` is some block's parameter (this IR's phi, §0), the
    /// `(block, slot)` it's defined at. Used by the phi transfer rule
    /// (§4.3.3) to walk a chain of phis feeding one another when
    /// flattening incoming facts before a meet (§9 "flatten then meet").
    pub fn param_slot_of(&self, v: ValueId) -> Option<(BlockId, usize)> {
        for (&block_id, block) in &self.blocks {
            if let Some(slot) = block.params.iter().position(|&p| p == v) {
                return Some((block_id, slot));
            }
        }
        None
    }
}

fn jump_edges(term: &Terminator) -> Vec<(BlockId, Vec<super::value::Operand>)> {
    match term {
        Terminator::Return(_) => vec![],
        Terminator::Jump { target, args } => vec![(*target, args.clone())],
        Terminator::CondBranch { true_target, true_args, false_target, false_args, .. } => {
            vec![(*true_target, true_args.clone()), (*false_target, false_args.clone())]
        }
    }
}

/// Successor/predecessor edges for a function, built once up front exactly
/// the way `Cfg::new` does in the teacher crate.
#[derive(Clone, Debug)]
pub struct Cfg {
    pub entry: BlockId,
    succ: Map<BlockId, Set<BlockId>>,
    pred: Map<BlockId, Set<BlockId>>,
}

impl Cfg {
    pub fn new(f: &Function) -> Self {
        let mut succ: Map<BlockId, Set<BlockId>> = f.blocks.keys().map(|b| (*b, Set::new())).collect();
        let mut pred: Map<BlockId, Set<BlockId>> = f.blocks.keys().map(|b| (*b, Set::new())).collect();

        for (id, block) in &f.blocks {
            for target in block.term.successors() {
                succ.get_mut(id).unwrap().insert(target);
                pred.get_mut(&target).unwrap().insert(*id);
            }
        }

        Cfg { entry: f.entry, succ, pred }
    }

    pub fn succ(&self, b: BlockId) -> impl Iterator<Item = &BlockId> {
        self.succ[&b].iter()
    }

    pub fn pred(&self, b: BlockId) -> impl Iterator<Item = &BlockId> {
        self.pred[&b].iter()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.succ.keys()
    }
}

/// The dominator relation, computed as a forward meet-over-paths fixed
/// point: `dom[entry] = {entry}`, `dom[b] = {b} ∪ ⋂ dom[p]` for every
/// predecessor `p`, iterated to a fixed point with a FIFO worklist — the
/// same shape as `middle_end/analysis.rs::forward_analysis`, specialized to
/// the powerset-with-intersection lattice `control_analysis::control::Value`
/// uses.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    /// `dom[b]` = every block that dominates `b`, including `b` itself.
    dom: Map<BlockId, Set<BlockId>>,
    entry: BlockId,
}

impl DominatorTree {
    pub fn compute(f: &Function, cfg: &Cfg) -> Self {
        let all: Set<BlockId> = f.blocks.keys().copied().collect();
        let mut dom: Map<BlockId, Set<BlockId>> = f.blocks.keys().map(|b| (*b, all.clone())).collect();
        dom.insert(cfg.entry, Set::from([cfg.entry]));

        let mut worklist: VecDeque<BlockId> = cfg.blocks().copied().collect();
        while let Some(b) = worklist.pop_front() {
            if b == cfg.entry {
                continue;
            }
            let mut new_dom: Option<Set<BlockId>> = None;
            for p in cfg.pred(b) {
                let pdom = &dom[p];
                new_dom = Some(match new_dom {
                    None => pdom.clone(),
                    Some(acc) => acc.intersection(pdom).copied().collect(),
                });
            }
            let mut new_dom = new_dom.unwrap_or_default();
            new_dom.insert(b);

            if new_dom != dom[&b] {
                dom.insert(b, new_dom);
                for s in cfg.succ(b) {
                    worklist.push_back(*s);
                }
            }
        }

        DominatorTree { dom, entry: cfg.entry }
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom[&b].contains(&a)
    }

    /// The immediate dominator: the unique strict dominator of `b` that is
    /// dominated by every other strict dominator of `b`. `None` for the
    /// entry block.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        if b == self.entry {
            return None;
        }
        self.dom[&b]
            .iter()
            .filter(|&&d| d != b)
            .find(|&&d| self.dom[&b].iter().filter(|&&o| o != b).all(|&o| self.dominates(d, o) || d == o))
            .copied()
    }

    fn children(&self, b: BlockId) -> Vec<BlockId> {
        let mut out: Vec<BlockId> = self
            .dom
            .keys()
            .filter(|&&c| c != b && self.idom(c) == Some(b))
            .copied()
            .collect();
        out.sort();
        out
    }

    /// Breadth-first order over the dominator tree, entry first. This is
    /// the "Block order" step of the reverse-mode rewriter (§4.5 rule 1):
    /// innermost dominated blocks come last here, so reversing this list
    /// visits them first when emitting the adjoint.
    pub fn bfs_order(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(b) = queue.pop_front() {
            order.push(b);
            queue.extend(self.children(b));
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::builder::FunctionBuilder;
    use super::super::types::i32_ty;
    use super::*;

    #[test]
    fn diamond_cfg_dominance_and_order() {
        // entry -> {a, b} -> join -> ret, matching S6 in SPEC_FULL.md §8.
        let mut b = FunctionBuilder::new("diamond");
        let entry = b.entry();
        let a = b.add_block();
        let bb = b.add_block();
        let join = b.add_block();

        b.set_cond_branch(entry, dummy_cond(), a, vec![], bb, vec![]);
        b.set_jump(a, join, vec![]);
        b.set_jump(bb, join, vec![]);
        b.set_return(join, None);

        let f = b.finish();
        let cfg = Cfg::new(&f);
        let dt = DominatorTree::compute(&f, &cfg);

        assert!(dt.dominates(entry, a));
        assert!(dt.dominates(entry, bb));
        assert!(dt.dominates(entry, join));
        assert!(!dt.dominates(a, bb));
        assert!(!dt.dominates(a, join));

        let order = dt.bfs_order();
        assert_eq!(order[0], entry);
        assert!(order.contains(&a) && order.contains(&bb) && order.contains(&join));
        // join is not a dominator-tree child of a or b, it's a child of entry.
        assert_eq!(dt.idom(join), Some(entry));
    }

    // helper producing a throwaway i1 constant-operand for the branch condition.
    fn dummy_cond() -> super::super::value::Operand {
        super::super::value::Operand::Constant(super::super::value::Constant::Int {
            value: 1,
            ty: i32_ty(),
        })
    }
}
