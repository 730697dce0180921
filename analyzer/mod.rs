//! The intra-procedural analyzer (SPEC_FULL.md §4.3, module C): a
//! worklist-driven fixed-point over `ir::Function`, generalizing the
//! teacher crate's `forward_analysis` (`middle_end/analysis.rs`) from a
//! per-block dataflow pass to a per-value one, since the transfer rules
//! here (`transfer::transfer`) push facts both forward and backward along
//! the same edge instead of only forward through a block.

pub mod transfer;
pub mod unused;

use std::collections::{BTreeMap as Map, BTreeSet as Set, VecDeque};

use crate::ir::{BlockId, Cfg, DataLayout, DominatorTree, Function, InstId, TbaaTag, ValueId};
use crate::lattice::{OffsetMap, ScalarKind};
use crate::summary::{ArgumentInfo, FunctionSummary, ReturnSummary};

use transfer::{transfer, CallAction};

/// A unit of pending work: either an instruction result or a block
/// parameter (this IR's stand-in for a phi, §0). Function arguments never
/// appear here — they only ever receive facts from the caller-supplied
/// `FunctionSummary`, never recompute their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum WorkItem {
    Inst(InstId),
    Param(BlockId, usize),
}

/// Resolves a callee's return facts for a given set of incoming argument
/// facts. Implemented by `cache::TypeAnalysisSession` (module D); kept as a
/// trait here so the analyzer doesn't need to know about the cache's own
/// bookkeeping.
pub trait CalleeResolver {
    fn resolve(&mut self, name: &str, summary: &FunctionSummary) -> Option<ReturnSummary>;
}

/// A resolver that never resolves anything — every call is treated as
/// opaque. Useful for analyzing a function in isolation (tests, `bin`'s
/// single-function mode).
pub struct NoCalls;

impl CalleeResolver for NoCalls {
    fn resolve(&mut self, _name: &str, _summary: &FunctionSummary) -> Option<ReturnSummary> {
        None
    }
}

pub struct TypeAnalyzer<'a> {
    function: &'a Function,
    cfg: Cfg,
    dom: DominatorTree,
    layout: DataLayout,
    options: crate::diagnostics::AnalysisOptions,
    facts: Map<ValueId, OffsetMap>,
    worklist: VecDeque<WorkItem>,
    queued: Set<WorkItem>,
    pending_calls: VecDeque<InstId>,
    uses: Map<ValueId, Vec<WorkItem>>,
}

impl<'a> TypeAnalyzer<'a> {
    pub fn new(function: &'a Function, layout: DataLayout) -> Self {
        Self::with_options(function, layout, crate::diagnostics::AnalysisOptions::default())
    }

    /// As `new`, but with the ambient diagnostic flag (§6) set explicitly —
    /// `AnalysisOptions::traced()` makes every fact update print to stderr.
    pub fn with_options(function: &'a Function, layout: DataLayout, options: crate::diagnostics::AnalysisOptions) -> Self {
        let cfg = Cfg::new(function);
        let dom = DominatorTree::compute(function, &cfg);
        let uses = build_reverse_uses(function);

        TypeAnalyzer {
            function,
            cfg,
            dom,
            layout,
            options,
            facts: Map::new(),
            worklist: VecDeque::new(),
            queued: Set::new(),
            pending_calls: VecDeque::new(),
            uses,
        }
    }

    pub fn dominator_tree(&self) -> &DominatorTree {
        &self.dom
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    fn seed(&mut self, summary: &FunctionSummary) {
        for (i, arg) in self.function.args.iter().enumerate() {
            let ArgumentInfo { facts, .. } = summary.argument(i);
            self.facts.insert(*arg, facts);
        }

        self.consider_tbaa();

        // Seed the worklist with every instruction, then every block
        // parameter — matching the original ctor's "every instruction, then
        // every operand" seeding so a fact already implied by a later
        // instruction (e.g. a later `store` pinning down an earlier
        // `alloca`'s element type) isn't missed on the first pass.
        for (&block_id, block) in &self.function.blocks {
            for i in 0..block.insts.len() {
                self.enqueue(WorkItem::Inst((block_id, i)));
            }
            for slot in 0..block.params.len() {
                self.enqueue(WorkItem::Param(block_id, slot));
            }
        }
    }

    /// Seeds facts from TBAA metadata before the worklist runs
    /// (SPEC_FULL.md §4.3.6). Each tagged instruction contributes a
    /// `ScalarKind` from the TBAA table; where that scalar lands depends on
    /// the instruction's own shape, not on the generic transfer rule for its
    /// opcode, which is why this is a separate pre-pass rather than folded
    /// into `transfer::transfer`.
    fn consider_tbaa(&mut self) {
        for (&(block_id, idx), tag) in self.function.tbaa.clone().iter() {
            let inst = self.function.block(block_id).insts[idx].clone();
            let scalar = tbaa_scalar(*tag);

            match &inst {
                crate::ir::Instruction::Load { lhs, ptr } => {
                    let s = OffsetMap::scalar(scalar);
                    let mut ptr_update = s.only(0);
                    ptr_update.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                    if let Some(v) = ptr.as_value() {
                        self.update(v, ptr_update);
                    }
                    self.update(*lhs, s);
                }
                crate::ir::Instruction::Store { ptr, value } => {
                    // A store whose TBAA already says `Pointer` is skipped:
                    // the ordinary store transfer rule already demands
                    // `[] ↦ Pointer` on `ptr`, so applying it again here
                    // would only double the same fact (§4.3.6).
                    if matches!(scalar, ScalarKind::Pointer) {
                        continue;
                    }
                    let s = OffsetMap::scalar(scalar);
                    let mut ptr_update = s.only(0);
                    ptr_update.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                    if let Some(v) = ptr.as_value() {
                        self.update(v, ptr_update);
                    }
                    if let Some(v) = value.as_value() {
                        self.update(v, s);
                    }
                }
                crate::ir::Instruction::Call { lhs, callee, args } if matches!(callee, crate::ir::Callee::Memcpy | crate::ir::Callee::Memmove) => {
                    let _ = lhs;
                    let len = args.get(2).and_then(|op| match op {
                        crate::ir::Operand::Constant(crate::ir::Constant::Int { value, .. }) => Some(*value),
                        _ => None,
                    });
                    if let Some(len) = len {
                        let mut region = OffsetMap::new();
                        for i in 0..len {
                            region.join_with(&OffsetMap::scalar(scalar).only(i));
                        }
                        for arg in args.iter().take(2) {
                            if let Some(v) = arg.as_value() {
                                let mut u = region.clone();
                                u.join_with(&OffsetMap::scalar(ScalarKind::Pointer));
                                self.update(v, u);
                            }
                        }
                    }
                }
                crate::ir::Instruction::Call { lhs: Some(lhs), .. } if crate::ir::types::is_pointer(&self.function.type_of(*lhs)) => {
                    self.update(*lhs, OffsetMap::scalar(scalar).only(-1));
                }
                _ => {
                    panic!(
                        "unrecognized TBAA usage: tag {tag} on an instruction that is neither load/store, \
                         memcpy/memmove, nor a pointer-returning call ({block_id}:{idx})"
                    );
                }
            }
        }
    }

    fn enqueue(&mut self, item: WorkItem) {
        if self.queued.insert(item) {
            self.worklist.push_back(item);
        }
    }

    fn update(&mut self, v: ValueId, new_facts: OffsetMap) {
        let existing = self.facts.entry(v).or_default();
        let changed = existing.join_with(&new_facts);
        if changed {
            self.options.trace_update(v, &self.facts[&v]);
            if let Some(users) = self.uses.get(&v).cloned() {
                for item in users {
                    self.enqueue(item);
                }
            }
        }
    }

    fn process(&mut self, item: WorkItem, resolver: &mut dyn CalleeResolver) {
        match item {
            WorkItem::Inst((block, idx)) => self.process_inst(block, idx, resolver),
            WorkItem::Param(block, slot) => self.process_param(block, slot),
        }
    }

    fn process_inst(&mut self, block: BlockId, idx: usize, resolver: &mut dyn CalleeResolver) {
        let inst = self.function.block(block).insts[idx].clone();
        let result = transfer(&inst, self.function, &self.layout, &self.facts);

        for (target, facts) in result.updates {
            self.update(target, facts);
        }

        if matches!(result.call_action, CallAction::Defer) {
            if let crate::ir::Instruction::Call { callee: crate::ir::Callee::Function(name), args, lhs } = &inst {
                let summary = self.call_summary(name, args);
                if let Some(ret) = resolver.resolve(name, &summary) {
                    if let Some(lhs) = lhs {
                        self.update(*lhs, ret.return_facts);
                    }
                } else {
                    self.pending_calls.push_back((block, idx));
                }
            }
        }
    }

    fn call_summary(&self, name: &str, args: &[crate::ir::Operand]) -> FunctionSummary {
        let arguments = args
            .iter()
            .map(|op| match op {
                crate::ir::Operand::Constant(crate::ir::Constant::Int { value, .. }) => ArgumentInfo::from_constant(*value),
                _ => ArgumentInfo { facts: transfer::operand_facts(op, &self.facts), known_constant: None },
            })
            .collect();
        FunctionSummary::new(name, arguments)
    }

    /// The phi transfer rule (§4.3.3): "each incoming value inherits
    /// `facts[phi]`" (backward) and "the phi result inherits the
    /// intersection of facts over all transitively-reachable non-self
    /// incoming values" (forward), breaking phi cycles by flattening the
    /// chain first and meeting once (§9 "flatten then meet", mirroring
    /// `visitPHINode`'s seen-set walk in the original).
    fn process_param(&mut self, block: BlockId, slot: usize) {
        let param = self.function.block(block).params[slot];
        let incoming = self.function.incoming_to_param(block, slot);

        let param_facts = self.facts.get(&param).cloned().unwrap_or_default();
        for (_, operand) in &incoming {
            if let Some(v) = operand.as_value() {
                self.update(v, param_facts.clone());
            }
        }

        let mut seen = Set::new();
        seen.insert(param);
        let mut leaves = Vec::new();
        self.collect_phi_leaves(&incoming, &mut seen, &mut leaves);

        let meet = leaves
            .into_iter()
            .map(|v| self.facts.get(&v).cloned().unwrap_or_default())
            .reduce(|acc, f| acc.met(&f));

        if let Some(meet) = meet {
            self.update(param, meet);
        }
    }

    /// Flattens a chain of phis into the flat set of non-phi (or
    /// already-visited, i.e. cyclic) leaf values reachable from `incoming`,
    /// so the meet in `process_param` is taken once over that flat set
    /// rather than looping forever around a phi cycle.
    fn collect_phi_leaves(&self, incoming: &[(BlockId, crate::ir::Operand)], seen: &mut Set<ValueId>, leaves: &mut Vec<ValueId>) {
        for (_, operand) in incoming {
            let Some(v) = operand.as_value() else { continue };
            match self.function.param_slot_of(v) {
                Some((b, s)) if seen.insert(v) => {
                    let nested = self.function.incoming_to_param(b, s);
                    self.collect_phi_leaves(&nested, seen, leaves);
                }
                Some(_) => {
                    // Already visited (a phi cycle) or the phi itself fed
                    // back along a loop edge: contributes nothing further.
                }
                None => leaves.push(v),
            }
        }
    }

    /// Drains the worklist to a fixed point (§4.3.2). A call the resolver
    /// can't yet satisfy is left recorded in `pending_calls`; it doesn't
    /// need its own retry loop here because any change to one of its
    /// argument values already re-enqueues the call instruction through the
    /// normal `uses` dependency edges, which re-attempts resolution as a
    /// side effect of `process_inst`.
    fn drain(&mut self, resolver: &mut dyn CalleeResolver) {
        while let Some(item) = self.worklist.pop_front() {
            self.queued.remove(&item);
            self.process(item, resolver);
        }
    }

    /// Runs the analysis: drains to a fixed point, then runs the
    /// unused-value pass once and redrains if it added anything new
    /// (§4.3.6, `TypeAnalyzer::run`'s "rerun if changed").
    pub fn run(mut self, summary: &FunctionSummary, resolver: &mut dyn CalleeResolver) -> ReturnSummary {
        self.seed(summary);
        self.drain(resolver);

        let mut promoted = false;
        for v in self.function.all_values() {
            let known = self.facts.get(&v).cloned().unwrap_or_default();
            if known.top() == crate::lattice::ScalarKind::Unknown
                && unused::has_any_use(v, self.function)
                && unused::has_only_integral_uses(v, self.function, &self.facts)
            {
                self.update(v, OffsetMap::scalar(crate::lattice::ScalarKind::Integer));
                promoted = true;
            }
        }
        if promoted {
            self.drain(resolver);
        }

        let return_facts = match &self.function.block(self.terminal_return_block()).term {
            crate::ir::Terminator::Return(Some(op)) => transfer::operand_facts(op, &self.facts),
            _ => OffsetMap::new(),
        };

        ReturnSummary { return_facts, per_value: self.facts }
    }

    fn terminal_return_block(&self) -> BlockId {
        self.function
            .blocks
            .values()
            .find(|b| matches!(b.term, crate::ir::Terminator::Return(_)))
            .map(|b| b.id)
            .unwrap_or(self.function.entry)
    }
}

/// The TBAA tag table (§4.3.6): which `ScalarKind` a given tag implies.
fn tbaa_scalar(tag: TbaaTag) -> ScalarKind {
    match tag {
        TbaaTag::LongLong | TbaaTag::Long | TbaaTag::Int | TbaaTag::Bool => ScalarKind::Integer,
        TbaaTag::AnyPointer | TbaaTag::VTablePointer => ScalarKind::Pointer,
        TbaaTag::Float => ScalarKind::Float(crate::ir::Precision::Single),
        TbaaTag::Double => ScalarKind::Float(crate::ir::Precision::Double),
    }
}

/// Builds the value -> dependents index once up front: every operand of
/// every instruction, every jump argument feeding a block parameter, and
/// every block parameter itself, registers the consuming `WorkItem` against
/// the value it reads.
fn build_reverse_uses(function: &Function) -> Map<ValueId, Vec<WorkItem>> {
    let mut uses: Map<ValueId, Vec<WorkItem>> = Map::new();

    for (&block_id, block) in &function.blocks {
        for (i, inst) in block.insts.iter().enumerate() {
            for op in inst.operands() {
                if let Some(v) = op.as_value() {
                    uses.entry(v).or_default().push(WorkItem::Inst((block_id, i)));
                }
            }
        }
    }

    for (&block_id, block) in &function.blocks {
        for slot in 0..block.params.len() {
            for (_, operand) in function.incoming_to_param(block_id, slot) {
                if let Some(v) = operand.as_value() {
                    uses.entry(v).or_default().push(WorkItem::Param(block_id, slot));
                }
            }
            // A param is its own trigger for re-running the phi rule's
            // backward half (§4.3.3: "each incoming value inherits
            // `facts[phi]`"): when the param's own facts change because of
            // a use inside its own block (e.g. a `store` through it), that
            // change has to be re-pushed onto every incoming value, not
            // just whenever an incoming value itself changes first.
            let param = block.params[slot];
            uses.entry(param).or_default().push(WorkItem::Param(block_id, slot));
        }
    }

    for v in uses.values_mut() {
        v.sort();
        v.dedup();
    }
    uses
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::{i64_ty, pointer_ty};
    use crate::ir::{Instruction, Operand};
    use crate::lattice::ScalarKind;

    #[test]
    fn load_of_a_stored_integer_is_classified_integer() {
        // %p = alloca i64; store 1, %p; %v = load %p; ret %v
        let mut b = FunctionBuilder::new("store_then_load");
        let entry = b.entry();
        let p = b.push(entry, Some(pointer_ty(i64_ty())), |lhs| Instruction::Alloca {
            lhs,
            elem_ty: i64_ty(),
            n: Operand::Constant(crate::ir::Constant::Int { value: 1, ty: i64_ty() }),
        })
        .unwrap();
        b.push(entry, None, |_| Instruction::Store {
            ptr: Operand::Value(p),
            value: Operand::Constant(crate::ir::Constant::Int { value: 1, ty: i64_ty() }),
        });
        let v = b.push(entry, Some(i64_ty()), |lhs| Instruction::Load { lhs, ptr: Operand::Value(p) }).unwrap();
        b.set_return(entry, Some(Operand::Value(v)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("store_then_load", vec![]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(v).top(), ScalarKind::Integer);
        assert_eq!(result.facts_of(p).top(), ScalarKind::Pointer);
    }

    #[test]
    fn diamond_phi_meets_both_branches_to_integer() {
        // Both incoming edges already agree on `Integer`, so the meet (∧)
        // and a plain join (∨) coincide here — this alone can't tell the
        // two operations apart, see `diamond_phi_with_disagreeing_incoming_kinds_meets_to_unknown`.
        let mut b = FunctionBuilder::new("diamond_phi");
        let entry = b.entry();
        let a_block = b.add_block();
        let b_block = b.add_block();
        let join = b.add_block();
        let join_param = b.add_block_param(join, i64_ty());

        let cond = b.add_arg(crate::ir::types::i1_ty());
        b.set_cond_branch(entry, Operand::Value(cond), a_block, vec![], b_block, vec![]);

        let one = Operand::Constant(crate::ir::Constant::Int { value: 1, ty: i64_ty() });
        let two = Operand::Constant(crate::ir::Constant::Int { value: 2, ty: i64_ty() });
        b.set_jump(a_block, join, vec![one]);
        b.set_jump(b_block, join, vec![two]);
        b.set_return(join, Some(Operand::Value(join_param)));

        let f = b.finish();
        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("diamond_phi", vec![ArgumentInfo::unknown()]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(join_param).top(), ScalarKind::Integer);
    }

    #[test]
    fn diamond_phi_with_disagreeing_incoming_kinds_meets_to_unknown() {
        // One incoming edge is a `Pointer`-typed value, the other an
        // `Integer`-typed one. §4.3.3's phi rule takes the *meet* (∧) over
        // incoming facts, not the join (∨): `Pointer ∧ Integer = Unknown`
        // (a contradiction demotes to bottom), whereas a join would wrongly
        // widen to `Anything`.
        let mut b = FunctionBuilder::new("diamond_phi_disagree");
        let entry = b.entry();
        let a_block = b.add_block();
        let b_block = b.add_block();
        let join = b.add_block();
        let join_param = b.add_block_param(join, i64_ty());

        let cond = b.add_arg(crate::ir::types::i1_ty());
        let ptr_arg = b.add_arg(crate::ir::types::pointer_ty(i64_ty()));
        let int_arg = b.add_arg(i64_ty());
        b.set_cond_branch(entry, Operand::Value(cond), a_block, vec![], b_block, vec![]);

        b.set_jump(a_block, join, vec![Operand::Value(ptr_arg)]);
        b.set_jump(b_block, join, vec![Operand::Value(int_arg)]);
        b.set_return(join, Some(Operand::Value(join_param)));

        let f = b.finish();
        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new(
            "diamond_phi_disagree",
            vec![
                ArgumentInfo::unknown(),
                ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Pointer)),
                ArgumentInfo::with_facts(OffsetMap::scalar(ScalarKind::Integer)),
            ],
        );
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(join_param).top(), ScalarKind::Unknown);
    }

    #[test]
    fn phi_pushes_its_own_facts_back_onto_each_incoming_value() {
        // fn(cond) { cond_branch cond, a, b; a: jump join(p); b: jump join(q);
        //   join(%m: i64*): store 1, %m; ret }
        // `%m`'s pointer-ness (learned from the `store` inside `join`) must
        // propagate backward onto both `p` and `q` (§4.3.3: "each incoming
        // value inherits `facts[phi]`").
        let mut b = FunctionBuilder::new("phi_backward");
        let entry = b.entry();
        let a_block = b.add_block();
        let b_block = b.add_block();
        let join = b.add_block();
        let join_param = b.add_block_param(join, crate::ir::types::pointer_ty(i64_ty()));

        let cond = b.add_arg(crate::ir::types::i1_ty());
        let p = b.add_arg(crate::ir::types::pointer_ty(i64_ty()));
        let q = b.add_arg(crate::ir::types::pointer_ty(i64_ty()));
        b.set_cond_branch(entry, Operand::Value(cond), a_block, vec![], b_block, vec![]);
        b.set_jump(a_block, join, vec![Operand::Value(p)]);
        b.set_jump(b_block, join, vec![Operand::Value(q)]);
        b.push(join, None, |_| Instruction::Store {
            ptr: Operand::Value(join_param),
            value: Operand::Constant(crate::ir::Constant::Int { value: 1, ty: i64_ty() }),
        });
        b.set_return(join, None);

        let f = b.finish();
        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("phi_backward", vec![ArgumentInfo::unknown(), ArgumentInfo::unknown(), ArgumentInfo::unknown()]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(p).top(), ScalarKind::Pointer);
        assert_eq!(result.facts_of(p).lookup(0).top(), ScalarKind::Integer);
        assert_eq!(result.facts_of(q).top(), ScalarKind::Pointer);
        assert_eq!(result.facts_of(q).lookup(0).top(), ScalarKind::Integer);
    }

    #[test]
    fn tbaa_tagged_load_seeds_integer_with_no_store_in_sight() {
        // %p = alloca i64; %v = load %p  [tbaa !int]; ret %v
        let mut b = FunctionBuilder::new("tbaa_load");
        let entry = b.entry();
        let p = b
            .push(entry, Some(pointer_ty(i64_ty())), |lhs| Instruction::Alloca {
                lhs,
                elem_ty: i64_ty(),
                n: Operand::Constant(crate::ir::Constant::Int { value: 1, ty: i64_ty() }),
            })
            .unwrap();
        let v = b.push(entry, Some(i64_ty()), |lhs| Instruction::Load { lhs, ptr: Operand::Value(p) }).unwrap();
        b.set_tbaa(b.last_inst_id(entry), crate::ir::TbaaTag::Int);
        b.set_return(entry, Some(Operand::Value(v)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("tbaa_load", vec![]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(v).top(), ScalarKind::Integer);
        assert_eq!(result.facts_of(p).top(), ScalarKind::Pointer);
    }

    #[test]
    fn tbaa_tagged_pointer_returning_call_seeds_wildcard_pointee() {
        // %r = call @get_ptr()  [tbaa !anypointer]; ret %r
        let mut b = FunctionBuilder::new("tbaa_call");
        let entry = b.entry();
        let r = b
            .push(entry, Some(pointer_ty(i64_ty())), |lhs| Instruction::Call {
                lhs: Some(lhs),
                callee: crate::ir::Callee::Function("get_ptr".into()),
                args: vec![],
            })
            .unwrap();
        b.set_tbaa(b.last_inst_id(entry), crate::ir::TbaaTag::AnyPointer);
        b.set_return(entry, Some(Operand::Value(r)));
        let f = b.finish();

        let analyzer = TypeAnalyzer::new(&f, DataLayout::default());
        let summary = FunctionSummary::new("tbaa_call", vec![]);
        let result = analyzer.run(&summary, &mut NoCalls);

        assert_eq!(result.facts_of(r).lookup(-1).top(), ScalarKind::Pointer);
    }
}
