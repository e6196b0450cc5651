// This module implements the liveness engine: a backward dataflow fixed
// point over the blocks of one function, producing per-block live-in and
// live-out sets and, in Intervals mode, a live range for every variable.
// The engine leverages sparsity by partitioning variables into globals
// (multiblock) and locals (single-block): globals occupy live indices
// [0, num_globals) shared by the whole function, locals are renumbered
// independently per block above that, and the per-block bit sets are sized
// to the global count only. The working state is scoped to one pass and
// allocated from a caller-supplied arena rather than persisted on the
// Function. Blocks are visited in reverse of the current block order, an
// approximation of reverse postorder that converges for any order because
// live-in sets only grow inside a finite lattice. After convergence the
// Intervals postprocess deletes instructions whose destination was never
// used, then turns each block's recorded begin/end positions into merged
// live-range segments, anchoring live-in/live-out globals to the block
// boundaries and giving the entry block a pseudo-number before its first
// instruction so argument ranges never collapse to a trivial interval.

//! Liveness analysis and live-range construction.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::{BlockId, Function, Inst, InstNumber, Operand, VarId};

/// What [`Liveness::run`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessMode {
    /// Live-in/live-out sets only.
    Basic,
    /// Live-in/live-out sets plus a [`LiveRange`](crate::ir::LiveRange)
    /// for every variable, deleting dead instructions along the way.
    Intervals,
}

/// Live index of a variable excluded from liveness tracking.
const UNTRACKED: usize = usize::MAX;

/// Per-block working state.
#[derive(Debug)]
struct LivenessNode<'arena> {
    /// Variables local to this block; position `i` holds the variable with
    /// live index `num_globals + i`.
    live_to_var: BumpVec<'arena, VarId>,
    /// Global-sized bit sets at the block boundaries.
    live_in: FixedBitSet,
    live_out: FixedBitSet,
    /// Per live index: instruction numbers bounding the index's coverage
    /// inside the block. `NUMBER_SENTINEL` when unrecorded. Intervals mode
    /// only.
    live_begin: BumpVec<'arena, InstNumber>,
    live_end: BumpVec<'arena, InstNumber>,
}

impl<'arena> LivenessNode<'arena> {
    fn new_in(arena: &'arena Bump, num_globals: usize) -> Self {
        LivenessNode {
            live_to_var: BumpVec::new_in(arena),
            live_in: FixedBitSet::with_capacity(num_globals),
            live_out: FixedBitSet::with_capacity(num_globals),
            live_begin: BumpVec::new_in(arena),
            live_end: BumpVec::new_in(arena),
        }
    }
}

/// One liveness pass over one function.
///
/// The variable classification read at construction time must not change
/// while the pass is alive; rebuild the engine after the CFG or the
/// classification changes (the advanced phi lowering's incremental update
/// being the one sanctioned exception).
#[derive(Debug)]
pub struct Liveness<'arena> {
    arena: &'arena Bump,
    mode: LivenessMode,
    num_globals: usize,
    /// Variable index to live index, `UNTRACKED` for ignored variables.
    var_to_live: Vec<usize>,
    live_to_var_global: Vec<VarId>,
    nodes: Vec<LivenessNode<'arena>>,
}

impl<'arena> Liveness<'arena> {
    /// Partitions the variables and sizes the per-block sets. Fails only
    /// on a function with no blocks.
    pub fn new(
        arena: &'arena Bump,
        func: &mut Function,
        mode: LivenessMode,
    ) -> AnalysisResult<Self> {
        if func.num_blocks() == 0 {
            func.set_error("liveness requested for a function with no blocks");
            return Err(AnalysisError::EmptyFunction);
        }
        let mut var_to_live = vec![UNTRACKED; func.num_variables()];
        let mut live_to_var_global = Vec::new();
        for var in func.variables() {
            if var.ignore_liveness() {
                continue;
            }
            if var.is_multiblock() {
                var_to_live[var.index().index()] = live_to_var_global.len();
                live_to_var_global.push(var.index());
            }
        }
        let num_globals = live_to_var_global.len();
        let mut nodes: Vec<LivenessNode<'arena>> = (0..func.num_blocks())
            .map(|_| LivenessNode::new_in(arena, num_globals))
            .collect();
        for var in func.variables() {
            if var.ignore_liveness() || var.is_multiblock() {
                continue;
            }
            if let Some(home) = var.home_block() {
                // A home block past the end means the classification is
                // stale after pruning; such a variable stays untracked.
                debug_assert!(home.index() < nodes.len());
                if let Some(node) = nodes.get_mut(home.index()) {
                    var_to_live[var.index().index()] = num_globals + node.live_to_var.len();
                    node.live_to_var.push(var.index());
                }
            }
        }
        log::debug!(
            "liveness({}): {} globals of {} variables, {} blocks",
            func.name(),
            num_globals,
            func.num_variables(),
            func.num_blocks()
        );
        Ok(Liveness {
            arena,
            mode,
            num_globals,
            var_to_live,
            live_to_var_global,
            nodes,
        })
    }

    pub fn mode(&self) -> LivenessMode {
        self.mode
    }

    pub fn num_globals(&self) -> usize {
        self.num_globals
    }

    /// Live index of `var`, or `None` when the variable is not tracked.
    pub fn live_index(&self, var: VarId) -> Option<usize> {
        match self.var_to_live.get(var.index()) {
            Some(&li) if li != UNTRACKED => Some(li),
            _ => None,
        }
    }

    /// The variable behind a live index. Indices at or above the global
    /// count are resolved through `block`'s local numbering.
    pub fn variable_for(&self, live_index: usize, block: BlockId) -> VarId {
        if live_index < self.num_globals {
            self.live_to_var_global[live_index]
        } else {
            self.nodes[block.index()].live_to_var[live_index - self.num_globals]
        }
    }

    /// Variables live at entry of `block`, as a global-index bit set.
    pub fn live_in(&self, block: BlockId) -> &FixedBitSet {
        &self.nodes[block.index()].live_in
    }

    /// Variables live at exit of `block`, as a global-index bit set.
    pub fn live_out(&self, block: BlockId) -> &FixedBitSet {
        &self.nodes[block.index()].live_out
    }

    /// Backward dataflow fixed point; in Intervals mode also deletes dead
    /// instructions and rebuilds every variable's live range.
    ///
    /// Always terminates: live-in sets only grow and are bounded by the
    /// global count. Rerunning on a converged function changes nothing.
    pub fn run(&mut self, func: &mut Function) -> AnalysisResult<()> {
        let nb = func.num_blocks();
        debug_assert_eq!(nb, self.nodes.len());
        let mut dirty = FixedBitSet::with_capacity(nb);
        dirty.insert_range(..);
        let mut sweeps = 0usize;
        while dirty.count_ones(..) > 0 {
            sweeps += 1;
            // Reverse of the block order approximates reverse postorder;
            // any order converges, a poor one just takes more sweeps.
            for bi in (0..nb).rev() {
                if !dirty.contains(bi) {
                    continue;
                }
                dirty.set(bi, false);
                if self.scan_block(func, bi)? {
                    for &pred in func.block(BlockId(bi as u32)).in_edges() {
                        dirty.insert(pred.index());
                    }
                }
            }
        }
        log::debug!("liveness({}) converged after {} sweeps", func.name(), sweeps);
        if self.mode == LivenessMode::Intervals {
            for var in func.variables_mut() {
                var.reset_live_range();
            }
            for bi in 0..nb {
                self.add_block_intervals(func, bi);
            }
        }
        Ok(())
    }

    /// Extends the per-block and per-variable tables to cover blocks and
    /// variables created after the engine was built. New variables start
    /// untracked; register edge-split temporaries with
    /// [`Liveness::register_local`].
    pub fn grow_for_new_blocks(&mut self, func: &Function) {
        while self.nodes.len() < func.num_blocks() {
            self.nodes
                .push(LivenessNode::new_in(self.arena, self.num_globals));
        }
        while self.var_to_live.len() < func.num_variables() {
            self.var_to_live.push(UNTRACKED);
        }
    }

    /// Registers a freshly created variable as local to `block`. The
    /// global partition of an existing numbering cannot grow.
    pub fn register_local(&mut self, var: VarId, block: BlockId) {
        debug_assert!(self.var_to_live[var.index()] == UNTRACKED);
        let node = &mut self.nodes[block.index()];
        self.var_to_live[var.index()] = self.num_globals + node.live_to_var.len();
        node.live_to_var.push(var);
    }

    /// Force a global variable live at entry of `block`. Used when phi
    /// elimination moves a definition out of `block` and the stored
    /// solution must be patched rather than recomputed.
    pub fn mark_live_in(&mut self, block: BlockId, var: VarId) {
        if let Some(li) = self.live_index(var) {
            if li < self.num_globals {
                self.nodes[block.index()].live_in.insert(li);
            }
        }
    }

    /// Force a global variable live at exit of `block`.
    pub fn mark_live_out(&mut self, block: BlockId, var: VarId) {
        if let Some(li) = self.live_index(var) {
            if li < self.num_globals {
                self.nodes[block.index()].live_out.insert(li);
            }
        }
    }

    /// Computes the dataflow and interval contribution of one block
    /// appended after the main fixed point, folding it into the existing
    /// global solution. The block's successors must already have a valid
    /// live-in set.
    pub fn update_block(&mut self, func: &mut Function, block: BlockId) -> AnalysisResult<()> {
        self.scan_block(func, block.index())?;
        if self.mode == LivenessMode::Intervals {
            self.add_block_intervals(func, block.index());
        }
        Ok(())
    }

    /// One transfer-function evaluation: recomputes the block's live-out
    /// from its successors, scans instructions back to front, and reports
    /// whether the live-in set grew.
    fn scan_block(&mut self, func: &mut Function, bi: usize) -> AnalysisResult<bool> {
        let block_id = BlockId(bi as u32);
        let num_globals = self.num_globals;
        let num_vars = num_globals + self.nodes[bi].live_to_var.len();
        let intervals = self.mode == LivenessMode::Intervals;

        let mut live = FixedBitSet::with_capacity(num_vars);

        // Live-out is the union of the successors' live-in sets; operands
        // routed along an edge into a successor phi are live out of this
        // block even though the phi itself is not scanned here.
        let out_edges: SmallVec<[BlockId; 2]> =
            SmallVec::from_slice(func.block(block_id).out_edges());
        let mut foreign_phi_operand: Option<VarId> = None;
        for &succ in &out_edges {
            live.union_with(&self.nodes[succ.index()].live_in);
            for phi in func.block(succ).phis() {
                if phi.is_deleted() || phi.is_dead() {
                    continue;
                }
                if let Some(Operand::Var(v)) = phi.phi_operand_for(block_id) {
                    match self.var_to_live[v.index()] {
                        UNTRACKED => {}
                        li if li < num_vars => {
                            live.insert(li);
                        }
                        // A local of some other block routed along this
                        // edge: the classification is broken.
                        _ => foreign_phi_operand = Some(v),
                    }
                }
            }
        }
        if let Some(v) = foreign_phi_operand {
            let err = AnalysisError::LivenessInconsistency {
                block: bi,
                var: v.index(),
            };
            func.set_error(&err.to_string());
            return Err(err);
        }
        self.nodes[bi].live_out = truncate_bits(&live, num_globals);

        if intervals {
            let node = &mut self.nodes[bi];
            node.live_begin.clear();
            node.live_end.clear();
            for _ in 0..num_vars {
                node.live_begin.push(Inst::NUMBER_SENTINEL);
                node.live_end.push(Inst::NUMBER_SENTINEL);
            }
        }

        let mut leaked_local: Option<VarId> = None;
        {
            let var_to_live = &self.var_to_live;
            let node = &mut self.nodes[bi];
            let block = func.block_mut(block_id);

            // Regular instructions in reverse order.
            for inst in block.insts.iter_mut().rev() {
                if inst.is_deleted() {
                    continue;
                }
                let n = inst.number();
                inst.set_dead(false);
                if let Some(dest) = inst.dest() {
                    let li = var_to_live[dest.index()];
                    if li != UNTRACKED {
                        if live.contains(li) {
                            if !inst.dest_redefined() {
                                live.set(li, false);
                                if intervals {
                                    node.live_begin[li] = n;
                                }
                            }
                        } else if !inst.has_side_effects() {
                            // No use below: tentatively dead, sources are
                            // not scanned so they can die with it.
                            inst.set_dead(true);
                            continue;
                        }
                    }
                }
                for src in inst.srcs() {
                    if let Operand::Var(v) = src {
                        let li = var_to_live[v.index()];
                        if li == UNTRACKED {
                            continue;
                        }
                        if !live.contains(li) {
                            live.insert(li);
                            // A lowered two-address sequence can end the
                            // same range twice; the latest use wins, so
                            // the end is only recorded once.
                            if intervals && node.live_end[li] == Inst::NUMBER_SENTINEL {
                                node.live_end[li] = n;
                            }
                        }
                    }
                }
            }

            // Phis in forward order, all sharing the earliest phi number
            // so their destinations begin together at the block top.
            let mut first_phi_number = Inst::NUMBER_SENTINEL;
            for phi in block.phis.iter_mut() {
                if phi.is_deleted() {
                    continue;
                }
                if first_phi_number == Inst::NUMBER_SENTINEL {
                    first_phi_number = phi.number();
                }
                phi.set_dead(false);
                if let Some(dest) = phi.dest() {
                    let li = var_to_live[dest.index()];
                    if li != UNTRACKED {
                        if live.contains(li) {
                            live.set(li, false);
                            if intervals {
                                node.live_begin[li] = first_phi_number;
                            }
                        } else {
                            phi.set_dead(true);
                        }
                    }
                }
                // Phi sources become live in the predecessors, not here.
            }

            // With the sparse numbering, only global bits may survive to
            // the block boundary. Non-global arguments are allowed to be
            // live into the entry block.
            if bi != 0 {
                for li in live.ones() {
                    if li >= num_globals {
                        leaked_local = Some(node.live_to_var[li - num_globals]);
                        break;
                    }
                }
            }
        }
        if let Some(v) = leaked_local {
            let err = AnalysisError::LivenessInconsistency {
                block: bi,
                var: v.index(),
            };
            func.set_error(&err.to_string());
            return Err(err);
        }

        let mut new_in = truncate_bits(&live, num_globals);
        new_in.union_with(&self.nodes[bi].live_in);
        if new_in != self.nodes[bi].live_in {
            self.nodes[bi].live_in = new_in;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Intervals postprocess for one block: commit tentative deletions,
    /// then turn the recorded begin/end positions into live-range
    /// segments.
    fn add_block_intervals(&mut self, func: &mut Function, bi: usize) {
        let num_globals = self.num_globals;

        let mut first = Inst::NUMBER_SENTINEL;
        let mut last = Inst::NUMBER_SENTINEL;
        {
            let block = func.block_mut(BlockId(bi as u32));
            for inst in block.phis.iter_mut().chain(block.insts.iter_mut()) {
                inst.delete_if_dead();
                if inst.is_deleted() {
                    continue;
                }
                if first == Inst::NUMBER_SENTINEL {
                    first = inst.number();
                }
                debug_assert!(inst.number() > last);
                last = inst.number();
            }
        }
        if bi == 0 {
            // Arguments are implicitly defined before the first
            // instruction. Anchoring the entry block one pseudo-slot
            // earlier turns an argument's would-be trivial range at the
            // first instruction into a real interval, so two such
            // arguments still interfere.
            first = Inst::NUMBER_EXTENDED;
        }

        let node = &self.nodes[bi];
        let num_vars = num_globals + node.live_to_var.len();
        debug_assert_eq!(node.live_begin.len(), num_vars);
        let mut additions: Vec<(VarId, InstNumber, InstNumber)> = Vec::new();
        for li in 0..num_vars {
            let is_global = li < num_globals;
            let begin = node.live_begin[li];
            let end = node.live_end[li];
            let live_in = is_global && node.live_in.contains(li);
            let live_out = is_global && node.live_out.contains(li);
            let var = if is_global {
                self.live_to_var_global[li]
            } else {
                node.live_to_var[li - num_globals]
            };
            if live_in && live_out && end != Inst::NUMBER_SENTINEL && begin > end {
                // Live across the block but with a hole in the middle:
                // the last use comes before the redefinition. Typical for
                // phi-lowered assignments around a loopback edge.
                additions.push((var, first, end));
                additions.push((var, begin, last + 1));
                continue;
            }
            let mut b = if live_in { first } else { begin };
            let mut e = if live_out { last + 1 } else { end };
            if b == Inst::NUMBER_SENTINEL && e == Inst::NUMBER_SENTINEL {
                continue;
            }
            if b <= first {
                b = first;
            }
            if e == Inst::NUMBER_SENTINEL {
                e = last + 1;
            }
            additions.push((var, b, e));
        }
        for (var, s, e) in additions {
            func.var_mut(var).add_live_range(s, e, 1);
        }
    }
}

/// Copy of the first `len` bits of `bits`.
fn truncate_bits(bits: &FixedBitSet, len: usize) -> FixedBitSet {
    let mut out = FixedBitSet::with_capacity(len);
    for i in bits.ones() {
        if i >= len {
            break;
        }
        out.insert(i);
    }
    out
}

/// Traverses every operand of every non-deleted instruction and verifies
/// that it appears within its variable's computed live range: a
/// destination must begin its range at the defining instruction (unless it
/// opens the block or is a flagged redefinition) and every source must be
/// covered at its use. Inconsistencies are internal defects; they are
/// logged and reported by the return value, meant for debug builds and
/// tests rather than production control flow.
pub fn validate_liveness(func: &Function) -> bool {
    let mut valid = true;
    for block in func.blocks() {
        let mut first = true;
        for inst in block.insts() {
            if inst.is_deleted() {
                continue;
            }
            let n = inst.number();
            if let Some(dest) = inst.dest() {
                let var = func.var(dest);
                if !var.ignore_liveness() {
                    let range = var.live_range();
                    let mut bad = !range.contains_value(n, true);
                    // The definition must actually begin the range. The
                    // first instruction of a block is exempt: a phi
                    // temporary live out of a predecessor may be
                    // reassigned here and the adjacent segments merge.
                    if !first && !inst.dest_redefined() && range.contains_value(n - 1, true) {
                        bad = true;
                    }
                    if bad {
                        log::error!(
                            "liveness error: inst {} dest {} live range {}",
                            n,
                            var.name(),
                            range
                        );
                        valid = false;
                    }
                }
            }
            for src in inst.srcs() {
                if let Operand::Var(v) = src {
                    let var = func.var(*v);
                    if !var.ignore_liveness() && !var.live_range().contains_value(n, false) {
                        log::error!(
                            "liveness error: inst {} src {} live range {}",
                            n,
                            var.name(),
                            var.live_range()
                        );
                        valid = false;
                    }
                }
            }
            first = false;
        }
    }
    valid
}
