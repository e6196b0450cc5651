// This module implements phi elimination with two strategies. The naive
// path rewrites each phi through a fresh temporary: the phi's block gets a
// load of the original destination from the temporary, and every
// predecessor gets a store of its incoming value into the temporary. One
// shared temporary per phi is enough because exactly one predecessor
// executes before control reaches the block. The advanced path resolves
// each incoming edge as a parallel assignment: copies are emitted in an
// order where no pending copy still reads an emitted destination, cycles
// (value permutations) are broken by routing one destination through a
// temporary, and any edge needing more than one copy is split with a fresh
// block appended to the end of the block list so positions held by other
// passes stay valid. Wide values and undef operands are resolved through
// narrow target callbacks. The advanced path can fold the new blocks into
// an existing liveness solution incrementally instead of forcing a full
// recomputation.

//! Phi elimination: naive copy insertion and edge splitting.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::error::AnalysisResult;
use crate::ir::{BlockId, Function, Inst, InstNumber, Operand, Type, VarId};
use crate::liveness::Liveness;

/// Target callbacks consumed while materializing phi copies.
pub trait PhiLoweringHooks {
    /// Splits a wide operand into (lo, hi) half-width operands. Returning
    /// `None` keeps the operand whole.
    fn split_wide(
        &mut self,
        func: &mut Function,
        op: Operand,
        ty: Type,
    ) -> Option<(Operand, Operand)>;

    /// Materializes a concrete value for an undefined operand.
    fn materialize_undef(&mut self, func: &mut Function, ty: Type) -> Operand;
}

/// Target-independent defaults: operands are never split, and undef
/// lowers to zero so code generation stays deterministic.
pub struct DefaultPhiHooks;

impl PhiLoweringHooks for DefaultPhiHooks {
    fn split_wide(
        &mut self,
        _func: &mut Function,
        _op: Operand,
        _ty: Type,
    ) -> Option<(Operand, Operand)> {
        None
    }

    fn materialize_undef(&mut self, _func: &mut Function, _ty: Type) -> Operand {
        Operand::ConstInt(0)
    }
}

/// Naive phi elimination: loads, then stores, then deletion. Redundant
/// copies are tolerated; this path serves unoptimized builds. The caller
/// renumbers instructions before the next liveness pass. Running on a
/// phi-free function is a no-op.
pub fn lower_phis_naive(func: &mut Function) {
    place_phi_loads(func);
    place_phi_stores(func);
    delete_phis(func);
}

/// Part 1 of naive lowering: for each phi `a = phi(...)`, create `a_phi`,
/// retarget the phi to define `a_phi`, and prepend `a = a_phi` to the
/// phi's block. Preserves SSA form and must run before
/// [`place_phi_stores`].
pub fn place_phi_loads(func: &mut Function) {
    for bi in 0..func.num_blocks() {
        let block_id = BlockId(bi as u32);
        let dests: Vec<(usize, VarId)> = func
            .block(block_id)
            .phis()
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_deleted())
            .filter_map(|(i, p)| p.dest().map(|d| (i, d)))
            .collect();
        if dests.is_empty() {
            continue;
        }
        let mut loads = Vec::with_capacity(dests.len());
        for (pi, dest) in dests {
            let ty = func.var(dest).ty();
            let name = format!("{}_phi", func.var(dest).name());
            let temp = func.make_variable(ty, &name);
            // Written in every predecessor, read here.
            func.var_mut(temp).set_classification(true, None);
            let n = func.new_inst_number();
            func.block_mut(block_id).phis[pi].set_dest(Some(temp));
            let mut load = Inst::assign(dest, Operand::Var(temp));
            load.set_number(n);
            loads.push(load);
        }
        let block = func.block_mut(block_id);
        let tail = std::mem::take(&mut block.insts);
        block.insts = loads;
        block.insts.extend(tail);
    }
}

/// Part 2 of naive lowering: for every phi in every successor, append the
/// assignment of the incoming operand to the phi's temporary at the end of
/// this block, before the terminator. Takes the destinations out of SSA
/// form.
pub fn place_phi_stores(func: &mut Function) {
    for bi in 0..func.num_blocks() {
        let block_id = BlockId(bi as u32);
        let succs: SmallVec<[BlockId; 2]> =
            SmallVec::from_slice(func.block(block_id).out_edges());
        let mut stores: Vec<Inst> = Vec::new();
        for &succ in &succs {
            for phi in func.block(succ).phis() {
                if phi.is_deleted() {
                    continue;
                }
                let (Some(temp), Some(op)) = (phi.dest(), phi.phi_operand_for(block_id)) else {
                    continue;
                };
                stores.push(Inst::assign(temp, op));
            }
        }
        if stores.is_empty() {
            continue;
        }
        for store in &mut stores {
            let n = func.new_inst_number();
            store.set_number(n);
        }
        let block = func.block_mut(block_id);
        let pos = block.terminator_position().unwrap_or(block.insts.len());
        let tail = block.insts.split_off(pos);
        block.insts.extend(stores);
        block.insts.extend(tail);
    }
}

/// Part 3 of naive lowering: tombstone all phi instructions.
pub fn delete_phis(func: &mut Function) {
    for bi in 0..func.num_blocks() {
        for phi in func.block_mut(BlockId(bi as u32)).phis.iter_mut() {
            phi.set_deleted();
        }
    }
}

/// Advanced phi elimination by edge splitting.
///
/// For every block with phis and every predecessor edge, the incoming
/// values are resolved as a parallel assignment. An edge needing a single
/// copy from a single-successor predecessor gets the copy placed directly
/// in the predecessor; any other edge is split with a fresh block so the
/// copies have a private location. New blocks are appended at the end of
/// the block list and numbered above every existing instruction, so no
/// pass holding block positions or a computed liveness solution is
/// invalidated.
///
/// With `liveness` supplied, the existing Intervals solution is updated in
/// place: moved definitions are patched into the affected live-in/live-out
/// sets and only the new blocks are scanned. Passing `None` and rerunning
/// full liveness afterwards is the slower equivalent, kept as a
/// cross-check. Running on a phi-free function is a no-op.
pub fn lower_phis_advanced(
    func: &mut Function,
    liveness: Option<&mut Liveness<'_>>,
    hooks: &mut dyn PhiLoweringHooks,
) -> AnalysisResult<()> {
    func.validate_phis()?;
    let first_new = func.num_blocks();
    let mut lowered_dests: Vec<(BlockId, Vec<VarId>)> = Vec::new();
    let mut pred_copies: Vec<(BlockId, VarId, Operand, InstNumber)> = Vec::new();
    let mut new_locals: Vec<(VarId, BlockId)> = Vec::new();

    for bi in 0..first_new {
        let target = BlockId(bi as u32);
        if !func.block(target).has_live_phis() {
            continue;
        }
        let preds: SmallVec<[BlockId; 2]> =
            SmallVec::from_slice(func.block(target).in_edges());
        let mut dests = Vec::new();
        for phi in func.block(target).phis() {
            if !phi.is_deleted() {
                if let Some(d) = phi.dest() {
                    dests.push(d);
                }
            }
        }

        for &pred in &preds {
            let mut copies: Vec<(VarId, Operand)> = Vec::new();
            for phi in func.block(target).phis() {
                if phi.is_deleted() {
                    continue;
                }
                let Some(dest) = phi.dest() else { continue };
                match phi.phi_operand_for(pred) {
                    Some(Operand::Var(v)) if v == dest => {} // identity copy
                    Some(op) => copies.push((dest, op)),
                    None => debug_assert!(false, "validated phi missing an edge"),
                }
            }
            let mut expanded: Vec<(VarId, Operand)> = Vec::new();
            for (dest, op) in copies {
                expand_copy(func, hooks, dest, op, &mut expanded);
            }
            if expanded.is_empty() {
                continue;
            }
            if expanded.len() == 1 && func.block(pred).out_edges().len() == 1 {
                // A lone copy on a non-critical edge cannot interfere
                // with anything; it goes straight into the predecessor.
                if let Some(&(dest, src)) = expanded.first() {
                    let n = place_copy_in_pred(func, pred, dest, src);
                    pred_copies.push((pred, dest, src, n));
                }
            } else {
                let split = split_edge(func, pred, target);
                log::debug!(
                    "phi lowering: split edge {} -> {} with {} copies",
                    func.block(pred).name(),
                    func.block(target).name(),
                    expanded.len()
                );
                emit_parallel_copies(func, split, target, expanded, &mut new_locals);
            }
        }

        for phi in func.block_mut(target).phis.iter_mut() {
            phi.set_deleted();
        }
        lowered_dests.push((target, dests));
    }

    if let Some(lv) = liveness {
        lv.grow_for_new_blocks(func);
        // Definitions moved out of the phi blocks: the destinations are
        // now live into them.
        for (target, dests) in &lowered_dests {
            for &d in dests {
                lv.mark_live_in(*target, d);
            }
        }
        for &(pred, dest, src, n) in &pred_copies {
            lv.mark_live_out(pred, dest);
            // Defined in the slot before the terminator, live through the
            // block end.
            func.var_mut(dest).add_live_range(n, n + 2, 1);
            // The copy reads one slot below the block range the existing
            // solution recorded for the operand; extend it to cover the
            // read.
            if let Operand::Var(v) = src {
                func.var_mut(v).add_live_range(n, n + 1, 1);
            }
        }
        for &(var, block) in &new_locals {
            lv.register_local(var, block);
        }
        for bi in first_new..func.num_blocks() {
            lv.update_block(func, BlockId(bi as u32))?;
        }
    }
    Ok(())
}

/// Resolves undef through the hooks and splits wide copies into lo/hi
/// halves when the hooks support it.
fn expand_copy(
    func: &mut Function,
    hooks: &mut dyn PhiLoweringHooks,
    dest: VarId,
    src: Operand,
    out: &mut Vec<(VarId, Operand)>,
) {
    let ty = func.var(dest).ty();
    let src = if src == Operand::Undef {
        hooks.materialize_undef(func, ty)
    } else {
        src
    };
    if ty.is_wide() {
        if let Some((dest_lo, dest_hi)) = hooks.split_wide(func, Operand::Var(dest), ty) {
            if let (Some(dl), Some(dh)) = (dest_lo.as_var(), dest_hi.as_var()) {
                if let Some((src_lo, src_hi)) = hooks.split_wide(func, src, ty) {
                    out.push((dl, src_lo));
                    out.push((dh, src_hi));
                    return;
                }
            }
        }
    }
    out.push((dest, src));
}

/// Inserts `dest := src` immediately before `pred`'s terminator, taking
/// the reserved number slot below it. Returns the copy's number.
fn place_copy_in_pred(
    func: &mut Function,
    pred: BlockId,
    dest: VarId,
    src: Operand,
) -> InstNumber {
    let (pos, slot) = {
        let block = func.block(pred);
        match block.terminator_position() {
            Some(p) => (p, block.insts()[p].number() - 1),
            None => (block.insts().len(), Inst::NUMBER_SENTINEL),
        }
    };
    let n = if slot > Inst::NUMBER_SENTINEL {
        slot
    } else {
        func.new_inst_number()
    };
    let mut copy = Inst::assign(dest, src);
    copy.set_number(n);
    func.block_mut(pred).insts.insert(pos, copy);
    n
}

/// Splices a fresh empty block onto the edge `pred -> target` and patches
/// the derived edge lists in place. The new block is appended to the end
/// of the block list and flagged for the placement pass.
fn split_edge(func: &mut Function, pred: BlockId, target: BlockId) -> BlockId {
    let name = format!(
        "{}_{}_split",
        func.block(pred).name(),
        func.block(target).name()
    );
    let split = func.make_block(&name);
    func.block_mut(split).set_needs_placement(true);

    let bl = func.block_mut(pred);
    if let Some(pos) = bl.terminator_position() {
        if let Some(targets) = bl.insts[pos].branch_targets_mut() {
            for t in targets.iter_mut() {
                if *t == target {
                    *t = split;
                }
            }
        }
    }
    for e in bl.out_edges.iter_mut() {
        if *e == target {
            *e = split;
        }
    }
    let sb = func.block_mut(split);
    sb.out_edges.push(target);
    sb.in_edges.push(pred);
    for e in func.block_mut(target).in_edges.iter_mut() {
        if *e == pred {
            *e = split;
        }
    }
    split
}

/// Emits the copies of one edge as a sequentialized parallel assignment
/// into `split`, then terminates the block with a branch to `target`.
///
/// A copy is ready when no pending copy still reads its destination. When
/// nothing is ready the pending copies form a permutation cycle; one
/// destination is saved into a temporary and its readers rerouted, which
/// makes that copy ready.
fn emit_parallel_copies(
    func: &mut Function,
    split: BlockId,
    target: BlockId,
    copies: Vec<(VarId, Operand)>,
    new_locals: &mut Vec<(VarId, BlockId)>,
) {
    let mut reads: HashMap<VarId, usize> = HashMap::new();
    for (_, src) in &copies {
        if let Operand::Var(v) = src {
            *reads.entry(*v).or_insert(0) += 1;
        }
    }
    let mut pending = copies;
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|(d, _)| reads.get(d).copied().unwrap_or(0) == 0);
        match ready {
            Some(i) => {
                let (dest, src) = pending.remove(i);
                if let Operand::Var(v) = src {
                    if let Some(c) = reads.get_mut(&v) {
                        *c -= 1;
                    }
                }
                log::trace!("phi copy: {} <- {:?}", func.var(dest).name(), src);
                func.append_inst(split, Inst::assign(dest, src));
            }
            None => {
                // Permutation cycle; break it through a temporary.
                let Some(&(dest, _)) = pending.first() else { break };
                let ty = func.var(dest).ty();
                let name = format!("{}_tmp", func.var(dest).name());
                let temp = func.make_variable(ty, &name);
                func.var_mut(temp).set_classification(false, Some(split));
                new_locals.push((temp, split));
                log::trace!(
                    "phi cycle: saving {} into {}",
                    func.var(dest).name(),
                    func.var(temp).name()
                );
                func.append_inst(split, Inst::assign(temp, Operand::Var(dest)));
                let mut rerouted = 0usize;
                for (_, src) in pending.iter_mut() {
                    if *src == Operand::Var(dest) {
                        *src = Operand::Var(temp);
                        rerouted += 1;
                    }
                }
                reads.insert(dest, 0);
                reads.insert(temp, rerouted);
            }
        }
    }
    func.append_inst(split, Inst::br(target));
}
