// This module computes the per-variable classification the liveness engine
// keys its sparse numbering on: whether a variable is referenced from more
// than one block, and for single-block variables, which block owns them.
// Function arguments are always considered multiblock because they are live
// coming into the entry block. Phi destinations and phi sources are
// likewise always multiblock: a source is consumed on a control-flow edge
// and therefore live out of its predecessor, and lowering turns the
// destination's single SSA definition into assignments spread over
// predecessor or edge-split blocks. Keeping both global means the
// classification stays valid while the advanced lowering updates an
// existing liveness solution incrementally.

//! Variable classification metadata.

use crate::ir::{BlockId, Function, Operand, VarId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum MultiBlockState {
    Unknown,
    SingleBlock(BlockId),
    MultiBlock,
}

/// Recomputes every variable's multiblock flag and home block from the
/// current, non-deleted instructions. Must run after
/// [`Function::compute_edges`] and before a liveness pass; stale
/// classifications from before a CFG mutation are not patched up.
pub fn compute_multiblock(func: &mut Function) {
    let mut state = vec![MultiBlockState::Unknown; func.num_variables()];

    let mark = |state: &mut Vec<MultiBlockState>, var: VarId, block: BlockId| {
        let s = &mut state[var.index()];
        *s = match *s {
            MultiBlockState::Unknown => MultiBlockState::SingleBlock(block),
            MultiBlockState::SingleBlock(b) if b == block => MultiBlockState::SingleBlock(b),
            _ => MultiBlockState::MultiBlock,
        };
    };

    for &arg in func.args() {
        state[arg.index()] = MultiBlockState::MultiBlock;
    }

    for block in func.blocks() {
        let id = block.index();
        for phi in block.phis() {
            if phi.is_deleted() {
                continue;
            }
            if let Some(dest) = phi.dest() {
                state[dest.index()] = MultiBlockState::MultiBlock;
            }
            for src in phi.srcs() {
                if let Operand::Var(v) = src {
                    state[v.index()] = MultiBlockState::MultiBlock;
                }
            }
        }
        for inst in block.insts() {
            if inst.is_deleted() {
                continue;
            }
            if let Some(dest) = inst.dest() {
                mark(&mut state, dest, id);
            }
            for src in inst.srcs() {
                if let Operand::Var(v) = src {
                    mark(&mut state, *v, id);
                }
            }
        }
    }

    for (i, s) in state.into_iter().enumerate() {
        let var = func.var_mut(VarId(i as u32));
        match s {
            MultiBlockState::MultiBlock => var.set_classification(true, None),
            MultiBlockState::SingleBlock(b) => var.set_classification(false, Some(b)),
            // Never referenced; leave it single-block with no home, the
            // liveness engine will not track it.
            MultiBlockState::Unknown => var.set_classification(false, None),
        }
    }
}
