// This module implements the Function, the single owner of everything the
// analysis core touches: the ordered block list (the first block is the
// designated entry), the variable arena, the monotonically assigned
// instruction-number counter, and the function-level error flag. Blocks and
// variables are addressed by stable dense indices instead of pointers, so
// every cross-reference (successor lists, phi incoming-edge lists) is an
// index into a function-owned arena. The edge pass recomputes successors
// from terminators, prunes blocks unreachable from the entry with a dense
// reindex of the survivors, and derives predecessor lists; a structural phi
// check runs right after it to catch incoming-edge lists that disagree with
// the actual predecessor set.

//! Function: block and variable arenas, edges, numbering, errors.

use fixedbitset::FixedBitSet;

use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::block::Block;
use crate::ir::inst::Inst;
use crate::ir::live_range::InstNumber;
use crate::ir::operand::Variable;
use crate::ir::types::Type;
use crate::ir::{BlockId, VarId};

/// A single function under analysis.
///
/// Created once per source function, mutated in place by every pass, and
/// dropped after code emission.
#[derive(Debug)]
pub struct Function {
    name: String,
    blocks: Vec<Block>,
    variables: Vec<Variable>,
    args: Vec<VarId>,
    next_inst_number: InstNumber,
    error: Option<String>,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Function {
            name: name.to_string(),
            blocks: Vec::new(),
            variables: Vec::new(),
            args: Vec::new(),
            next_inst_number: Inst::NUMBER_INITIAL,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a new block and returns its id. The first block made is the
    /// entry block.
    pub fn make_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id, name));
        id
    }

    /// Creates a new variable. Indices are dense, stable and never reused.
    pub fn make_variable(&mut self, ty: Type, name: &str) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable::new(id, ty, name));
        id
    }

    /// Registers `var` as a function argument. Arguments are modeled as
    /// implicitly defined before the entry block's first instruction.
    pub fn add_arg(&mut self, var: VarId) {
        self.variables[var.index()].set_is_arg();
        self.args.push(var);
    }

    pub fn args(&self) -> &[VarId] {
        &self.args
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    /// Hands out the next instruction number. Numbers advance by two so a
    /// pass inserting a copy after renumbering can slot it between two
    /// existing instructions without renumbering the whole function.
    pub fn new_inst_number(&mut self) -> InstNumber {
        let n = self.next_inst_number;
        self.next_inst_number += 2;
        n
    }

    /// Appends `inst` to `block` with a fresh number. A phi appended after
    /// regular instructions sets the function error flag.
    pub fn append_inst(&mut self, block: BlockId, mut inst: Inst) {
        inst.set_number(self.new_inst_number());
        if let Err(e) = self.blocks[block.index()].append_inst(inst) {
            self.set_error(&e.to_string());
        }
    }

    /// Renumbers the non-deleted instructions of every block, phis first,
    /// in preparation for live range analysis. Instruction numbers within a
    /// block are monotonically increasing, and the number ranges of
    /// distinct blocks do not overlap.
    pub fn renumber_instructions(&mut self) {
        self.next_inst_number = Inst::NUMBER_INITIAL;
        for bi in 0..self.blocks.len() {
            self.renumber_block(BlockId(bi as u32));
        }
    }

    /// Renumbers one block with fresh numbers from the function counter.
    /// Used for blocks synthesized by edge splitting, whose numbers must
    /// land above every existing block's range.
    pub fn renumber_block(&mut self, block: BlockId) {
        let mut next = self.next_inst_number;
        let b = &mut self.blocks[block.index()];
        for inst in b.phis.iter_mut().chain(b.insts.iter_mut()) {
            if inst.is_deleted() {
                inst.set_number(Inst::NUMBER_DELETED);
            } else {
                inst.set_number(next);
                next += 2;
            }
        }
        self.next_inst_number = next;
    }

    /// Recomputes successor edges from terminators, prunes blocks
    /// unreachable from the entry (reindexing the survivors densely), and
    /// derives predecessor edges. Idempotent once the graph is stable.
    ///
    /// Pruning remaps every stored block id; single-block variable
    /// classifications become stale, so the metadata pass must run again
    /// before the next liveness pass.
    pub fn compute_edges(&mut self) -> AnalysisResult<()> {
        if self.blocks.is_empty() {
            self.set_error("function has no blocks");
            return Err(AnalysisError::EmptyFunction);
        }
        for b in &mut self.blocks {
            if let Err(e) = b.compute_successors() {
                self.error = Some(e.to_string());
                return Err(e);
            }
        }

        // Mark everything reachable from the entry.
        let n = self.blocks.len();
        let mut reachable = FixedBitSet::with_capacity(n);
        let mut pending = vec![0usize];
        reachable.insert(0);
        while let Some(i) = pending.pop() {
            for &succ in self.blocks[i].out_edges() {
                if !reachable.put(succ.index()) {
                    pending.push(succ.index());
                }
            }
        }

        // Compact the survivors and build the old-to-new index map.
        let mut old_to_new: Vec<Option<BlockId>> = vec![None; n];
        let mut kept = Vec::with_capacity(n);
        for (old, block) in self.blocks.drain(..).enumerate() {
            if reachable.contains(old) {
                old_to_new[old] = Some(BlockId(kept.len() as u32));
                kept.push(block);
            } else {
                log::debug!("pruning unreachable block {}", block.name());
            }
        }
        self.blocks = kept;

        // Remap stored block ids: branch targets and phi incoming edges.
        // A phi operand arriving from a pruned predecessor has lost its
        // edge and is dropped with it.
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.reset_index(BlockId(i as u32));
            for inst in block.insts.iter_mut() {
                if let Some(targets) = inst.branch_targets_mut() {
                    for t in targets.iter_mut() {
                        // Reachable blocks only branch to reachable blocks.
                        debug_assert!(old_to_new[t.index()].is_some());
                        if let Some(new) = old_to_new[t.index()] {
                            *t = new;
                        }
                    }
                }
            }
            for phi in block.phis.iter_mut() {
                let keep: Vec<bool> = match phi.phi_preds_mut() {
                    Some(preds) => preds
                        .iter()
                        .map(|p| old_to_new[p.index()].is_some())
                        .collect(),
                    None => continue,
                };
                phi.retain_phi_args(&keep);
                if let Some(preds) = phi.phi_preds_mut() {
                    for p in preds.iter_mut() {
                        if let Some(new) = old_to_new[p.index()] {
                            *p = new;
                        }
                    }
                }
            }
        }

        // Successor lists still hold old ids; rebuild them from the
        // remapped terminators, then derive the in-edges.
        for b in &mut self.blocks {
            b.compute_successors()?;
            b.in_edges.clear();
        }
        let mut edges = Vec::new();
        for (i, b) in self.blocks.iter().enumerate() {
            for &succ in b.out_edges() {
                edges.push((succ.index(), BlockId(i as u32)));
            }
        }
        for (succ, pred) in edges {
            self.blocks[succ].in_edges.push(pred);
        }
        Ok(())
    }

    /// Structural check run right after [`Function::compute_edges`]: every
    /// non-deleted phi must carry exactly one operand per actual
    /// predecessor edge.
    pub fn validate_phis(&mut self) -> AnalysisResult<()> {
        for block in &self.blocks {
            for phi in block.phis() {
                if phi.is_deleted() {
                    continue;
                }
                let want = block.in_edges().len();
                let have = phi.phi_arity();
                let complete = have == want
                    && block
                        .in_edges()
                        .iter()
                        .all(|&p| phi.phi_operand_for(p).is_some());
                if !complete {
                    let err = AnalysisError::PhiPredecessorMismatch {
                        block: block.index().index(),
                        have,
                        want,
                    };
                    self.error = Some(err.to_string());
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn set_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
