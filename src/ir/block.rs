// This module implements the basic block, including the complexities of
// instruction insertion and edge derivation. A block keeps its phi
// instructions in a separate list from the regular instructions so the
// analyses can treat the two phases of a block independently, and validates
// that all phis are appended before any regular instruction. Successor
// edges are the source of truth and are recomputed from the terminator;
// predecessor edges are always derived from successors by the function-wide
// edge pass and must be rebuilt whenever successors change.

//! Basic blocks.

use smallvec::SmallVec;

use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::inst::{Inst, InstKind};
use crate::ir::BlockId;

/// A basic block: a maximal straight-line instruction sequence with one
/// entry and one exit.
#[derive(Debug)]
pub struct Block {
    /// Position in the function's block list. Reassigned whenever blocks
    /// are pruned or reordered.
    index: BlockId,
    name: String,
    /// Phi instructions, conceptually unordered.
    pub(crate) phis: Vec<Inst>,
    /// Regular instructions in execution order; the last non-deleted one is
    /// the terminator.
    pub(crate) insts: Vec<Inst>,
    /// Derived from the terminator by `Function::compute_edges`.
    pub(crate) out_edges: SmallVec<[BlockId; 2]>,
    /// Derived from all successor sets by `Function::compute_edges`.
    pub(crate) in_edges: SmallVec<[BlockId; 2]>,
    pub(crate) has_return: bool,
    /// Set on blocks synthesized by edge splitting; read by the block
    /// ordering passes downstream of this core.
    pub(crate) needs_placement: bool,
    /// Number of nested loops enclosing this block, written by the loop
    /// nest analyzer.
    pub(crate) loop_nest_depth: u32,
}

impl Block {
    pub(crate) fn new(index: BlockId, name: &str) -> Self {
        Block {
            index,
            name: name.to_string(),
            phis: Vec::new(),
            insts: Vec::new(),
            out_edges: SmallVec::new(),
            in_edges: SmallVec::new(),
            has_return: false,
            needs_placement: false,
            loop_nest_depth: 0,
        }
    }

    pub fn index(&self) -> BlockId {
        self.index
    }

    pub(crate) fn reset_index(&mut self, index: BlockId) {
        self.index = index;
    }

    /// Returns the name the block was created with, or a synthesized
    /// unique one.
    pub fn name(&self) -> String {
        if self.name.is_empty() {
            format!("__{}", self.index.0)
        } else {
            self.name.clone()
        }
    }

    pub fn phis(&self) -> &[Inst] {
        &self.phis
    }

    pub fn phis_mut(&mut self) -> &mut [Inst] {
        &mut self.phis
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn insts_mut(&mut self) -> &mut [Inst] {
        &mut self.insts
    }

    pub fn out_edges(&self) -> &[BlockId] {
        &self.out_edges
    }

    pub fn in_edges(&self) -> &[BlockId] {
        &self.in_edges
    }

    pub fn has_return(&self) -> bool {
        self.has_return
    }

    pub fn needs_placement(&self) -> bool {
        self.needs_placement
    }

    pub fn set_needs_placement(&mut self, value: bool) {
        self.needs_placement = value;
    }

    pub fn loop_nest_depth(&self) -> u32 {
        self.loop_nest_depth
    }

    /// Whether the block still carries any non-deleted phi instruction.
    pub fn has_live_phis(&self) -> bool {
        self.phis.iter().any(|p| !p.is_deleted())
    }

    /// Adds an instruction to either the phi list or the regular list,
    /// validating that all phis come before all regular instructions.
    pub(crate) fn append_inst(&mut self, inst: Inst) -> AnalysisResult<()> {
        if inst.is_phi() {
            if !self.insts.is_empty() {
                return Err(AnalysisError::MisplacedPhi {
                    block: self.index.index(),
                });
            }
            self.phis.push(inst);
        } else {
            if matches!(inst.kind(), InstKind::Ret) {
                self.has_return = true;
            }
            self.insts.push(inst);
        }
        Ok(())
    }

    /// Recomputes the successor set from the terminator.
    pub(crate) fn compute_successors(&mut self) -> AnalysisResult<()> {
        let term = self
            .insts
            .iter()
            .rev()
            .find(|i| !i.is_deleted())
            .and_then(|i| i.terminator_edges())
            .ok_or(AnalysisError::MissingTerminator {
                block: self.index.index(),
            })?;
        self.out_edges = SmallVec::from_slice(term);
        Ok(())
    }

    /// Index of the terminator in the regular instruction list.
    pub(crate) fn terminator_position(&self) -> Option<usize> {
        self.insts
            .iter()
            .rposition(|i| !i.is_deleted() && i.is_terminator())
    }
}
