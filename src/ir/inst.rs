// This module declares the instruction model shared by every analysis pass.
// An instruction has a Number used purely as an ordering key within the
// live-range space, a soft-delete flag (tombstoned instructions stay in the
// block for diagnostics but are skipped by every analysis), a tentative
// dead flag the liveness engine maintains, an optional destination variable
// and a list of source operands. The kind is a closed sum type matched
// exhaustively: assignments, generic computations, fake defs and uses that
// anchor liveness without emitting code, branches, returns, and phi
// instructions that carry one operand per predecessor edge. Branches with
// identical targets collapse to an unconditional edge so that there is at
// most one edge between any two blocks.

//! Instructions.

use smallvec::{smallvec, SmallVec};

use crate::ir::live_range::InstNumber;
use crate::ir::operand::Operand;
use crate::ir::{BlockId, VarId};

/// Instruction kind. Closed set over the shapes the analysis core needs;
/// target-specific instructions live behind `Arith`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    /// `dest := src`.
    Assign,
    /// A generic computation producing `dest` from the sources. Stands in
    /// for the target's pure ALU instructions.
    Arith,
    /// Marks `dest` as defined without emitting target code.
    FakeDef,
    /// Keeps its sources alive without emitting target code. Never deleted
    /// as dead.
    FakeUse,
    /// Terminator. One target is an unconditional branch; two targets take
    /// the first when the condition source is non-zero.
    Br { targets: SmallVec<[BlockId; 2]> },
    /// Terminator with no out-edges.
    Ret,
    /// SSA merge: source `i` flows in along the edge from `preds[i]`.
    Phi { preds: SmallVec<[BlockId; 2]> },
}

/// A single instruction.
#[derive(Debug, Clone)]
pub struct Inst {
    number: InstNumber,
    deleted: bool,
    /// Tentatively dead: the last liveness scan saw no use of the
    /// destination. Committed by [`Inst::delete_if_dead`].
    dead: bool,
    dest: Option<VarId>,
    /// The destination carries a value defined by the previous adjacent
    /// instruction, e.g. the second half of a wide value assembled by two
    /// writes. Such a write does not begin a fresh live range.
    dest_redefined: bool,
    srcs: SmallVec<[Operand; 2]>,
    kind: InstKind,
}

impl Inst {
    /// Number of a soft-deleted instruction.
    pub const NUMBER_DELETED: InstNumber = -1;
    /// "Not yet numbered" and the empty begin/end marker of the liveness
    /// tables.
    pub const NUMBER_SENTINEL: InstNumber = 0;
    /// Pseudo-number before the entry block's first instruction; argument
    /// live ranges are extended to it so that two arguments first used by
    /// the first instruction still interfere.
    pub const NUMBER_EXTENDED: InstNumber = 1;
    /// First number handed out when (re)numbering a function.
    pub const NUMBER_INITIAL: InstNumber = 2;

    fn new(kind: InstKind, dest: Option<VarId>, srcs: SmallVec<[Operand; 2]>) -> Self {
        Inst {
            number: Self::NUMBER_SENTINEL,
            deleted: false,
            dead: false,
            dest,
            dest_redefined: false,
            srcs,
            kind,
        }
    }

    pub fn assign(dest: VarId, src: Operand) -> Self {
        Inst::new(InstKind::Assign, Some(dest), smallvec![src])
    }

    pub fn arith(dest: VarId, srcs: &[Operand]) -> Self {
        Inst::new(InstKind::Arith, Some(dest), SmallVec::from_slice(srcs))
    }

    pub fn fake_def(dest: VarId) -> Self {
        Inst::new(InstKind::FakeDef, Some(dest), SmallVec::new())
    }

    pub fn fake_use(srcs: &[Operand]) -> Self {
        Inst::new(InstKind::FakeUse, None, SmallVec::from_slice(srcs))
    }

    pub fn br(target: BlockId) -> Self {
        Inst::new(InstKind::Br { targets: smallvec![target] }, None, SmallVec::new())
    }

    /// Conditional branch; collapses to an unconditional branch when both
    /// targets agree, keeping at most one edge between two blocks.
    pub fn br_cond(cond: Operand, on_true: BlockId, on_false: BlockId) -> Self {
        if on_true == on_false {
            return Inst::br(on_true);
        }
        Inst::new(
            InstKind::Br { targets: smallvec![on_true, on_false] },
            None,
            smallvec![cond],
        )
    }

    pub fn ret(value: Option<Operand>) -> Self {
        let srcs = match value {
            Some(v) => smallvec![v],
            None => SmallVec::new(),
        };
        Inst::new(InstKind::Ret, None, srcs)
    }

    /// An empty phi; fill it in with [`Inst::phi_add_argument`].
    pub fn phi(dest: VarId) -> Self {
        Inst::new(InstKind::Phi { preds: SmallVec::new() }, Some(dest), SmallVec::new())
    }

    /// Appends the operand flowing in along the edge from `pred`.
    pub fn phi_add_argument(&mut self, src: Operand, pred: BlockId) {
        match &mut self.kind {
            InstKind::Phi { preds } => {
                preds.push(pred);
                self.srcs.push(src);
            }
            _ => debug_assert!(false, "phi_add_argument on a non-phi"),
        }
    }

    /// The operand supplied along the edge from `pred`, if this is a phi
    /// that has one.
    pub fn phi_operand_for(&self, pred: BlockId) -> Option<Operand> {
        match &self.kind {
            InstKind::Phi { preds } => preds
                .iter()
                .position(|&p| p == pred)
                .map(|i| self.srcs[i]),
            _ => None,
        }
    }

    /// Number of incoming edges of a phi.
    pub fn phi_arity(&self) -> usize {
        match &self.kind {
            InstKind::Phi { preds } => preds.len(),
            _ => 0,
        }
    }

    pub(crate) fn phi_preds_mut(&mut self) -> Option<&mut SmallVec<[BlockId; 2]>> {
        match &mut self.kind {
            InstKind::Phi { preds } => Some(preds),
            _ => None,
        }
    }

    pub(crate) fn branch_targets_mut(&mut self) -> Option<&mut SmallVec<[BlockId; 2]>> {
        match &mut self.kind {
            InstKind::Br { targets } => Some(targets),
            _ => None,
        }
    }

    /// Drops the phi arguments whose position in `keep` is false, keeping
    /// the predecessor and source lists in lockstep.
    pub(crate) fn retain_phi_args(&mut self, keep: &[bool]) {
        if let InstKind::Phi { preds } = &mut self.kind {
            debug_assert_eq!(keep.len(), preds.len());
            let mut i = 0;
            preds.retain(|_| {
                let k = keep[i];
                i += 1;
                k
            });
            let mut j = 0;
            self.srcs.retain(|_| {
                let k = keep[j];
                j += 1;
                k
            });
        }
    }

    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.kind, InstKind::Br { .. } | InstKind::Ret)
    }

    /// Out-edges contributed by this instruction, or `None` if it is not a
    /// terminator.
    pub fn terminator_edges(&self) -> Option<&[BlockId]> {
        match &self.kind {
            InstKind::Br { targets } => Some(targets),
            InstKind::Ret => Some(&[]),
            _ => None,
        }
    }

    /// Instructions that must not be deleted even when their destination
    /// has no use.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Br { .. } | InstKind::Ret | InstKind::FakeUse
        )
    }

    pub fn number(&self) -> InstNumber {
        self.number
    }

    pub fn set_number(&mut self, number: InstNumber) {
        self.number = number;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self) {
        self.deleted = true;
    }

    /// Deletes the instruction if its tentative dead flag is still set
    /// after liveness analysis.
    pub fn delete_if_dead(&mut self) {
        if self.dead {
            self.deleted = true;
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn set_dead(&mut self, dead: bool) {
        self.dead = dead;
    }

    pub fn dest(&self) -> Option<VarId> {
        self.dest
    }

    pub(crate) fn set_dest(&mut self, dest: Option<VarId>) {
        self.dest = dest;
    }

    pub fn dest_redefined(&self) -> bool {
        self.dest_redefined
    }

    pub fn set_dest_redefined(&mut self) {
        self.dest_redefined = true;
    }

    pub fn srcs(&self) -> &[Operand] {
        &self.srcs
    }
}
