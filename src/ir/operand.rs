// This module declares the operand model of the analysis core: the Operand
// sum type over the value kinds an instruction can read, and Variable, the
// register- or stack-allocatable operand that liveness analysis tracks.
// Every Variable carries a unique dense index assigned at creation and never
// reused, its type (only the width matters here), the multiblock
// classification supplied by the metadata pass together with the owning
// block for single-block variables, an ignore-liveness flag for fixed
// physical storage aliases, an allocation weight, and the LiveRange the
// liveness engine fills in. Constants are plain values rather than a pooled
// hierarchy; the core never interprets them.

//! Operands and variables.

use crate::ir::live_range::{InstNumber, LiveRange, RegWeight};
use crate::ir::types::Type;
use crate::ir::{BlockId, VarId};

/// A value an instruction reads. Closed set: the core matches exhaustively
/// instead of downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A register- or stack-allocated variable.
    Var(VarId),
    /// An integer constant. The core never interprets the payload.
    ConstInt(i64),
    /// An unspecified bit pattern. Backends keep code generation
    /// deterministic by materializing undef as zero.
    Undef,
}

impl Operand {
    pub fn as_var(self) -> Option<VarId> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }
}

/// An operand that is register- or stack-allocated.
#[derive(Debug)]
pub struct Variable {
    index: VarId,
    ty: Type,
    name: String,
    is_arg: bool,
    /// Ignored when constructing and validating live ranges. Usually
    /// reserved for fixed physical storage such as the stack pointer.
    ignore_liveness: bool,
    /// Whether the variable is defined or used in more than one block.
    /// Supplied by [`compute_multiblock`](crate::ir::compute_multiblock)
    /// and stable for the duration of one liveness pass.
    multiblock: bool,
    /// Owning block when the variable is single-block, `None` otherwise.
    home_block: Option<BlockId>,
    weight: RegWeight,
    live: LiveRange,
}

impl Variable {
    pub(crate) fn new(index: VarId, ty: Type, name: &str) -> Self {
        Variable {
            index,
            ty,
            name: name.to_string(),
            is_arg: false,
            ignore_liveness: false,
            multiblock: false,
            home_block: None,
            weight: RegWeight::new(1),
            live: LiveRange::new(),
        }
    }

    pub fn index(&self) -> VarId {
        self.index
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Returns the name the variable was created with, or a synthesized
    /// unique one.
    pub fn name(&self) -> String {
        if self.name.is_empty() {
            format!("__{}", self.index.0)
        } else {
            self.name.clone()
        }
    }

    pub fn is_arg(&self) -> bool {
        self.is_arg
    }

    pub(crate) fn set_is_arg(&mut self) {
        self.is_arg = true;
    }

    pub fn ignore_liveness(&self) -> bool {
        self.ignore_liveness
    }

    pub fn set_ignore_liveness(&mut self) {
        self.ignore_liveness = true;
    }

    pub fn is_multiblock(&self) -> bool {
        self.multiblock
    }

    pub fn home_block(&self) -> Option<BlockId> {
        self.home_block
    }

    /// Installs the classification computed by the metadata pass. The
    /// classification must not change while a liveness pass is running.
    pub fn set_classification(&mut self, multiblock: bool, home_block: Option<BlockId>) {
        self.multiblock = multiblock;
        self.home_block = if multiblock { None } else { home_block };
    }

    pub fn weight(&self) -> RegWeight {
        self.weight
    }

    pub fn set_weight(&mut self, weight: RegWeight) {
        self.weight = weight;
    }

    pub fn set_weight_infinite(&mut self) {
        self.weight = RegWeight::INF;
    }

    pub fn live_range(&self) -> &LiveRange {
        &self.live
    }

    pub fn live_range_mut(&mut self) -> &mut LiveRange {
        &mut self.live
    }

    pub fn reset_live_range(&mut self) {
        self.live.reset();
    }

    /// Adds a segment and accumulates `weight_delta` scaled by the
    /// variable's own weight. An infinite variable weight makes the range
    /// weight infinite.
    pub fn add_live_range(&mut self, start: InstNumber, end: InstNumber, weight_delta: u32) {
        debug_assert!(!RegWeight::new(weight_delta).is_inf());
        self.live.add_segment(start, end);
        if self.weight.is_inf() {
            self.live.set_weight(RegWeight::INF);
        } else {
            self.live
                .add_weight(RegWeight::new(weight_delta.saturating_mul(self.weight.value())));
        }
    }
}
