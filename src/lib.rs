//! Back-end analysis core of a function-at-a-time native-code compiler.
//!
//! The crate owns the control-flow graph of a single function and computes
//! the analyses that feed register allocation and code emission:
//!
//! - [`ir`] - the CFG data model: [`Function`], [`Block`], [`Variable`],
//!   instructions, and [`LiveRange`]
//! - [`liveness`] - sparse global/local liveness with a backward dataflow
//!   fixed point and live-range construction
//! - [`phi_lowering`] - phi elimination, either naive copy insertion or
//!   edge splitting with parallel-copy resolution
//! - [`loop_depth`] - per-block loop nesting depth via repeated SCC
//!   decomposition
//!
//! # Primary usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use cfg_liveness_core::{compute_multiblock, Liveness, LivenessMode};
//!
//! // The CFG builder has filled in `func` (possibly with phis).
//! func.compute_edges()?;
//! func.validate_phis()?;
//! cfg_liveness_core::lower_phis_naive(&mut func);
//! func.renumber_instructions();
//! compute_multiblock(&mut func);
//!
//! let arena = Bump::new();
//! let mut live = Liveness::new(&arena, &mut func, LivenessMode::Intervals)?;
//! live.run(&mut func)?;
//! // Register allocation reads Variable::live_range() and the engine's
//! // live-in/live-out sets from here on.
//! ```
//!
//! Every pass operates on exactly one exclusively-owned [`Function`] at a
//! time and runs to completion synchronously; failures set the function's
//! error flag and surface as [`AnalysisError`].

pub mod error;
pub mod ir;
pub mod liveness;
pub mod loop_depth;
pub mod phi_lowering;

pub use error::{AnalysisError, AnalysisResult};
pub use ir::{
    compute_multiblock, Block, BlockId, Function, Inst, InstKind, InstNumber, LiveRange, Operand,
    RegWeight, Type, VarId, Variable,
};
pub use liveness::{validate_liveness, Liveness, LivenessMode};
pub use loop_depth::compute_loop_nest_depth;
pub use phi_lowering::{
    delete_phis, lower_phis_advanced, lower_phis_naive, place_phi_loads, place_phi_stores,
    DefaultPhiHooks, PhiLoweringHooks,
};
