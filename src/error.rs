// This module defines error types for the analysis core using the thiserror
// crate for idiomatic Rust error handling. AnalysisError is the main error
// enum covering the failure scenarios a pass can hit: a function with no
// blocks when liveness is requested, phi instructions whose incoming-edge
// lists disagree with the actual predecessor set, blocks that do not end in
// a terminator, and internal liveness inconsistencies where a single-block
// variable leaks into a block boundary. Each variant carries the context
// (block and variable indices) needed to pin down the offending structure.
// The module also provides AnalysisResult<T> as a convenience alias. Pass
// entry points additionally record failures on the Function's error flag so
// that a caller driving many functions can skip the broken ones without
// unwinding.

//! Error types for the analysis core.

use thiserror::Error;

/// Main error type for the CFG analysis passes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("function has no blocks")]
    EmptyFunction,

    #[error("phi in block {block} has {have} incoming operands but the block has {want} predecessors")]
    PhiPredecessorMismatch {
        block: usize,
        have: usize,
        want: usize,
    },

    #[error("phi instruction added after regular instructions in block {block}")]
    MisplacedPhi { block: usize },

    #[error("block {block} does not end in a terminator instruction")]
    MissingTerminator { block: usize },

    #[error("liveness inconsistency: single-block variable v{var} is live into block {block}")]
    LivenessInconsistency { block: usize, var: usize },
}

/// Result type alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
