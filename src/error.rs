//! TransferError: unified error type for mesh-transfer public APIs.
//!
//! Every fallible public operation in this crate returns `TransferError`.
//! Errors are grouped by the stage that detects them: argument validation
//! (before any communication), invariants caught mid-pipeline, communication
//! faults, and solver outcomes. All of them are fatal to the transfer in
//! progress; missed target points are *not* errors and are reported through
//! [`crate::transfer::SharedDomainMap::missed_target_points`].

use thiserror::Error;

/// Unified error type for mesh-transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A coordinate or field dimension did not match the map's dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A mesh block's arrays disagree about vertex or element counts.
    #[error("ragged mesh block: {context} (expected {expected} entries, got {got})")]
    RaggedBlock {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// A permutation vector is not a bijection on `0..vertices_per_element`.
    #[error("invalid vertex permutation for block with {vpe} vertices per element")]
    InvalidPermutation { vpe: usize },

    /// A communication plan was applied to buffers of the wrong size.
    #[error("invalid plan: {context} (expected {expected} items, got {got})")]
    InvalidPlan {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// A point-to-point exchange failed or returned nothing.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },

    /// A received message had an unexpected byte length.
    #[error("buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },

    /// An invalid ordinal escaped into state that must only hold real handles.
    #[error("sentinel ordinal leaked into {context}")]
    SentinelLeak { context: &'static str },

    /// A spatial search structure was queried before any elements were loaded.
    #[error("empty search tree: {context}")]
    EmptyTree { context: &'static str },

    /// An element references a vertex handle that never arrived.
    #[error("unknown vertex handle {handle} in rendezvous connectivity")]
    UnknownVertex { handle: u64 },

    /// A field evaluator returned an array of the wrong size.
    #[error("evaluator returned {got} values, expected {expected}")]
    EvaluatorSizeMismatch { expected: usize, got: usize },

    /// The iterative solver exhausted its iteration budget.
    #[error("solver did not converge after {iterations} iterations (residual {residual:.3e})")]
    SolverDidNotConverge { iterations: usize, residual: f64 },

    /// A peer rank reported a failure during a collective stage.
    #[error("collective stage '{stage}' failed on a peer rank")]
    PeerFailure { stage: &'static str },

    /// No rank in the communicator carries the named participant.
    #[error("no rank carries a {role}")]
    MissingParticipant { role: &'static str },

    /// Operation requires state that was not requested at construction.
    #[error("{0} was not enabled when this map was constructed")]
    NotEnabled(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransferError>;
