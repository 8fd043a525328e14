//! Error types for the solver.

use thiserror::Error;

/// Errors that can occur while building or running a solver.
///
/// Only `InvalidInput` escapes to callers at construction time; numerical
/// failures during a solve are recovered locally where possible and
/// otherwise surface as a [`crate::problem::SolveStatus`] on the result,
/// never as an `Err`.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Problem or option validation failed (unknown integrator, negative
    /// step size, dimension mismatch, unknown option key, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A dynamics or cost evaluation produced NaN/Inf outside the line
    /// search (where non-finite values are handled by step rejection)
    #[error("Non-finite value encountered: {0}")]
    NonFinite(String),

    /// Internal solver error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
