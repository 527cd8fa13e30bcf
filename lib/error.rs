//! Error types for the crate.

use thiserror::Error;

/// All fatal conditions of the simulation pipeline.
///
/// Configuration variants are produced eagerly, before any numerical work;
/// the run-time variants abort the run with no partial result.
#[derive(Debug, Error)]
pub enum EPError {
    /// Eigensolver failure from the underlying LAPACK call.
    #[error("eigensolver error: {0}")]
    Eig(#[from] ndarray_linalg::error::LinalgError),

    /// The adaptive integrator could not meet tolerance.
    #[error("ODE convergence error: step size underflow at t = {t:.6e}")]
    OdeConvergence {
        /// Time at which the step size underflowed.
        t: f64,
    },

    #[error("unrecognized initial state '{0}': expected 'a', 'b', 'c', or 'd'")]
    InvalidInitState(String),

    #[error("unrecognized sorting method '{0}': expected 'gain' or 'energy'")]
    InvalidSortMethod(String),

    #[error("unrecognized loop type '{0}': expected 'circle' or 'ellipse'")]
    InvalidLoopType(String),

    #[error("unrecognized loop direction '{0}': expected '+' or '-'")]
    InvalidLoopDirection(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

pub type EPResult<T> = Result<T, EPError>;
