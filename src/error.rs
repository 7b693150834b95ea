//! The error type shared by every module.

use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while building or combining finite structures.
#[derive(Debug, Error)]
pub enum AlgebraError {
    /// The operation/relation tables do not cover the declared signature.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Two objects of different signatures (or different owning algebras) were combined.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A function was called with the wrong number of arguments.
    #[error("arity violation: expected {expected} arguments, found {found}")]
    ArityViolation {
        /// Arity of the function.
        expected: usize,
        /// Number of arguments given.
        found: usize,
    },

    /// A function was evaluated outside of its domain.
    #[error("{0} is outside the domain of the function")]
    DomainMiss(String),

    /// An element that does not belong to the carrier at hand.
    #[error("element {0} is not part of the universe")]
    UnknownElement(String),

    /// A relation handed in as a congruence is not compatible with the operations.
    #[error("relation is not compatible with operation `{0}`")]
    Incompatible(String),

    /// The inverse of a homomorphism was requested but the map is not injective.
    #[error("the inverse of a non-injective homomorphism is not a function")]
    NonInjectiveInverse,

    /// Diagnostic output of the external solver, verbatim.
    #[error("solver error:\n{0}")]
    Solver(String),

    /// The external solver did not answer within the configured bound.
    #[error("solver did not finish within {0:?}")]
    SolverTimeout(Duration),

    /// Syntax error in a model file.
    #[error("line {line}: {message}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// What the parser expected.
        message: String,
    },

    /// Reading or writing a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AlgebraError>;
