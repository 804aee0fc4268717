use thiserror::Error;

/// Errors produced while setting up or running a Fock matrix build.
#[derive(Debug, Error, PartialEq)]
pub enum FockError {
    #[error("epsilon split must be between 0 and 1, got {0}")]
    EpsilonSplit(f64),
    #[error("epsilon must be finite and non-negative, got {0}")]
    NegativeEpsilon(f64),
    #[error("leaf size must be at least 1")]
    LeafSize,
    #[error("exponent of center {center} must be positive and finite, got {exponent}")]
    InvalidExponent { center: usize, exponent: f64 },
    #[error("center {center} has angular momentum {momentum}, only s and p functions are supported")]
    UnsupportedMomentum { center: usize, momentum: i32 },
    #[error("{what} has length {found}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("density matrix is not symmetric at ({row}, {col})")]
    AsymmetricDensity { row: usize, col: usize },
    #[error("the system has no basis functions")]
    EmptySystem,
    #[error("error budget of square node {node} fell below zero ({remaining:e})")]
    BudgetUnderflow { node: usize, remaining: f64 },
}
