//! Error types for structured matrix operations.

use thiserror::Error;

/// Errors raised while constructing or applying a structured matrix.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    /// Operand dimensions are incompatible with the matrix shape.
    #[error("shape mismatch in {operation}: expected dimension {expected}, got {found}")]
    ShapeMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },

    /// An operand violates the capability a constructor requires, e.g. a
    /// non-square array passed to a square matrix or a non-positive diagonal
    /// passed to a positive-definite one.
    #[error("category mismatch: {0}")]
    CategoryMismatch(String),

    /// A dense factorization (LU, Cholesky, eigendecomposition, triangular
    /// solve) rejected its input.
    #[error("factorization failed: {0}")]
    Factorization(String),

    /// The operation needs an explicit size but the matrix shape is implicit.
    #[error("operation requires a matrix with an explicit shape")]
    UnknownShape,
}

pub type Result<T> = std::result::Result<T, MatrixError>;

impl MatrixError {
    pub(crate) fn not_square(rows: usize, cols: usize) -> Self {
        MatrixError::CategoryMismatch(format!("array with shape ({rows}, {cols}) is not square"))
    }
}
