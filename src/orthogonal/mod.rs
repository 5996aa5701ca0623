//! Orthogonal matrices and their scalar multiples, inverted by transposition.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{MatrixError, Result};
use crate::traits::{InvertibleMatrix, InvertibleMatrixRef, Matrix, MatrixRef, SquareMatrix};
use crate::utils::{check_lmult, check_rmult, check_square};

/// Square matrix `Q` with `Q Qᵗ = I`. The inverse is the transpose and the
/// determinant has unit magnitude.
///
/// Orthogonality of the array is a precondition and is not verified.
#[derive(Debug, Clone)]
pub struct OrthogonalMatrix {
    array: Array2<f64>,
}

impl OrthogonalMatrix {
    pub fn new(array: Array2<f64>) -> Result<Self> {
        check_square(&array)?;
        Ok(OrthogonalMatrix { array })
    }

    pub fn as_array(&self) -> ArrayView2<'_, f64> {
        self.array.view()
    }

    fn transposed(&self) -> OrthogonalMatrix {
        OrthogonalMatrix {
            array: self.array.t().to_owned(),
        }
    }
}

impl Matrix for OrthogonalMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.array.dim())
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        Ok(self.array.dot(&other))
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(other.dot(&self.array))
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        Arc::new(self.transposed())
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(self.array.clone())
    }
}

impl SquareMatrix for OrthogonalMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(0.0)
    }
}

impl InvertibleMatrix for OrthogonalMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        Ok(Arc::new(self.transposed()))
    }
}

/// `scalar · Q` for an orthogonal `Q`.
#[derive(Debug, Clone)]
pub struct ScaledOrthogonalMatrix {
    scalar: f64,
    orthogonal: OrthogonalMatrix,
}

impl ScaledOrthogonalMatrix {
    pub fn new(scalar: f64, orthogonal_array: Array2<f64>) -> Result<Self> {
        Ok(ScaledOrthogonalMatrix {
            scalar,
            orthogonal: OrthogonalMatrix::new(orthogonal_array)?,
        })
    }

    pub fn scalar(&self) -> f64 {
        self.scalar
    }

    fn size(&self) -> usize {
        self.orthogonal.array.nrows()
    }
}

impl Matrix for ScaledOrthogonalMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.orthogonal.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.orthogonal.lmult(other)? * self.scalar)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.orthogonal.rmult(other)? * self.scalar)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        Arc::new(ScaledOrthogonalMatrix {
            scalar: self.scalar,
            orthogonal: self.orthogonal.transposed(),
        })
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(&self.orthogonal.array * self.scalar)
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(self.orthogonal.array.diag().to_owned() * self.scalar)
    }
}

impl SquareMatrix for ScaledOrthogonalMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.size() as f64 * self.scalar.abs().ln())
    }
}

impl InvertibleMatrix for ScaledOrthogonalMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        if self.scalar == 0.0 {
            return Err(MatrixError::Factorization(
                "orthogonal matrix scaled by zero is singular".to_string(),
            ));
        }
        Ok(Arc::new(ScaledOrthogonalMatrix {
            scalar: 1.0 / self.scalar,
            orthogonal: self.orthogonal.transposed(),
        }))
    }
}
