//! Lazy views over other matrices: scalar multiples and transposes.

use std::sync::Arc;

use ndarray::{s, Array1, Array2, ArrayView2};
use once_cell::sync::OnceCell;

use crate::error::{MatrixError, Result};
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    InvertibleMatrix, InvertibleMatrixRef, Matrix, MatrixRef, SquareMatrix, SymmetricMatrix,
};

/// `scalar · inner`, evaluated by scaling the result of each product.
///
/// Square, symmetric and invertible whenever `inner` is. Built through
/// [`MatrixExt`](crate::MatrixExt).
#[derive(Debug)]
pub struct ScaledMatrix<M: ?Sized> {
    scalar: f64,
    inner: Arc<M>,
    inv: OnceCell<InvertibleMatrixRef>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
}

impl<M: Matrix + ?Sized> ScaledMatrix<M> {
    pub fn new(scalar: f64, inner: Arc<M>) -> Self {
        ScaledMatrix {
            scalar,
            inner,
            inv: OnceCell::new(),
            eigen: OnceCell::new(),
        }
    }

    pub fn scalar(&self) -> f64 {
        self.scalar
    }

    pub fn inner(&self) -> &Arc<M> {
        &self.inner
    }
}

impl<M: Matrix + ?Sized> Matrix for ScaledMatrix<M> {
    fn shape(&self) -> Option<(usize, usize)> {
        self.inner.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.inner.lmult(other)? * self.scalar)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.inner.rmult(other)? * self.scalar)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        if self.inner.is_symmetric() {
            return self;
        }
        Arc::new(ScaledMatrix::new(self.scalar, Arc::clone(&self.inner).transpose()))
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(self.inner.array()? * self.scalar)
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(self.inner.diagonal()? * self.scalar)
    }

    fn is_symmetric(&self) -> bool {
        self.inner.is_symmetric()
    }
}

impl<M: SquareMatrix + ?Sized> SquareMatrix for ScaledMatrix<M> {
    fn log_abs_det(&self) -> Result<f64> {
        let (size, _) = self.shape().ok_or(MatrixError::UnknownShape)?;
        Ok(self.inner.log_abs_det()? + size as f64 * self.scalar.abs().ln())
    }
}

impl<M: SymmetricMatrix + ?Sized> ScaledMatrix<M> {
    // A negative scalar reverses the eigenvalue order.
    fn eigen(&self) -> Result<&(Array1<f64>, Arc<OrthogonalMatrix>)> {
        self.eigen.get_or_try_init(|| {
            let values = self.inner.eigenvalues()? * self.scalar;
            let vectors = self.inner.eigenvectors()?;
            if self.scalar >= 0.0 {
                return Ok((values, vectors));
            }
            let reversed = vectors.as_array().slice(s![.., ..;-1]).to_owned();
            Ok((
                values.slice(s![..;-1]).to_owned(),
                Arc::new(OrthogonalMatrix::new(reversed)?),
            ))
        })
    }
}

impl<M: SymmetricMatrix + ?Sized> SymmetricMatrix for ScaledMatrix<M> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen()?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen()?.1))
    }
}

impl<M: InvertibleMatrix + ?Sized> InvertibleMatrix for ScaledMatrix<M> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            if self.scalar == 0.0 {
                return Err(MatrixError::Factorization(
                    "matrix scaled by zero is singular".to_string(),
                ));
            }
            let inner_inv = self.inner.inv()?;
            Ok(Arc::new(ScaledMatrix::new(1.0 / self.scalar, inner_inv)) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// Transpose of an invertible matrix that stays invertible.
#[derive(Debug)]
pub struct TransposedMatrix {
    inner: InvertibleMatrixRef,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl TransposedMatrix {
    pub fn new(inner: InvertibleMatrixRef) -> Self {
        TransposedMatrix {
            inner,
            inv: OnceCell::new(),
        }
    }

    pub fn inner(&self) -> &InvertibleMatrixRef {
        &self.inner
    }
}

impl Matrix for TransposedMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.inner.shape().map(|(rows, cols)| (cols, rows))
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.inner.rmult(other.t())?.reversed_axes())
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.inner.lmult(other.t())?.reversed_axes())
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        let inner: MatrixRef = self.inner.clone();
        inner
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(self.inner.array()?.reversed_axes())
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        self.inner.diagonal()
    }

    fn is_symmetric(&self) -> bool {
        self.inner.is_symmetric()
    }
}

impl SquareMatrix for TransposedMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        self.inner.log_abs_det()
    }
}

impl InvertibleMatrix for TransposedMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            Ok(Arc::new(TransposedMatrix::new(self.inner.inv()?)) as InvertibleMatrixRef)
        })
        .cloned()
    }
}
