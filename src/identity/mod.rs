//! Identity and scalar multiples of the identity, with an explicit size or
//! one taken from each operand.

use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{arr0, Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD};

use crate::error::{MatrixError, Result};
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    Definiteness, DifferentiableMatrix, General, InvertibleMatrix, InvertibleMatrixRef, Matrix,
    MatrixRef, Positive, PositiveDefiniteMatrix, SquareMatrix, SymmetricMatrix,
};
use crate::utils::{check_len, check_lmult, check_rmult};

/// The identity matrix, either of a fixed size or implicitly sized to match
/// each operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMatrix {
    size: Option<usize>,
}

impl IdentityMatrix {
    pub fn new(size: usize) -> Self {
        IdentityMatrix { size: Some(size) }
    }

    pub fn implicit() -> Self {
        IdentityMatrix { size: None }
    }

    fn explicit_size(&self) -> Result<usize> {
        self.size.ok_or(MatrixError::UnknownShape)
    }
}

impl Matrix for IdentityMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.size.map(|n| (n, n))
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        Ok(other.to_owned())
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(other.to_owned())
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(Array2::eye(self.explicit_size()?))
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(Array1::ones(self.explicit_size()?))
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl SquareMatrix for IdentityMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(0.0)
    }
}

impl SymmetricMatrix for IdentityMatrix {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        self.diagonal()
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::new(OrthogonalMatrix::new(self.array()?)?))
    }
}

impl InvertibleMatrix for IdentityMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        Ok(Arc::new(*self))
    }
}

impl PositiveDefiniteMatrix for IdentityMatrix {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        Ok(Arc::new(*self))
    }
}

/// `scalar · I`, with a fixed or implicit size.
///
/// The `Positive` flavour requires a positive scalar and exposes a square
/// root. Gradients are taken with respect to the scalar.
#[derive(Debug, Clone, Copy)]
pub struct ScaledIdentityMatrix<K: Definiteness = General> {
    scalar: f64,
    size: Option<usize>,
    _definiteness: PhantomData<K>,
}

pub type PositiveScaledIdentityMatrix = ScaledIdentityMatrix<Positive>;

impl ScaledIdentityMatrix<General> {
    pub fn new(scalar: f64, size: Option<usize>) -> Self {
        Self::from_parts(scalar, size)
    }
}

impl ScaledIdentityMatrix<Positive> {
    pub fn positive(scalar: f64, size: Option<usize>) -> Result<Self> {
        if !(scalar > 0.0) {
            return Err(MatrixError::CategoryMismatch(format!(
                "positive scaled identity requires a positive scalar, got {scalar}"
            )));
        }
        Ok(Self::from_parts(scalar, size))
    }
}

impl<K: Definiteness> ScaledIdentityMatrix<K> {
    fn from_parts(scalar: f64, size: Option<usize>) -> Self {
        ScaledIdentityMatrix {
            scalar,
            size,
            _definiteness: PhantomData,
        }
    }

    pub fn scalar(&self) -> f64 {
        self.scalar
    }

    fn explicit_size(&self) -> Result<usize> {
        self.size.ok_or(MatrixError::UnknownShape)
    }
}

fn scalar_parameter(parameters: ArrayViewD<f64>) -> Result<f64> {
    check_len("scalar parameter", 1, parameters.len())?;
    parameters
        .iter()
        .next()
        .copied()
        .ok_or(MatrixError::UnknownShape)
}

impl<K: Definiteness> Matrix for ScaledIdentityMatrix<K> {
    fn shape(&self) -> Option<(usize, usize)> {
        self.size.map(|n| (n, n))
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        Ok(&other * self.scalar)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(&other * self.scalar)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(Array2::eye(self.explicit_size()?) * self.scalar)
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(self.explicit_size()?, self.scalar))
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl<K: Definiteness> SquareMatrix for ScaledIdentityMatrix<K> {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.explicit_size()? as f64 * self.scalar.abs().ln())
    }
}

impl<K: Definiteness> SymmetricMatrix for ScaledIdentityMatrix<K> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        self.diagonal()
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::new(OrthogonalMatrix::new(Array2::eye(self.explicit_size()?))?))
    }
}

impl<K: Definiteness> InvertibleMatrix for ScaledIdentityMatrix<K> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        if self.scalar == 0.0 {
            return Err(MatrixError::Factorization(
                "identity scaled by zero is singular".to_string(),
            ));
        }
        Ok(Arc::new(Self::from_parts(1.0 / self.scalar, self.size)))
    }
}

impl PositiveDefiniteMatrix for ScaledIdentityMatrix<Positive> {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        Ok(Arc::new(Self::from_parts(self.scalar.sqrt(), self.size)))
    }
}

impl<K: Definiteness> DifferentiableMatrix for ScaledIdentityMatrix<K> {
    fn parameters(&self) -> ArrayD<f64> {
        arr0(self.scalar).into_dyn()
    }

    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64> {
        let scalar = scalar_parameter(parameters)?;
        Ok(self.explicit_size()? as f64 * scalar.abs().ln())
    }

    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64> {
        let scalar = scalar_parameter(parameters)?;
        check_len("quadratic form", self.explicit_size()?, vector.len())?;
        Ok(vector.dot(&vector) / scalar)
    }

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>> {
        Ok(arr0(self.explicit_size()? as f64 / self.scalar).into_dyn())
    }

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>> {
        check_len("quadratic form", self.explicit_size()?, vector.len())?;
        Ok(arr0(-vector.dot(&vector) / (self.scalar * self.scalar)).into_dyn())
    }
}
