//! Diagonal matrices stored as their diagonal vector.

use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1};
use once_cell::sync::OnceCell;

use crate::error::{MatrixError, Result};
use crate::linalg::sort_eigenpairs;
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    Definiteness, DifferentiableMatrix, General, InvertibleMatrix, InvertibleMatrixRef, Matrix,
    MatrixRef, Positive, PositiveDefiniteMatrix, SquareMatrix, SymmetricMatrix,
};
use crate::utils::{check_len, check_lmult, check_rmult};

/// Diagonal matrix stored as its diagonal vector.
///
/// Products broadcast the diagonal over the rows (`lmult`) or columns
/// (`rmult`) of the operand. Gradients are taken with respect to the
/// diagonal.
#[derive(Debug)]
pub struct DiagonalMatrix<K: Definiteness = General> {
    diagonal: Array1<f64>,
    inv: OnceCell<InvertibleMatrixRef>,
    sqrt: OnceCell<InvertibleMatrixRef>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
    _definiteness: PhantomData<K>,
}

pub type PositiveDiagonalMatrix = DiagonalMatrix<Positive>;

impl DiagonalMatrix<General> {
    pub fn new(diagonal: Array1<f64>) -> Self {
        Self::from_diagonal(diagonal)
    }
}

impl DiagonalMatrix<Positive> {
    /// Fails with [`MatrixError::CategoryMismatch`] unless every entry is
    /// strictly positive.
    pub fn positive(diagonal: Array1<f64>) -> Result<Self> {
        if let Some(bad) = diagonal.iter().find(|d| !(**d > 0.0)) {
            return Err(MatrixError::CategoryMismatch(format!(
                "positive diagonal matrix requires positive entries, found {bad}"
            )));
        }
        Ok(Self::from_diagonal(diagonal))
    }
}

impl<K: Definiteness> DiagonalMatrix<K> {
    fn from_diagonal(diagonal: Array1<f64>) -> Self {
        DiagonalMatrix {
            diagonal,
            inv: OnceCell::new(),
            sqrt: OnceCell::new(),
            eigen: OnceCell::new(),
            _definiteness: PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        self.diagonal.len()
    }

    fn eigen(&self) -> Result<&(Array1<f64>, Arc<OrthogonalMatrix>)> {
        self.eigen.get_or_try_init(|| {
            let (values, vectors) = sort_eigenpairs(self.diagonal.clone(), Array2::eye(self.size()));
            Ok((values, Arc::new(OrthogonalMatrix::new(vectors)?)))
        })
    }
}

fn diagonal_parameter(parameters: ArrayViewD<f64>, size: usize) -> Result<ArrayView1<f64>> {
    check_len("diagonal parameter", size, parameters.len())?;
    parameters
        .into_dimensionality::<Ix1>()
        .map_err(|_| MatrixError::CategoryMismatch("diagonal parameter must be a vector".to_string()))
}

impl<K: Definiteness> Matrix for DiagonalMatrix<K> {
    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.size(), self.size()))
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        Ok(&other * &self.diagonal.view().insert_axis(Axis(1)))
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(&other * &self.diagonal)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(Array2::from_diag(&self.diagonal))
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(self.diagonal.clone())
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl<K: Definiteness> SquareMatrix for DiagonalMatrix<K> {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.diagonal.iter().map(|d| d.abs().ln()).sum())
    }
}

impl<K: Definiteness> SymmetricMatrix for DiagonalMatrix<K> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen()?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen()?.1))
    }
}

impl<K: Definiteness> InvertibleMatrix for DiagonalMatrix<K> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            if self.diagonal.iter().any(|d| *d == 0.0) {
                return Err(MatrixError::Factorization(
                    "diagonal matrix with a zero entry is singular".to_string(),
                ));
            }
            let inverse = DiagonalMatrix::<K>::from_diagonal(self.diagonal.mapv(f64::recip));
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

impl PositiveDefiniteMatrix for DiagonalMatrix<Positive> {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        self.sqrt.get_or_try_init(|| {
            let root = DiagonalMatrix::<Positive>::from_diagonal(self.diagonal.mapv(f64::sqrt));
            Ok(Arc::new(root) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

impl<K: Definiteness> DifferentiableMatrix for DiagonalMatrix<K> {
    fn parameters(&self) -> ArrayD<f64> {
        self.diagonal.clone().into_dyn()
    }

    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64> {
        let diagonal = diagonal_parameter(parameters, self.size())?;
        Ok(diagonal.iter().map(|d| d.abs().ln()).sum())
    }

    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64> {
        let diagonal = diagonal_parameter(parameters, self.size())?;
        check_len("quadratic form", self.size(), vector.len())?;
        Ok(vector.iter().zip(diagonal.iter()).map(|(v, d)| v * v / d).sum())
    }

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>> {
        Ok(self.diagonal.mapv(f64::recip).into_dyn())
    }

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>> {
        check_len("quadratic form", self.size(), vector.len())?;
        let scaled = &vector / &self.diagonal;
        Ok(scaled.mapv(|x| -x * x).into_dyn())
    }
}
