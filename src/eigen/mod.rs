//! Symmetric matrices held as an eigendecomposition `Q diag(λ) Qᵗ`, and the
//! SoftAbs regularisation that maps any symmetric matrix to a positive
//! definite one by transforming its eigenvalues.

use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};
use once_cell::sync::OnceCell;

use crate::dense::DenseSquareMatrix;
use crate::error::{MatrixError, Result};
use crate::linalg::{eigh, sort_eigenpairs};
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    Definiteness, DifferentiableMatrix, General, InvertibleMatrix, InvertibleMatrixRef, Matrix,
    MatrixRef, Positive, PositiveDefiniteMatrix, SquareMatrix, SymmetricMatrix,
};
use crate::utils::{check_len, check_lmult, check_rmult, check_square, square_parameter};

/// Symmetric matrix `Q diag(λ) Qᵗ` given its eigenvectors and eigenvalues.
///
/// The pairs are sorted at construction so that eigenvalues are ascending.
#[derive(Debug)]
pub struct EigendecomposedSymmetricMatrix<K: Definiteness = General> {
    eigenvalues: Array1<f64>,
    eigenvectors: Arc<OrthogonalMatrix>,
    inv: OnceCell<InvertibleMatrixRef>,
    sqrt: OnceCell<InvertibleMatrixRef>,
    _definiteness: PhantomData<K>,
}

pub type EigendecomposedPositiveDefiniteMatrix = EigendecomposedSymmetricMatrix<Positive>;

impl EigendecomposedSymmetricMatrix<General> {
    pub fn new(eigenvectors: Array2<f64>, eigenvalues: Array1<f64>) -> Result<Self> {
        Self::from_parts(eigenvectors, eigenvalues)
    }
}

impl EigendecomposedSymmetricMatrix<Positive> {
    /// Fails with [`MatrixError::CategoryMismatch`] unless every eigenvalue
    /// is strictly positive.
    pub fn positive(eigenvectors: Array2<f64>, eigenvalues: Array1<f64>) -> Result<Self> {
        if let Some(bad) = eigenvalues.iter().find(|value| !(**value > 0.0)) {
            return Err(MatrixError::CategoryMismatch(format!(
                "positive definite eigendecomposition requires positive eigenvalues, found {bad}"
            )));
        }
        Self::from_parts(eigenvectors, eigenvalues)
    }
}

impl<K: Definiteness> EigendecomposedSymmetricMatrix<K> {
    fn from_parts(eigenvectors: Array2<f64>, eigenvalues: Array1<f64>) -> Result<Self> {
        let size = check_square(&eigenvectors)?;
        check_len("eigenvalues", size, eigenvalues.len())?;
        let (eigenvalues, eigenvectors) = sort_eigenpairs(eigenvalues, eigenvectors);
        Ok(EigendecomposedSymmetricMatrix {
            eigenvalues,
            eigenvectors: Arc::new(OrthogonalMatrix::new(eigenvectors)?),
            inv: OnceCell::new(),
            sqrt: OnceCell::new(),
            _definiteness: PhantomData,
        })
    }

    fn q(&self) -> ArrayView2<'_, f64> {
        self.eigenvectors.as_array()
    }
}

impl<K: Definiteness> Matrix for EigendecomposedSymmetricMatrix<K> {
    fn shape(&self) -> Option<(usize, usize)> {
        self.eigenvectors.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        let projected = self.q().t().dot(&other) * &self.eigenvalues.view().insert_axis(Axis(1));
        Ok(self.q().dot(&projected))
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        let projected = other.dot(&self.q()) * &self.eigenvalues;
        Ok(projected.dot(&self.q().t()))
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok((&self.q() * &self.eigenvalues).dot(&self.q().t()))
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl<K: Definiteness> SquareMatrix for EigendecomposedSymmetricMatrix<K> {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.eigenvalues.iter().map(|value| value.abs().ln()).sum())
    }
}

impl<K: Definiteness> SymmetricMatrix for EigendecomposedSymmetricMatrix<K> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigenvalues.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigenvectors))
    }
}

impl<K: Definiteness> InvertibleMatrix for EigendecomposedSymmetricMatrix<K> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            if self.eigenvalues.iter().any(|value| *value == 0.0) {
                return Err(MatrixError::Factorization(
                    "eigendecomposition with a zero eigenvalue is singular".to_string(),
                ));
            }
            let inverse = EigendecomposedSymmetricMatrix::<K>::from_parts(
                self.q().to_owned(),
                self.eigenvalues.mapv(f64::recip),
            )?;
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

impl PositiveDefiniteMatrix for EigendecomposedSymmetricMatrix<Positive> {
    /// `Q diag(√λ)`, a square but non-symmetric factor.
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        self.sqrt.get_or_try_init(|| {
            let factor = &self.q() * &self.eigenvalues.mapv(f64::sqrt);
            Ok(Arc::new(DenseSquareMatrix::new(factor)?) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// SoftAbs regularised eigenvalue `x · coth(c x)`.
///
/// Always positive, tends to `|x|` for large `|c x|` and to `1/c` as `x → 0`.
pub fn softabs(x: f64, coefficient: f64) -> f64 {
    let cx = coefficient * x;
    if cx.abs() < 1e-4 {
        1.0 / coefficient + coefficient * x * x / 3.0
    } else {
        x / cx.tanh()
    }
}

/// Derivative of [`softabs`] with respect to `x`.
fn softabs_derivative(x: f64, coefficient: f64) -> f64 {
    let cx = coefficient * x;
    if cx.abs() < 1e-4 {
        2.0 * cx / 3.0
    } else {
        let sinh = cx.sinh();
        1.0 / cx.tanh() - cx / (sinh * sinh)
    }
}

/// Positive definite matrix obtained from a symmetric, possibly indefinite
/// matrix by replacing each eigenvalue `λ` with `softabs(λ, c)`.
///
/// The input is symmetrised as `(S + Sᵗ) / 2`. Gradients are taken with
/// respect to the input array.
#[derive(Debug)]
pub struct SoftAbsRegularisedPositiveDefiniteMatrix {
    symmetric_array: Array2<f64>,
    softabs_coeff: f64,
    raw_eigenvalues: Array1<f64>,
    raw_eigenvectors: Array2<f64>,
    regularised: Arc<EigendecomposedSymmetricMatrix<Positive>>,
}

impl SoftAbsRegularisedPositiveDefiniteMatrix {
    pub fn new(symmetric_array: Array2<f64>, softabs_coeff: f64) -> Result<Self> {
        if !(softabs_coeff > 0.0 && softabs_coeff.is_finite()) {
            return Err(MatrixError::CategoryMismatch(format!(
                "SoftAbs coefficient must be positive and finite, got {softabs_coeff}"
            )));
        }
        let size = check_square(&symmetric_array)?;
        debug!("regularising {size}x{size} symmetric array with SoftAbs coefficient {softabs_coeff}");
        let (raw_eigenvalues, raw_eigenvectors) = eigh(symmetrise(symmetric_array.view()).view())?;
        let regularised_values = raw_eigenvalues.mapv(|value| softabs(value, softabs_coeff));
        let regularised = EigendecomposedSymmetricMatrix::positive(raw_eigenvectors.clone(), regularised_values)?;
        Ok(SoftAbsRegularisedPositiveDefiniteMatrix {
            symmetric_array,
            softabs_coeff,
            raw_eigenvalues,
            raw_eigenvectors,
            regularised: Arc::new(regularised),
        })
    }

    pub fn softabs_coeff(&self) -> f64 {
        self.softabs_coeff
    }

    fn size(&self) -> usize {
        self.raw_eigenvalues.len()
    }

    fn regularised_eigen_at(&self, parameters: ArrayViewD<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        let array = square_parameter(parameters, self.size())?;
        let (values, vectors) = eigh(symmetrise(array).view())?;
        Ok((values.mapv(|value| softabs(value, self.softabs_coeff)), vectors))
    }
}

fn symmetrise(array: ArrayView2<f64>) -> Array2<f64> {
    (&array + &array.t()) * 0.5
}

impl Matrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.regularised.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.regularised.lmult(other)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.regularised.rmult(other)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        self.regularised.array()
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl SquareMatrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        self.regularised.log_abs_det()
    }
}

impl SymmetricMatrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        self.regularised.eigenvalues()
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        self.regularised.eigenvectors()
    }
}

impl InvertibleMatrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.regularised.inv()
    }
}

impl PositiveDefiniteMatrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        self.regularised.sqrt()
    }
}

impl DifferentiableMatrix for SoftAbsRegularisedPositiveDefiniteMatrix {
    fn parameters(&self) -> ArrayD<f64> {
        self.symmetric_array.clone().into_dyn()
    }

    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64> {
        let (values, _) = self.regularised_eigen_at(parameters)?;
        Ok(values.iter().map(|value| value.ln()).sum())
    }

    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64> {
        check_len("quadratic form", self.size(), vector.len())?;
        let (values, vectors) = self.regularised_eigen_at(parameters)?;
        let projected = vectors.t().dot(&vector);
        Ok(projected.iter().zip(values.iter()).map(|(e, f)| e * e / f).sum())
    }

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>> {
        let c = self.softabs_coeff;
        let q = &self.raw_eigenvectors;
        let weights = self
            .raw_eigenvalues
            .mapv(|value| softabs_derivative(value, c) / softabs(value, c));
        Ok((q * &weights).dot(&q.t()).into_dyn())
    }

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>> {
        check_len("quadratic form", self.size(), vector.len())?;
        let c = self.softabs_coeff;
        let q = &self.raw_eigenvectors;
        let lambda = &self.raw_eigenvalues;
        let f = lambda.mapv(|value| softabs(value, c));
        let e = q.t().dot(&vector) / &f;
        let n = self.size();
        // Divided differences of the regularising function, with the
        // derivative on (near) repeated eigenvalues.
        let divided = Array2::from_shape_fn((n, n), |(i, j)| {
            let gap = lambda[i] - lambda[j];
            if gap.abs() <= 1e-10 * (1.0 + lambda[i].abs()) {
                softabs_derivative(0.5 * (lambda[i] + lambda[j]), c)
            } else {
                (f[i] - f[j]) / gap
            }
        });
        let outer = Array2::from_shape_fn((n, n), |(i, j)| e[i] * e[j] * divided[[i, j]]);
        Ok((-q.dot(&outer).dot(&q.t())).into_dyn())
    }
}
