//! Dense factorization primitives.
//!
//! Structured matrices never call nalgebra directly; every LU, Cholesky,
//! triangular solve and symmetric eigendecomposition goes through this module,
//! which converts between `ndarray` storage and `nalgebra` with `nshare`.

use log::debug;
use nalgebra::{Cholesky, DMatrix, Dyn, SymmetricEigen, LU};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use nshare::{IntoNalgebra, IntoNdarray2};

use crate::error::{MatrixError, Result};
use crate::utils::{check_len, check_square};

pub(crate) fn to_nalgebra(array: ArrayView2<f64>) -> DMatrix<f64> {
    array.to_owned().into_nalgebra()
}

pub(crate) fn to_ndarray(matrix: DMatrix<f64>) -> Array2<f64> {
    matrix.into_ndarray2().into_owned()
}

/// LU factorization with partial pivoting, `P M = L U`.
///
/// The factor can solve against `M` or against `Mᵗ`, so a single
/// factorization serves a matrix, its transpose and both their inverses.
#[derive(Debug)]
pub struct LuFactor {
    lu: LU<f64, Dyn, Dyn>,
    lower: DMatrix<f64>,
    upper: DMatrix<f64>,
    log_abs_det: f64,
}

impl LuFactor {
    /// Factor a square array. Fails if the array is not square or is
    /// exactly singular.
    pub fn new(array: ArrayView2<f64>) -> Result<Self> {
        let size = check_square(&array)?;
        debug!("computing LU factorization of {size}x{size} array");
        let lu = to_nalgebra(array).lu();
        let upper = lu.u();
        if upper.diagonal().iter().any(|d| *d == 0.0) {
            return Err(MatrixError::Factorization(
                "LU factorization found a singular array".to_string(),
            ));
        }
        let log_abs_det = upper.diagonal().iter().map(|d| d.abs().ln()).sum();
        let lower = lu.l();
        Ok(LuFactor {
            lu,
            lower,
            upper,
            log_abs_det,
        })
    }

    pub fn size(&self) -> usize {
        self.upper.nrows()
    }

    /// `log |det M|` of the factored array.
    pub fn log_abs_det(&self) -> f64 {
        self.log_abs_det
    }

    /// Solve `M X = rhs`, or `Mᵗ X = rhs` when `transposed` is set.
    pub fn solve(&self, rhs: ArrayView2<f64>, transposed: bool) -> Result<Array2<f64>> {
        check_len("LU solve", self.size(), rhs.nrows())?;
        let rhs = to_nalgebra(rhs);
        let solution = if transposed {
            // Mᵗ = Uᵗ Lᵗ P
            let mut solution = self
                .upper
                .tr_solve_upper_triangular(&rhs)
                .and_then(|y| self.lower.tr_solve_lower_triangular(&y))
                .ok_or_else(singular_solve)?;
            self.lu.p().inv_permute_rows(&mut solution);
            solution
        } else {
            self.lu.solve(&rhs).ok_or_else(singular_solve)?
        };
        Ok(to_ndarray(solution))
    }
}

fn singular_solve() -> MatrixError {
    MatrixError::Factorization("linear solve against a singular array".to_string())
}

/// `log |det M|` of a general square array.
pub(crate) fn log_abs_det(array: ArrayView2<f64>) -> Result<f64> {
    Ok(LuFactor::new(array)?.log_abs_det())
}

/// Solve `M x = b` for a general square array.
pub(crate) fn solve_vector(array: ArrayView2<f64>, rhs: ArrayView1<f64>) -> Result<Array1<f64>> {
    let lu = LuFactor::new(array)?;
    let rhs = rhs.insert_axis(ndarray::Axis(1));
    Ok(lu.solve(rhs, false)?.remove_axis(ndarray::Axis(1)))
}

/// Lower Cholesky factor `L` with `L Lᵗ = array`.
pub(crate) fn cholesky(array: ArrayView2<f64>) -> Result<Array2<f64>> {
    let size = check_square(&array)?;
    debug!("computing Cholesky factorization of {size}x{size} array");
    Cholesky::new(to_nalgebra(array))
        .map(|chol| to_ndarray(chol.l()))
        .ok_or_else(|| {
            MatrixError::Factorization("Cholesky factorization requires a positive definite array".to_string())
        })
}

/// Solve against a triangular `factor`, or against its transpose when
/// `transposed` is set. Only the triangle selected by `lower` is read.
pub(crate) fn solve_triangular(
    factor: &DMatrix<f64>,
    rhs: ArrayView2<f64>,
    lower: bool,
    transposed: bool,
) -> Result<Array2<f64>> {
    check_len("triangular solve", factor.nrows(), rhs.nrows())?;
    let rhs = to_nalgebra(rhs);
    let solution = match (lower, transposed) {
        (true, false) => factor.solve_lower_triangular(&rhs),
        (true, true) => factor.tr_solve_lower_triangular(&rhs),
        (false, false) => factor.solve_upper_triangular(&rhs),
        (false, true) => factor.tr_solve_upper_triangular(&rhs),
    };
    solution.map(to_ndarray).ok_or_else(|| {
        MatrixError::Factorization("triangular solve against a singular array".to_string())
    })
}

/// Copy of `array` with the entries outside the selected triangle zeroed.
pub(crate) fn triangle(array: ArrayView2<f64>, lower: bool) -> Array2<f64> {
    Array2::from_shape_fn(array.dim(), |(i, j)| {
        if (lower && j <= i) || (!lower && j >= i) {
            array[[i, j]]
        } else {
            0.0
        }
    })
}

/// Symmetric eigendecomposition with eigenvalues in ascending order and the
/// eigenvectors as matching columns.
pub(crate) fn eigh(array: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let size = check_square(&array)?;
    debug!("computing symmetric eigendecomposition of {size}x{size} array");
    let eigen = SymmetricEigen::try_new(to_nalgebra(array), f64::EPSILON, 0).ok_or_else(|| {
        MatrixError::Factorization("symmetric eigendecomposition did not converge".to_string())
    })?;
    let values = Array1::from_iter(eigen.eigenvalues.iter().copied());
    let vectors = Array2::from_shape_fn((size, size), |(i, j)| eigen.eigenvectors[(i, j)]);
    Ok(sort_eigenpairs(values, vectors))
}

/// Indices that sort `values` in ascending order.
pub(crate) fn ascending_order(values: ArrayView1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    order
}

pub(crate) fn permute(values: ArrayView1<f64>, order: &[usize]) -> Array1<f64> {
    order.iter().map(|&i| values[i]).collect()
}

pub(crate) fn permute_columns(array: ArrayView2<f64>, order: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((array.nrows(), order.len()), |(i, j)| array[[i, order[j]]])
}

pub(crate) fn sort_eigenpairs(values: Array1<f64>, vectors: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let order = ascending_order(values.view());
    (
        permute(values.view(), &order),
        permute_columns(vectors.view(), &order),
    )
}
