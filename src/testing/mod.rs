//! Random fixtures and property checkers comparing structured matrices
//! against a dense reference.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, ArrayViewD};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::autodiff::{CentralDifference, Differentiator};
use crate::error::MatrixError;
use crate::linalg::{eigh, to_nalgebra, to_ndarray, triangle};
use crate::traits::{
    is_same, DifferentiableMatrix, InvertibleMatrix, Matrix, MatrixExt, PositiveDefiniteMatrix,
    SquareMatrix, SymmetricMatrix,
};

pub(crate) const SIZES: [usize; 4] = [1, 2, 5, 10];

const SCALARS: [f64; 4] = [0.7, 1.9, -0.4, -2.3];

const TOLERANCE: f64 = 1e-8;

const GRADIENT_TOLERANCE: f64 = 1e-5;

pub(crate) fn rng() -> ChaCha8Rng {
    let _ = env_logger::builder().is_test(true).try_init();
    ChaCha8Rng::seed_from_u64(42)
}

pub(crate) fn random_array(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-1.0..1.0))
}

pub(crate) fn random_vector(rng: &mut ChaCha8Rng, size: usize) -> Array1<f64> {
    Array1::from_shape_fn(size, |_| rng.random_range(-1.0..1.0))
}

/// Entries of random sign with magnitude in `[0.5, 2)`.
pub(crate) fn random_diagonal(rng: &mut ChaCha8Rng, size: usize) -> Array1<f64> {
    Array1::from_shape_fn(size, |_| {
        let magnitude = rng.random_range(0.5..2.0);
        if rng.random_bool(0.5) {
            magnitude
        } else {
            -magnitude
        }
    })
}

pub(crate) fn random_well_conditioned(rng: &mut ChaCha8Rng, size: usize) -> Array2<f64> {
    random_array(rng, size, size) / (size as f64).sqrt() + Array2::<f64>::eye(size) * 2.0
}

/// Triangular array with a diagonal bounded away from zero.
pub(crate) fn random_triangular(rng: &mut ChaCha8Rng, size: usize, lower: bool) -> Array2<f64> {
    let off_diagonal = random_array(rng, size, size) / (size as f64).sqrt();
    let mut array = triangle(off_diagonal.view(), lower);
    let diagonal = random_diagonal(rng, size).mapv(|d| d + d.signum() * 0.5);
    array.diag_mut().assign(&diagonal);
    array
}

pub(crate) fn random_symmetric(rng: &mut ChaCha8Rng, size: usize) -> Array2<f64> {
    let array = random_array(rng, size, size);
    (&array + &array.t()) * 0.5
}

pub(crate) fn random_orthogonal(rng: &mut ChaCha8Rng, size: usize) -> Array2<f64> {
    let symmetric = random_symmetric(rng, size);
    eigh(symmetric.view()).map(|(_, vectors)| vectors).unwrap()
}

pub(crate) fn random_positive_definite(rng: &mut ChaCha8Rng, size: usize) -> Array2<f64> {
    let array = random_array(rng, size, size);
    array.dot(&array.t()) / size as f64 + Array2::<f64>::eye(size)
}

pub(crate) fn dense_inverse(array: &Array2<f64>) -> Array2<f64> {
    to_ndarray(to_nalgebra(array.view()).try_inverse().unwrap())
}

pub(crate) fn dense_log_abs_det(array: &Array2<f64>) -> f64 {
    to_nalgebra(array.view()).determinant().abs().ln()
}

fn dense_solve(array: &Array2<f64>, vector: &Array1<f64>) -> Array1<f64> {
    dense_inverse(array).dot(vector)
}

pub(crate) fn assert_close(actual: &Array2<f64>, expected: &Array2<f64>) {
    assert_eq!(actual.dim(), expected.dim());
    let scale = 1.0 + expected.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    assert_abs_diff_eq!(actual, expected, epsilon = TOLERANCE * scale);
}

fn assert_close_vector(actual: &Array1<f64>, expected: &Array1<f64>) {
    assert_eq!(actual.len(), expected.len());
    let scale = 1.0 + expected.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    assert_abs_diff_eq!(actual, expected, epsilon = TOLERANCE * scale);
}

fn assert_close_scalar(actual: f64, expected: f64) {
    assert_abs_diff_eq!(actual, expected, epsilon = TOLERANCE * (1.0 + expected.abs()));
}

/// Random operands for one matrix size: `(n, 1)`, `(n, n)` and `(n, 2n)`
/// for `lmult`, `(1, n)`, `(n, n)` and `(2n, n)` for `rmult`, and a vector.
pub(crate) struct Checker {
    right: Vec<Array2<f64>>,
    left: Vec<Array2<f64>>,
    vector: Array1<f64>,
}

impl Checker {
    pub(crate) fn new(rng: &mut ChaCha8Rng, size: usize) -> Self {
        let right: Vec<Array2<f64>> = [1, size, 2 * size]
            .into_iter()
            .map(|cols| random_array(rng, size, cols))
            .collect();
        let left = [1, size, 2 * size]
            .into_iter()
            .map(|rows| random_array(rng, rows, size))
            .collect();
        let vector = random_vector(rng, size);
        Checker { right, left, vector }
    }

    /// Products, transposes and scalar multiples. Works for implicit shapes.
    pub(crate) fn check_matrix<M: Matrix + ?Sized>(&self, matrix: &Arc<M>, dense: &Array2<f64>) {
        for right in &self.right {
            assert_close(&matrix.lmult(right.view()).unwrap(), &dense.dot(right));
        }
        for left in &self.left {
            assert_close(&matrix.rmult(left.view()).unwrap(), &left.dot(dense));
        }
        assert_close_vector(&matrix.lmult_vector(self.vector.view()).unwrap(), &dense.dot(&self.vector));
        assert_close_vector(&matrix.rmult_vector(self.vector.view()).unwrap(), &self.vector.dot(dense));
        assert_close_scalar(
            matrix.quadratic_form(self.vector.view()).unwrap(),
            self.vector.dot(&dense.dot(&self.vector)),
        );

        let transposed = Arc::clone(matrix).transpose();
        for right in &self.right {
            assert_close(&transposed.lmult(right.view()).unwrap(), &dense.t().dot(right));
        }
        let twice = Arc::clone(&transposed).transpose();
        for left in &self.left {
            assert_close(&twice.rmult(left.view()).unwrap(), &left.dot(dense));
        }

        for scalar in SCALARS {
            let scaled = matrix.scalar_multiply(scalar);
            let divided = matrix.scalar_divide(scalar);
            for right in &self.right {
                assert_close(&scaled.lmult(right.view()).unwrap(), &(dense.dot(right) * scalar));
                assert_close(&divided.lmult(right.view()).unwrap(), &(dense.dot(right) / scalar));
            }
            for left in &self.left {
                assert_close(&scaled.rmult(left.view()).unwrap(), &(left.dot(dense) * scalar));
            }
        }
        let negated = matrix.negate();
        assert_close(&negated.lmult(self.right[0].view()).unwrap(), &-dense.dot(&self.right[0]));
    }

    /// [`Checker::check_matrix`] plus the dense projections of an
    /// explicit-shape matrix.
    pub(crate) fn check_explicit<M: Matrix + ?Sized>(&self, matrix: &Arc<M>, dense: &Array2<f64>) {
        self.check_matrix(matrix, dense);
        assert_eq!(matrix.shape(), Some(dense.dim()));
        assert_close(&matrix.array().unwrap(), dense);
        assert_close_vector(&matrix.diagonal().unwrap(), &dense.diag().to_owned());
        let transposed = Arc::clone(matrix).transpose();
        assert_eq!(transposed.shape(), Some(dense.t().dim()));
        assert_close(&transposed.array().unwrap(), &dense.t().to_owned());
        let scaled = matrix.scalar_multiply(SCALARS[3]);
        assert_close(&scaled.array().unwrap(), &(dense * SCALARS[3]));

        let (rows, cols) = dense.dim();
        let too_tall = Array2::zeros((cols + 1, 2));
        assert!(matches!(
            matrix.lmult(too_tall.view()),
            Err(MatrixError::ShapeMismatch { .. })
        ));
        let too_wide = Array2::zeros((2, rows + 1));
        assert!(matches!(
            matrix.rmult(too_wide.view()),
            Err(MatrixError::ShapeMismatch { .. })
        ));
    }

    pub(crate) fn check_square<M: SquareMatrix + ?Sized>(&self, matrix: &Arc<M>, dense: &Array2<f64>) {
        if matrix.shape().is_none() {
            return;
        }
        let expected = dense_log_abs_det(dense);
        assert_close_scalar(matrix.log_abs_det().unwrap(), expected);
        for scalar in SCALARS {
            let scaled = matrix.scalar_multiply(scalar);
            let n = dense.nrows() as f64;
            assert_close_scalar(scaled.log_abs_det().unwrap(), expected + n * scalar.abs().ln());
        }
    }

    pub(crate) fn check_symmetric<M: SymmetricMatrix + ?Sized>(&self, matrix: &Arc<M>, dense: &Array2<f64>) {
        assert!(matrix.is_symmetric());
        assert!(is_same(matrix, &Arc::clone(matrix).transpose()));
        let negated = matrix.negate();
        assert!(is_same(&negated, &Arc::clone(&negated).transpose()));
        if matrix.shape().is_none() {
            assert_eq!(matrix.eigenvalues(), Err(MatrixError::UnknownShape));
            return;
        }
        self.check_square(matrix, dense);

        let (expected, _) = eigh(dense.view()).unwrap();
        for (values, vectors, dense) in [
            (matrix.eigenvalues().unwrap(), matrix.eigenvectors().unwrap(), dense.clone()),
            (negated.eigenvalues().unwrap(), negated.eigenvectors().unwrap(), -dense),
        ] {
            assert!(values.iter().zip(values.iter().skip(1)).all(|(a, b)| a <= b));
            let q = vectors.as_array();
            assert_close(&(&q * &values).dot(&q.t()), &dense);
            assert_close(&q.t().dot(&q), &Array2::eye(dense.nrows()));
        }
        assert_close_vector(&matrix.eigenvalues().unwrap(), &expected);
    }

    pub(crate) fn check_invertible<M: InvertibleMatrix + ?Sized>(&self, matrix: &Arc<M>, dense: &Array2<f64>) {
        let dense_inv = dense_inverse(dense);
        let inverse = matrix.inv().unwrap();
        for right in &self.right {
            assert_close(&inverse.lmult(right.view()).unwrap(), &dense_inv.dot(right));
        }
        for left in &self.left {
            assert_close(&inverse.rmult(left.view()).unwrap(), &left.dot(&dense_inv));
        }
        let transposed_inverse = Arc::clone(&inverse).transpose();
        assert_close(
            &transposed_inverse.lmult(self.right[1].view()).unwrap(),
            &dense_inv.t().dot(&self.right[1]),
        );
        assert_close_scalar(
            inverse.quadratic_form(self.vector.view()).unwrap(),
            self.vector.dot(&dense_inv.dot(&self.vector)),
        );
        let restored = inverse.inv().unwrap();
        for right in &self.right {
            assert_close(&restored.lmult(right.view()).unwrap(), &dense.dot(right));
        }
        for scalar in SCALARS {
            let scaled_inverse = matrix.scalar_multiply(scalar).inv().unwrap();
            assert_close(
                &scaled_inverse.lmult(self.right[1].view()).unwrap(),
                &(dense_inv.dot(&self.right[1]) / scalar),
            );
        }
        if matrix.shape().is_some() {
            assert_close(&inverse.array().unwrap(), &dense_inv);
            assert_close_scalar(inverse.log_abs_det().unwrap(), -dense_log_abs_det(dense));
        }
    }

    pub(crate) fn check_positive_definite<M: PositiveDefiniteMatrix + ?Sized>(
        &self,
        matrix: &Arc<M>,
        dense: &Array2<f64>,
    ) {
        assert!(matrix.quadratic_form(self.vector.view()).unwrap() > 0.0);
        let root = matrix.sqrt().unwrap();
        let root_t = Arc::clone(&root).transpose();
        for right in &self.right {
            let inner = root_t.lmult(right.view()).unwrap();
            assert_close(&root.lmult(inner.view()).unwrap(), &dense.dot(right));
        }
        for left in &self.left {
            let inner = root.rmult(left.view()).unwrap();
            assert_close(&root_t.rmult(inner.view()).unwrap(), &left.dot(dense));
        }
        if matrix.shape().is_some() {
            assert!(matrix.eigenvalues().unwrap().iter().all(|value| *value > 0.0));
        }
    }

    /// Compares closed-form gradients, and gradients obtained through the
    /// injected differentiator, with central differences of the dense
    /// expressions built by `dense_of` from a parameter tensor.
    pub(crate) fn check_differentiable<M, F>(&self, matrix: &Arc<M>, dense_of: F)
    where
        M: DifferentiableMatrix + ?Sized,
        F: Fn(ArrayViewD<f64>) -> Array2<f64>,
    {
        let parameters = matrix.parameters();
        let differentiator = CentralDifference::default();

        assert_close_scalar(
            matrix.log_abs_det_at(parameters.view()).unwrap(),
            matrix.log_abs_det().unwrap(),
        );
        let expected = differentiator
            .gradient(&|p| Ok(dense_log_abs_det(&dense_of(p))), parameters.view())
            .unwrap();
        let closed = matrix.grad_log_abs_det().unwrap();
        assert_eq!(closed.shape(), parameters.shape());
        assert_abs_diff_eq!(closed, expected, epsilon = GRADIENT_TOLERANCE);
        let injected = matrix.grad_log_abs_det_with(&differentiator).unwrap();
        assert_abs_diff_eq!(injected, expected, epsilon = GRADIENT_TOLERANCE);

        let vector = &self.vector;
        let dense_inv = dense_inverse(&dense_of(parameters.view()));
        assert_close_scalar(
            matrix.quadratic_form_inv_at(parameters.view(), vector.view()).unwrap(),
            vector.dot(&dense_inv.dot(vector)),
        );
        let expected = differentiator
            .gradient(
                &|p| Ok(vector.dot(&dense_solve(&dense_of(p), vector))),
                parameters.view(),
            )
            .unwrap();
        let closed = matrix.grad_quadratic_form_inv(vector.view()).unwrap();
        assert_abs_diff_eq!(closed, expected, epsilon = GRADIENT_TOLERANCE);
        let injected = matrix
            .grad_quadratic_form_inv_with(&differentiator, vector.view())
            .unwrap();
        assert_abs_diff_eq!(injected, expected, epsilon = GRADIENT_TOLERANCE);
    }
}
