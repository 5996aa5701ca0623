//! Triangular matrices, their inverses, and definite matrices held as a
//! signed product of a triangular factor with its transpose.

use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};
use once_cell::sync::OnceCell;

use crate::error::{MatrixError, Result};
use crate::linalg::{eigh, solve_triangular, to_nalgebra, triangle};
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    Definiteness, DifferentiableMatrix, General, InvertibleMatrix, InvertibleMatrixRef, Matrix,
    MatrixRef, Positive, PositiveDefiniteMatrix, Sign, SquareMatrix, SymmetricMatrix,
};
use crate::utils::{check_len, check_lmult, check_rmult, check_square, square_parameter};

/// Triangular array shared between a triangular matrix and its inverse.
#[derive(Debug)]
struct Triangle {
    array: Array2<f64>,
    lower: bool,
    factor: DMatrix<f64>,
}

impl Triangle {
    fn new(array: ArrayView2<f64>, lower: bool) -> Result<Self> {
        check_square(&array)?;
        let array = triangle(array, lower);
        let factor = to_nalgebra(array.view());
        Ok(Triangle { array, lower, factor })
    }

    fn size(&self) -> usize {
        self.array.nrows()
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.array.dim())
    }

    fn transposed(&self) -> Triangle {
        Triangle {
            array: self.array.t().to_owned(),
            lower: !self.lower,
            factor: self.factor.transpose(),
        }
    }

    fn log_abs_det(&self) -> f64 {
        self.array.diag().iter().map(|d| d.abs().ln()).sum()
    }

    fn ensure_nonsingular(&self) -> Result<()> {
        if self.array.diag().iter().any(|d| *d == 0.0) {
            return Err(MatrixError::Factorization(
                "triangular array with a zero diagonal entry is singular".to_string(),
            ));
        }
        Ok(())
    }

    /// `T⁻¹ rhs`, or `T⁻ᵗ rhs` when `transposed` is set.
    fn solve(&self, rhs: ArrayView2<f64>, transposed: bool) -> Result<Array2<f64>> {
        solve_triangular(&self.factor, rhs, self.lower, transposed)
    }
}

/// Lower or upper triangular matrix.
///
/// Entries outside the selected triangle are ignored at construction.
#[derive(Debug)]
pub struct TriangularMatrix {
    triangle: Arc<Triangle>,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl TriangularMatrix {
    pub fn new(array: Array2<f64>, lower: bool) -> Result<Self> {
        Ok(Self::from_triangle(Arc::new(Triangle::new(array.view(), lower)?)))
    }

    fn from_triangle(triangle: Arc<Triangle>) -> Self {
        TriangularMatrix {
            triangle,
            inv: OnceCell::new(),
        }
    }

    pub fn lower(&self) -> bool {
        self.triangle.lower
    }
}

impl Matrix for TriangularMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.triangle.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        Ok(self.triangle.array.dot(&other))
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(other.dot(&self.triangle.array))
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        Arc::new(Self::from_triangle(Arc::new(self.triangle.transposed())))
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(self.triangle.array.clone())
    }
}

impl SquareMatrix for TriangularMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.triangle.log_abs_det())
    }
}

impl InvertibleMatrix for TriangularMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            let inverse = InverseTriangularMatrix::from_triangle(Arc::clone(&self.triangle))?;
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// Inverse of a triangular matrix, applied by triangular solves against the
/// stored array without forming the inverse.
#[derive(Debug)]
pub struct InverseTriangularMatrix {
    triangle: Arc<Triangle>,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl InverseTriangularMatrix {
    /// `inverse_array` is the triangular array whose inverse this matrix
    /// represents.
    pub fn new(inverse_array: Array2<f64>, lower: bool) -> Result<Self> {
        Self::from_triangle(Arc::new(Triangle::new(inverse_array.view(), lower)?))
    }

    fn from_triangle(triangle: Arc<Triangle>) -> Result<Self> {
        triangle.ensure_nonsingular()?;
        Ok(InverseTriangularMatrix {
            triangle,
            inv: OnceCell::new(),
        })
    }

    pub fn lower(&self) -> bool {
        self.triangle.lower
    }
}

impl Matrix for InverseTriangularMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.triangle.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        self.triangle.solve(other, false)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(self.triangle.solve(other.t(), true)?.reversed_axes())
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        Arc::new(InverseTriangularMatrix {
            triangle: Arc::new(self.triangle.transposed()),
            inv: OnceCell::new(),
        })
    }

    fn array(&self) -> Result<Array2<f64>> {
        self.triangle.solve(Array2::eye(self.triangle.size()).view(), false)
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(self.triangle.array.diag().mapv(f64::recip))
    }
}

impl SquareMatrix for InverseTriangularMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(-self.triangle.log_abs_det())
    }
}

impl InvertibleMatrix for InverseTriangularMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            let inverse = TriangularMatrix::from_triangle(Arc::clone(&self.triangle));
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// Definite matrix `sign · F Fᵗ` with a triangular factor `F`.
///
/// When `inverted` is set, `F` is the inverse of the stored triangular
/// array. The inverse of the matrix is held the same way with factor `F⁻ᵗ`,
/// so no inverse array is ever formed. Gradients are taken with respect to
/// the stored triangular array.
#[derive(Debug)]
pub struct TriangularFactoredDefiniteMatrix<K: Definiteness = General> {
    triangle: Arc<Triangle>,
    lower: bool,
    inverted: bool,
    sign: Sign,
    factor: InvertibleMatrixRef,
    factor_t: MatrixRef,
    inv: OnceCell<Arc<TriangularFactoredDefiniteMatrix<K>>>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
    _definiteness: PhantomData<K>,
}

pub type TriangularFactoredPositiveDefiniteMatrix = TriangularFactoredDefiniteMatrix<Positive>;

impl TriangularFactoredDefiniteMatrix<General> {
    pub fn new(factor: Array2<f64>, lower: bool, sign: Sign) -> Result<Self> {
        Self::from_parts(factor, lower, false, sign)
    }
}

impl TriangularFactoredDefiniteMatrix<Positive> {
    pub fn positive(factor: Array2<f64>, lower: bool) -> Result<Self> {
        Self::from_parts(factor, lower, false, Sign::Positive)
    }
}

impl<K: Definiteness> TriangularFactoredDefiniteMatrix<K> {
    pub(crate) fn from_parts(factor_array: Array2<f64>, lower: bool, inverted: bool, sign: Sign) -> Result<Self> {
        if K::POSITIVE && sign == Sign::Negative {
            return Err(MatrixError::CategoryMismatch(
                "positive definite factored matrix cannot carry a negative sign".to_string(),
            ));
        }
        let triangle = Arc::new(Triangle::new(factor_array.view(), lower)?);
        triangle.ensure_nonsingular()?;
        let factor: InvertibleMatrixRef = if inverted {
            Arc::new(InverseTriangularMatrix::from_triangle(Arc::clone(&triangle))?)
        } else {
            Arc::new(TriangularMatrix::from_triangle(Arc::clone(&triangle)))
        };
        let factor_t = Arc::clone(&factor).transpose();
        Ok(TriangularFactoredDefiniteMatrix {
            triangle,
            lower,
            inverted,
            sign,
            factor,
            factor_t,
            inv: OnceCell::new(),
            eigen: OnceCell::new(),
            _definiteness: PhantomData,
        })
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn lower(&self) -> bool {
        self.lower
    }

    /// The factor `F`, triangular or inverse triangular.
    pub fn factor(&self) -> &InvertibleMatrixRef {
        &self.factor
    }

    fn size(&self) -> usize {
        self.triangle.size()
    }

    fn eigen(&self) -> Result<&(Array1<f64>, Arc<OrthogonalMatrix>)> {
        self.eigen.get_or_try_init(|| {
            let (values, vectors) = eigh(self.array()?.view())?;
            Ok((values, Arc::new(OrthogonalMatrix::new(vectors)?)))
        })
    }

    fn inverse(&self) -> Result<&Arc<TriangularFactoredDefiniteMatrix<K>>> {
        self.inv.get_or_try_init(|| {
            debug!("building inverse of {0}x{0} triangular factored matrix", self.size());
            let inverse = TriangularFactoredDefiniteMatrix::<K>::from_parts(
                self.triangle.array.t().to_owned(),
                !self.lower,
                !self.inverted,
                self.sign,
            )?;
            Ok(Arc::new(inverse))
        })
    }

    fn triangle_at(&self, parameters: ArrayViewD<f64>) -> Result<Array2<f64>> {
        let array = square_parameter(parameters, self.size())?;
        Ok(triangle(array, self.lower))
    }
}

impl<K: Definiteness> Matrix for TriangularFactoredDefiniteMatrix<K> {
    fn shape(&self) -> Option<(usize, usize)> {
        self.triangle.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        let inner = self.factor_t.lmult(other)?;
        Ok(self.factor.lmult(inner.view())? * self.sign.value())
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        let inner = self.factor.rmult(other)?;
        Ok(self.factor_t.rmult(inner.view())? * self.sign.value())
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        let factor = self.factor.array()?;
        Ok(factor.dot(&factor.t()) * self.sign.value())
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl<K: Definiteness> SquareMatrix for TriangularFactoredDefiniteMatrix<K> {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(2.0 * self.factor.log_abs_det()?)
    }
}

impl<K: Definiteness> SymmetricMatrix for TriangularFactoredDefiniteMatrix<K> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen()?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen()?.1))
    }
}

impl<K: Definiteness> InvertibleMatrix for TriangularFactoredDefiniteMatrix<K> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        let inverse: InvertibleMatrixRef = self.inverse()?.clone();
        Ok(inverse)
    }
}

impl PositiveDefiniteMatrix for TriangularFactoredDefiniteMatrix<Positive> {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        Ok(Arc::clone(&self.factor))
    }
}

impl<K: Definiteness> DifferentiableMatrix for TriangularFactoredDefiniteMatrix<K> {
    fn parameters(&self) -> ArrayD<f64> {
        self.triangle.array.clone().into_dyn()
    }

    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64> {
        let array = self.triangle_at(parameters)?;
        let log_abs_det: f64 = array.diag().iter().map(|d| d.abs().ln()).sum();
        Ok(if self.inverted { -2.0 * log_abs_det } else { 2.0 * log_abs_det })
    }

    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64> {
        let array = self.triangle_at(parameters)?;
        check_len("quadratic form", self.size(), vector.len())?;
        // (sign F Fᵗ)⁻¹ = sign F⁻ᵗ F⁻¹
        let reduced = if self.inverted {
            array.dot(&vector)
        } else {
            let column = vector.insert_axis(Axis(1));
            let factor = to_nalgebra(array.view());
            solve_triangular(&factor, column, self.lower, false)?.remove_axis(Axis(1))
        };
        Ok(self.sign.value() * reduced.dot(&reduced))
    }

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>> {
        let scale = if self.inverted { -2.0 } else { 2.0 };
        let diagonal = self.triangle.array.diag().mapv(|d| scale / d);
        Ok(Array2::from_diag(&diagonal).into_dyn())
    }

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>> {
        check_len("quadratic form", self.size(), vector.len())?;
        let sign = self.sign.value();
        let outer = if self.inverted {
            // q = sign |T v|², dq/dT = 2 sign (T v) vᵗ
            let reduced = self.triangle.array.dot(&vector);
            let left = reduced.insert_axis(Axis(1));
            left.dot(&vector.insert_axis(Axis(0))) * (2.0 * sign)
        } else {
            // q = sign |w|² with w = T⁻¹ v, dq/dT = -2 sign (T⁻ᵗ w) wᵗ
            let reduced = self.triangle.solve(vector.insert_axis(Axis(1)), false)?;
            let back = self.triangle.solve(reduced.view(), true)?;
            back.dot(&reduced.t()) * (-2.0 * sign)
        };
        Ok(triangle(outer.view(), self.lower).into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Checker};
    use crate::traits::is_same;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Ix2};

    #[test]
    fn test_triangular_properties() {
        let mut rng = testing::rng();
        for size in testing::SIZES {
            for lower in [true, false] {
                let array = testing::random_triangular(&mut rng, size, lower);
                let matrix = Arc::new(TriangularMatrix::new(array.clone(), lower).unwrap());
                let checker = Checker::new(&mut rng, size);
                checker.check_explicit(&matrix, &array);
                checker.check_square(&matrix, &array);
                checker.check_invertible(&matrix, &array);
            }
        }
    }

    #[test]
    fn test_inverse_triangular_properties() {
        let mut rng = testing::rng();
        for size in testing::SIZES {
            for lower in [true, false] {
                let array = testing::random_triangular(&mut rng, size, lower);
                let matrix = Arc::new(InverseTriangularMatrix::new(array.clone(), lower).unwrap());
                let dense = testing::dense_inverse(&array);
                let checker = Checker::new(&mut rng, size);
                checker.check_explicit(&matrix, &dense);
                checker.check_square(&matrix, &dense);
                checker.check_invertible(&matrix, &dense);
            }
        }
    }

    #[test]
    fn test_triangular_masks_other_triangle() {
        let array = array![[1.0, 5.0], [2.0, 3.0]];
        let matrix = TriangularMatrix::new(array, true).unwrap();
        assert_eq!(matrix.array().unwrap(), array![[1.0, 0.0], [2.0, 3.0]]);
    }

    #[test]
    fn test_triangular_transpose_flips_orientation() {
        let array = array![[1.0, 0.0], [2.0, 3.0]];
        let matrix = Arc::new(TriangularMatrix::new(array.clone(), true).unwrap());
        let transposed = Arc::clone(&matrix).transpose();
        assert_eq!(transposed.array().unwrap(), array.t());
    }

    #[test]
    fn test_singular_triangular() {
        let array = array![[1.0, 0.0], [2.0, 0.0]];
        let matrix = TriangularMatrix::new(array.clone(), true).unwrap();
        assert!(matches!(matrix.inv(), Err(MatrixError::Factorization(_))));
        assert!(InverseTriangularMatrix::new(array, true).is_err());
    }

    fn factored_dense(p: ArrayViewD<f64>, lower: bool, inverted: bool, sign: f64) -> Array2<f64> {
        let t = triangle(p.into_dimensionality::<Ix2>().unwrap(), lower);
        let f = if inverted { testing::dense_inverse(&t) } else { t };
        f.dot(&f.t()) * sign
    }

    #[test]
    fn test_factored_positive_definite_properties() {
        let mut rng = testing::rng();
        for size in testing::SIZES {
            for lower in [true, false] {
                let factor = testing::random_triangular(&mut rng, size, lower);
                let matrix = Arc::new(TriangularFactoredDefiniteMatrix::positive(factor.clone(), lower).unwrap());
                let dense = factor.dot(&factor.t());
                let checker = Checker::new(&mut rng, size);
                checker.check_explicit(&matrix, &dense);
                checker.check_symmetric(&matrix, &dense);
                checker.check_invertible(&matrix, &dense);
                checker.check_positive_definite(&matrix, &dense);
                checker.check_differentiable(&matrix, |p| factored_dense(p, lower, false, 1.0));
            }
        }
    }

    #[test]
    fn test_factored_negative_definite_properties() {
        let mut rng = testing::rng();
        for size in testing::SIZES {
            for lower in [true, false] {
                let factor = testing::random_triangular(&mut rng, size, lower);
                let matrix = Arc::new(
                    TriangularFactoredDefiniteMatrix::new(factor.clone(), lower, Sign::Negative).unwrap(),
                );
                let dense = -factor.dot(&factor.t());
                let checker = Checker::new(&mut rng, size);
                checker.check_explicit(&matrix, &dense);
                checker.check_symmetric(&matrix, &dense);
                checker.check_invertible(&matrix, &dense);
                checker.check_differentiable(&matrix, |p| factored_dense(p, lower, false, -1.0));
            }
        }
    }

    #[test]
    fn test_factored_inverse_uses_inverted_factor() {
        let mut rng = testing::rng();
        for size in testing::SIZES {
            let factor = testing::random_triangular(&mut rng, size, true);
            let matrix = TriangularFactoredDefiniteMatrix::positive(factor.clone(), true).unwrap();
            let inverse = Arc::clone(matrix.inverse().unwrap());
            assert!(inverse.inverted);
            assert!(!inverse.lower());
            let dense = testing::dense_inverse(&factor.dot(&factor.t()));
            let checker = Checker::new(&mut rng, size);
            checker.check_explicit(&inverse, &dense);
            checker.check_symmetric(&inverse, &dense);
            checker.check_positive_definite(&inverse, &dense);
            checker.check_differentiable(&inverse, |p| factored_dense(p, false, true, 1.0));
        }
    }

    #[test]
    fn test_factored_sqrt_is_factor() {
        let factor = array![[2.0, 0.0], [1.0, 3.0]];
        let matrix = TriangularFactoredDefiniteMatrix::positive(factor, true).unwrap();
        assert!(is_same(&matrix.sqrt().unwrap(), matrix.factor()));
        assert_abs_diff_eq!(matrix.log_abs_det().unwrap(), 2.0 * 6.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_factored_rejects_singular_factor() {
        let factor = array![[0.0, 0.0], [1.0, 3.0]];
        assert!(matches!(
            TriangularFactoredDefiniteMatrix::positive(factor, true),
            Err(MatrixError::Factorization(_))
        ));
    }
}
