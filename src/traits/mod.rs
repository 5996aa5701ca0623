//! Capability traits shared by every structured matrix.
//!
//! A concrete matrix implements the subset of [`Matrix`], [`SquareMatrix`],
//! [`SymmetricMatrix`], [`InvertibleMatrix`], [`PositiveDefiniteMatrix`] and
//! [`DifferentiableMatrix`] that its structure supports, so only
//! positive-definite matrices expose `sqrt()`, only invertible ones expose
//! `inv()`, and so on. Matrices are immutable and shared through `Arc`
//! handles; derived quantities are cached inside each instance.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};

use crate::autodiff::Differentiator;
use crate::error::Result;
use crate::orthogonal::OrthogonalMatrix;
use crate::view::ScaledMatrix;

pub type MatrixRef = Arc<dyn Matrix>;
pub type SquareMatrixRef = Arc<dyn SquareMatrix>;
pub type SymmetricMatrixRef = Arc<dyn SymmetricMatrix>;
pub type InvertibleMatrixRef = Arc<dyn InvertibleMatrix>;
pub type SymmetricInvertibleMatrixRef = Arc<dyn SymmetricInvertibleMatrix>;
pub type PositiveDefiniteMatrixRef = Arc<dyn PositiveDefiniteMatrix>;
pub type DifferentiableMatrixRef = Arc<dyn DifferentiableMatrix>;

/// A linear operator with a fixed or implicit shape.
pub trait Matrix: fmt::Debug + Send + Sync + 'static {
    /// `(rows, cols)`, or `None` when the size is implicit and taken from
    /// each operand.
    fn shape(&self) -> Option<(usize, usize)>;

    /// `self @ other`.
    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// `other @ self`.
    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// The transposed operator. Symmetric matrices return `self` unchanged.
    fn transpose(self: Arc<Self>) -> MatrixRef;

    /// Dense array of an explicit-shape matrix.
    fn array(&self) -> Result<Array2<f64>>;

    fn diagonal(&self) -> Result<Array1<f64>> {
        Ok(self.array()?.diag().to_owned())
    }

    /// Set by symmetric matrices, whose transpose is the same instance.
    fn is_symmetric(&self) -> bool {
        false
    }

    fn lmult_vector(&self, vector: ArrayView1<f64>) -> Result<Array1<f64>> {
        let column = vector.insert_axis(Axis(1));
        Ok(self.lmult(column)?.remove_axis(Axis(1)))
    }

    fn rmult_vector(&self, vector: ArrayView1<f64>) -> Result<Array1<f64>> {
        let row = vector.insert_axis(Axis(0));
        Ok(self.rmult(row)?.remove_axis(Axis(0)))
    }

    /// `vᵗ A v`
    fn quadratic_form(&self, vector: ArrayView1<f64>) -> Result<f64> {
        Ok(vector.dot(&self.lmult_vector(vector)?))
    }
}

pub trait SquareMatrix: Matrix {
    /// `log |det A|`, computed from the structure of each matrix.
    fn log_abs_det(&self) -> Result<f64>;
}

pub trait SymmetricMatrix: SquareMatrix {
    /// Eigenvalues in ascending order.
    fn eigenvalues(&self) -> Result<Array1<f64>>;

    /// Orthogonal matrix whose columns are the eigenvectors, ordered to match
    /// [`SymmetricMatrix::eigenvalues`].
    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>>;
}

pub trait InvertibleMatrix: SquareMatrix {
    /// The inverse operator, built at most once per instance.
    ///
    /// `inv().inv()` is algebraically equal to `self` but need not be the
    /// same instance.
    fn inv(&self) -> Result<InvertibleMatrixRef>;
}

/// Symmetric matrices that are also invertible; implemented automatically.
pub trait SymmetricInvertibleMatrix: SymmetricMatrix + InvertibleMatrix {}

impl<M: SymmetricMatrix + InvertibleMatrix + ?Sized> SymmetricInvertibleMatrix for M {}

pub trait PositiveDefiniteMatrix: SymmetricMatrix + InvertibleMatrix {
    /// A factor `L` with `L Lᵗ = A`.
    fn sqrt(&self) -> Result<InvertibleMatrixRef>;
}

/// Matrices defined by a parameter tensor, with gradients of `log |det A|`
/// and of `vᵗ A⁻¹ v` with respect to it.
pub trait DifferentiableMatrix: InvertibleMatrix {
    /// The parameter tensor the matrix was built from.
    fn parameters(&self) -> ArrayD<f64>;

    /// `log |det A(p)|` for an arbitrary parameter tensor `p`.
    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64>;

    /// `vᵗ A(p)⁻¹ v` for an arbitrary parameter tensor `p`.
    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64>;

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>>;

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>>;

    /// Gradient of `log |det A|` obtained from an injected differentiator
    /// instead of the closed form.
    fn grad_log_abs_det_with(&self, differentiator: &dyn Differentiator) -> Result<ArrayD<f64>> {
        let parameters = self.parameters();
        differentiator.gradient(&|p| self.log_abs_det_at(p), parameters.view())
    }

    fn grad_quadratic_form_inv_with(
        &self,
        differentiator: &dyn Differentiator,
        vector: ArrayView1<f64>,
    ) -> Result<ArrayD<f64>> {
        let parameters = self.parameters();
        differentiator.gradient(
            &|p| self.quadratic_form_inv_at(p, vector.view()),
            parameters.view(),
        )
    }
}

/// Marks whether a structured matrix is known to be positive definite.
pub trait Definiteness: fmt::Debug + Send + Sync + 'static {
    const POSITIVE: bool;
}

/// No definiteness guarantee; the matrix may be indefinite or negative
/// definite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct General;

/// Positive definite; enables [`PositiveDefiniteMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positive;

impl Definiteness for General {
    const POSITIVE: bool = false;
}

impl Definiteness for Positive {
    const POSITIVE: bool = true;
}

/// Sign of a definite matrix built as `sign · F Fᵗ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    pub fn value(self) -> f64 {
        match self {
            Sign::Positive => 1.0,
            Sign::Negative => -1.0,
        }
    }
}

/// Whether two handles point at the same matrix instance.
pub fn is_same<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Scalar multiplication, division and negation for any matrix handle.
///
/// The result wraps the original handle without copying its storage and keeps
/// its square, symmetric and invertible capabilities.
pub trait MatrixExt<M: ?Sized> {
    fn scalar_multiply(&self, scalar: f64) -> Arc<ScaledMatrix<M>>;

    fn scalar_divide(&self, scalar: f64) -> Arc<ScaledMatrix<M>> {
        self.scalar_multiply(1.0 / scalar)
    }

    fn negate(&self) -> Arc<ScaledMatrix<M>> {
        self.scalar_multiply(-1.0)
    }
}

impl<M: Matrix + ?Sized> MatrixExt<M> for Arc<M> {
    fn scalar_multiply(&self, scalar: f64) -> Arc<ScaledMatrix<M>> {
        Arc::new(ScaledMatrix::new(scalar, Arc::clone(self)))
    }
}
