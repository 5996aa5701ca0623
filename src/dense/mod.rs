//! Dense square and definite matrices backed by LU and Cholesky
//! factorizations of the stored array.

use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};
use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::linalg::{cholesky, eigh, solve_vector, LuFactor};
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    Definiteness, DifferentiableMatrix, General, InvertibleMatrix, InvertibleMatrixRef, Matrix,
    MatrixRef, Positive, PositiveDefiniteMatrix, Sign, SquareMatrix, SymmetricMatrix,
};
use crate::triangular::TriangularFactoredDefiniteMatrix;
use crate::utils::{check_len, check_lmult, check_rmult, check_square, square_parameter};

/// General square matrix stored as a dense array.
///
/// The LU factorization is computed on first use and shared with the
/// transpose and the inverse.
#[derive(Debug)]
pub struct DenseSquareMatrix {
    array: Array2<f64>,
    lu: OnceCell<(Arc<LuFactor>, bool)>,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl DenseSquareMatrix {
    pub fn new(array: Array2<f64>) -> Result<Self> {
        check_square(&array)?;
        Ok(DenseSquareMatrix {
            array,
            lu: OnceCell::new(),
            inv: OnceCell::new(),
        })
    }

    /// Wrap `array` together with an existing factor of it, or of its
    /// transpose when `transposed` is set.
    pub fn from_lu(array: Array2<f64>, lu: Arc<LuFactor>, transposed: bool) -> Result<Self> {
        let size = check_square(&array)?;
        check_len("LU factor", size, lu.size())?;
        let matrix = Self::new(array)?;
        let _ = matrix.lu.set((lu, transposed));
        Ok(matrix)
    }

    fn lu(&self) -> Result<&(Arc<LuFactor>, bool)> {
        self.lu.get_or_try_init(|| Ok((Arc::new(LuFactor::new(self.array.view())?), false)))
    }

    fn transposed(&self) -> DenseSquareMatrix {
        let transposed = DenseSquareMatrix {
            array: self.array.t().to_owned(),
            lu: OnceCell::new(),
            inv: OnceCell::new(),
        };
        if let Some((lu, flag)) = self.lu.get() {
            let _ = transposed.lu.set((Arc::clone(lu), !flag));
        }
        transposed
    }
}

impl Matrix for DenseSquareMatrix {
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

impl SquareMatrix for DenseSquareMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(self.lu()?.0.log_abs_det())
    }
}

impl InvertibleMatrix for DenseSquareMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            let (lu, transposed) = self.lu()?;
            let inverse = InverseLuFactoredSquareMatrix::new(self.array.clone(), Arc::clone(lu), *transposed)?;
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// Inverse of a square array, applied through an LU factorization of that
/// array.
#[derive(Debug)]
pub struct InverseLuFactoredSquareMatrix {
    inverse_array: Array2<f64>,
    lu: Arc<LuFactor>,
    transposed: bool,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl InverseLuFactoredSquareMatrix {
    /// `lu` must factor `inverse_array`, or its transpose when `transposed`
    /// is set.
    pub fn new(inverse_array: Array2<f64>, lu: Arc<LuFactor>, transposed: bool) -> Result<Self> {
        let size = check_square(&inverse_array)?;
        check_len("LU factor", size, lu.size())?;
        Ok(InverseLuFactoredSquareMatrix {
            inverse_array,
            lu,
            transposed,
            inv: OnceCell::new(),
        })
    }

    pub fn from_inverse_array(inverse_array: Array2<f64>) -> Result<Self> {
        let lu = Arc::new(LuFactor::new(inverse_array.view())?);
        Self::new(inverse_array, lu, false)
    }
}

impl Matrix for InverseLuFactoredSquareMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        Some(self.inverse_array.dim())
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        self.lu.solve(other, self.transposed)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        Ok(self.lu.solve(other.t(), !self.transposed)?.reversed_axes())
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        Arc::new(InverseLuFactoredSquareMatrix {
            inverse_array: self.inverse_array.t().to_owned(),
            lu: Arc::clone(&self.lu),
            transposed: !self.transposed,
            inv: OnceCell::new(),
        })
    }

    fn array(&self) -> Result<Array2<f64>> {
        let identity = Array2::eye(self.lu.size());
        self.lu.solve(identity.view(), self.transposed)
    }
}

impl SquareMatrix for InverseLuFactoredSquareMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        Ok(-self.lu.log_abs_det())
    }
}

impl InvertibleMatrix for InverseLuFactoredSquareMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| {
            let inverse =
                DenseSquareMatrix::from_lu(self.inverse_array.clone(), Arc::clone(&self.lu), self.transposed)?;
            Ok(Arc::new(inverse) as InvertibleMatrixRef)
        })
        .cloned()
    }
}

/// Definite symmetric matrix stored as a dense array with a sign.
///
/// The Cholesky factor of `sign · A` is computed at construction, so a
/// non-definite array is rejected with
/// [`MatrixError::Factorization`](crate::MatrixError::Factorization). The
/// inverse and square root come from that factor. Gradients are taken with
/// respect to the full array.
#[derive(Debug)]
pub struct DenseDefiniteMatrix<K: Definiteness = General> {
    array: Array2<f64>,
    sign: Sign,
    factor: Arc<TriangularFactoredDefiniteMatrix<K>>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
}

pub type DensePositiveDefiniteMatrix = DenseDefiniteMatrix<Positive>;

pub type DenseNegativeDefiniteMatrix = DenseDefiniteMatrix<General>;

impl DenseDefiniteMatrix<General> {
    pub fn new(array: Array2<f64>, sign: Sign) -> Result<Self> {
        Self::from_parts(array, sign)
    }

    pub fn negative(array: Array2<f64>) -> Result<Self> {
        Self::from_parts(array, Sign::Negative)
    }
}

impl DenseDefiniteMatrix<Positive> {
    pub fn positive(array: Array2<f64>) -> Result<Self> {
        Self::from_parts(array, Sign::Positive)
    }
}

impl<K: Definiteness> DenseDefiniteMatrix<K> {
    fn from_parts(array: Array2<f64>, sign: Sign) -> Result<Self> {
        check_square(&array)?;
        let signed = &array * sign.value();
        let lower = cholesky(signed.view())?;
        let factor = TriangularFactoredDefiniteMatrix::<K>::from_parts(lower, true, false, sign)?;
        Ok(DenseDefiniteMatrix {
            array,
            sign,
            factor: Arc::new(factor),
            eigen: OnceCell::new(),
        })
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// The triangular factored form `sign · L Lᵗ` of this matrix.
    pub fn factor(&self) -> &Arc<TriangularFactoredDefiniteMatrix<K>> {
        &self.factor
    }

    fn size(&self) -> usize {
        self.array.nrows()
    }

    fn eigen(&self) -> Result<&(Array1<f64>, Arc<OrthogonalMatrix>)> {
        self.eigen.get_or_try_init(|| {
            let (values, vectors) = eigh(self.array.view())?;
            Ok((values, Arc::new(OrthogonalMatrix::new(vectors)?)))
        })
    }
}

impl<K: Definiteness> Matrix for DenseDefiniteMatrix<K> {
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
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        Ok(self.array.clone())
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl<K: Definiteness> SquareMatrix for DenseDefiniteMatrix<K> {
    fn log_abs_det(&self) -> Result<f64> {
        self.factor.log_abs_det()
    }
}

impl<K: Definiteness> SymmetricMatrix for DenseDefiniteMatrix<K> {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen()?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen()?.1))
    }
}

impl<K: Definiteness> InvertibleMatrix for DenseDefiniteMatrix<K> {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.factor.inv()
    }
}

impl PositiveDefiniteMatrix for DenseDefiniteMatrix<Positive> {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        self.factor.sqrt()
    }
}

impl<K: Definiteness> DifferentiableMatrix for DenseDefiniteMatrix<K> {
    fn parameters(&self) -> ArrayD<f64> {
        self.array.clone().into_dyn()
    }

    fn log_abs_det_at(&self, parameters: ArrayViewD<f64>) -> Result<f64> {
        let array = square_parameter(parameters, self.size())?;
        Ok(LuFactor::new(array)?.log_abs_det())
    }

    fn quadratic_form_inv_at(&self, parameters: ArrayViewD<f64>, vector: ArrayView1<f64>) -> Result<f64> {
        let array = square_parameter(parameters, self.size())?;
        Ok(vector.dot(&solve_vector(array, vector)?))
    }

    fn grad_log_abs_det(&self) -> Result<ArrayD<f64>> {
        Ok(self.inv()?.array()?.into_dyn())
    }

    fn grad_quadratic_form_inv(&self, vector: ArrayView1<f64>) -> Result<ArrayD<f64>> {
        check_len("quadratic form", self.size(), vector.len())?;
        debug!("closed-form quadratic form gradient of {0}x{0} dense matrix", self.size());
        let solved = self.inv()?.lmult_vector(vector)?;
        let column = solved.view().insert_axis(Axis(1));
        let row = solved.view().insert_axis(Axis(0));
        Ok((-column.dot(&row)).into_dyn())
    }
}
