//! Shape checks and parameter views shared by every matrix.

use ndarray::{ArrayBase, ArrayView2, ArrayViewD, Data, Ix2};

use crate::error::{MatrixError, Result};

pub(crate) fn check_square<S: Data>(array: &ArrayBase<S, Ix2>) -> Result<usize> {
    let (rows, cols) = array.dim();
    if rows != cols {
        return Err(MatrixError::not_square(rows, cols));
    }
    Ok(rows)
}

/// `A @ other` needs `other` to have as many rows as `A` has columns.
pub(crate) fn check_lmult(shape: Option<(usize, usize)>, other: &ArrayView2<f64>) -> Result<()> {
    if let Some((_, cols)) = shape {
        if other.nrows() != cols {
            return Err(MatrixError::ShapeMismatch {
                operation: "lmult",
                expected: cols,
                found: other.nrows(),
            });
        }
    }
    Ok(())
}

/// `other @ A` needs `other` to have as many columns as `A` has rows.
pub(crate) fn check_rmult(shape: Option<(usize, usize)>, other: &ArrayView2<f64>) -> Result<()> {
    if let Some((rows, _)) = shape {
        if other.ncols() != rows {
            return Err(MatrixError::ShapeMismatch {
                operation: "rmult",
                expected: rows,
                found: other.ncols(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_len(operation: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(MatrixError::ShapeMismatch {
            operation,
            expected,
            found,
        });
    }
    Ok(())
}

/// View a parameter tensor as the `size × size` array a matrix was built from.
pub(crate) fn square_parameter(parameters: ArrayViewD<f64>, size: usize) -> Result<ArrayView2<f64>> {
    let array = parameters.into_dimensionality::<Ix2>().map_err(|_| {
        MatrixError::CategoryMismatch("matrix parameter must be two-dimensional".to_string())
    })?;
    check_len("matrix parameter", size, array.nrows())?;
    check_len("matrix parameter", size, array.ncols())?;
    Ok(array)
}
