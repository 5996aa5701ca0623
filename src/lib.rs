pub mod autodiff;
pub mod block;
pub mod dense;
pub mod diagonal;
pub mod eigen;
pub mod error;
pub mod identity;
pub mod orthogonal;
pub mod traits;
pub mod triangular;
pub mod view;
mod linalg;
mod utils;

#[cfg(test)]
mod testing;

pub use autodiff::{CentralDifference, Differentiator, ScalarFn};
pub use block::{PositiveDefiniteBlockDiagonalMatrix, SquareBlockDiagonalMatrix, SymmetricBlockDiagonalMatrix};
pub use dense::{
    DenseDefiniteMatrix, DenseNegativeDefiniteMatrix, DensePositiveDefiniteMatrix, DenseSquareMatrix,
    InverseLuFactoredSquareMatrix,
};
pub use diagonal::{DiagonalMatrix, PositiveDiagonalMatrix};
pub use eigen::{
    softabs, EigendecomposedPositiveDefiniteMatrix, EigendecomposedSymmetricMatrix,
    SoftAbsRegularisedPositiveDefiniteMatrix,
};
pub use error::{MatrixError, Result};
pub use identity::{IdentityMatrix, PositiveScaledIdentityMatrix, ScaledIdentityMatrix};
pub use linalg::LuFactor;
pub use orthogonal::{OrthogonalMatrix, ScaledOrthogonalMatrix};
pub use traits::*;
pub use triangular::{
    InverseTriangularMatrix, TriangularFactoredDefiniteMatrix, TriangularFactoredPositiveDefiniteMatrix,
    TriangularMatrix,
};
pub use view::{ScaledMatrix, TransposedMatrix};
