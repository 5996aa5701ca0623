//! Block-diagonal composites of square matrices.
//!
//! Products split the operand into row (`lmult`) or column (`rmult`) slices
//! matching the blocks and evaluate each block on its own slice in parallel.

use std::ops::Range;
use std::sync::Arc;

use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use crate::error::{MatrixError, Result};
use crate::linalg::sort_eigenpairs;
use crate::orthogonal::OrthogonalMatrix;
use crate::traits::{
    InvertibleMatrix, InvertibleMatrixRef, Matrix, MatrixRef, PositiveDefiniteMatrix,
    PositiveDefiniteMatrixRef, SquareMatrix, SymmetricInvertibleMatrix, SymmetricInvertibleMatrixRef,
    SymmetricMatrix,
};
use crate::utils::{check_lmult, check_rmult};
use crate::view::TransposedMatrix;

#[derive(Debug)]
struct Blocks<B: ?Sized> {
    blocks: Vec<Arc<B>>,
    ranges: Vec<Range<usize>>,
    size: usize,
}

impl<B: SquareMatrix + ?Sized> Blocks<B> {
    fn new(blocks: Vec<Arc<B>>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(MatrixError::CategoryMismatch(
                "block diagonal matrix needs at least one block".to_string(),
            ));
        }
        let mut ranges = Vec::with_capacity(blocks.len());
        let mut size = 0;
        for (index, block) in blocks.iter().enumerate() {
            let (rows, cols) = block.shape().ok_or_else(|| {
                MatrixError::CategoryMismatch(format!("block {index} has an implicit shape"))
            })?;
            if rows != cols {
                return Err(MatrixError::CategoryMismatch(format!(
                    "block {index} with shape ({rows}, {cols}) is not square"
                )));
            }
            ranges.push(size..size + rows);
            size += rows;
        }
        debug!("assembled {} blocks into a {size}x{size} block diagonal matrix", blocks.len());
        Ok(Blocks { blocks, ranges, size })
    }

    fn shape(&self) -> Option<(usize, usize)> {
        Some((self.size, self.size))
    }

    /// Same partition with different blocks of matching shapes.
    fn with_blocks<C: ?Sized>(&self, blocks: Vec<Arc<C>>) -> Blocks<C> {
        Blocks {
            blocks,
            ranges: self.ranges.clone(),
            size: self.size,
        }
    }

    fn map<C: ?Sized, F>(&self, f: F) -> Result<Blocks<C>>
    where
        F: Fn(&Arc<B>) -> Result<Arc<C>>,
    {
        let blocks = self.blocks.iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(self.with_blocks(blocks))
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_lmult(self.shape(), &other)?;
        trace!("block diagonal lmult over {} blocks", self.blocks.len());
        let parts = self
            .blocks
            .par_iter()
            .zip(self.ranges.par_iter())
            .map(|(block, range)| block.lmult(other.slice(s![range.clone(), ..])))
            .collect::<Result<Vec<_>>>()?;
        let mut result = Array2::zeros((self.size, other.ncols()));
        for (part, range) in parts.iter().zip(&self.ranges) {
            result.slice_mut(s![range.clone(), ..]).assign(part);
        }
        Ok(result)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_rmult(self.shape(), &other)?;
        trace!("block diagonal rmult over {} blocks", self.blocks.len());
        let parts = self
            .blocks
            .par_iter()
            .zip(self.ranges.par_iter())
            .map(|(block, range)| block.rmult(other.slice(s![.., range.clone()])))
            .collect::<Result<Vec<_>>>()?;
        let mut result = Array2::zeros((other.nrows(), self.size));
        for (part, range) in parts.iter().zip(&self.ranges) {
            result.slice_mut(s![.., range.clone()]).assign(part);
        }
        Ok(result)
    }

    fn array(&self) -> Result<Array2<f64>> {
        let mut result = Array2::zeros((self.size, self.size));
        for (block, range) in self.blocks.iter().zip(&self.ranges) {
            result.slice_mut(s![range.clone(), range.clone()]).assign(&block.array()?);
        }
        Ok(result)
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        let mut result = Array1::zeros(self.size);
        for (block, range) in self.blocks.iter().zip(&self.ranges) {
            result.slice_mut(s![range.clone()]).assign(&block.diagonal()?);
        }
        Ok(result)
    }

    fn log_abs_det(&self) -> Result<f64> {
        self.blocks.iter().map(|block| block.log_abs_det()).sum()
    }
}

impl<B: SymmetricMatrix + ?Sized> Blocks<B> {
    fn eigen(&self) -> Result<(Array1<f64>, Arc<OrthogonalMatrix>)> {
        let mut values = Array1::zeros(self.size);
        let mut vectors = Array2::zeros((self.size, self.size));
        for (block, range) in self.blocks.iter().zip(&self.ranges) {
            values.slice_mut(s![range.clone()]).assign(&block.eigenvalues()?);
            vectors
                .slice_mut(s![range.clone(), range.clone()])
                .assign(&block.eigenvectors()?.as_array());
        }
        let (values, vectors) = sort_eigenpairs(values, vectors);
        Ok((values, Arc::new(OrthogonalMatrix::new(vectors)?)))
    }
}

impl<B: InvertibleMatrix + ?Sized> Blocks<B> {
    fn inverse(&self) -> Result<SquareBlockDiagonalMatrix> {
        let blocks = self.map(|block| block.inv())?;
        Ok(SquareBlockDiagonalMatrix::from_blocks(blocks))
    }
}

/// Block-diagonal matrix with invertible square blocks.
#[derive(Debug)]
pub struct SquareBlockDiagonalMatrix {
    blocks: Blocks<dyn InvertibleMatrix>,
    inv: OnceCell<InvertibleMatrixRef>,
}

impl SquareBlockDiagonalMatrix {
    /// Fails with [`MatrixError::CategoryMismatch`] if `blocks` is empty or a
    /// block has an implicit or non-square shape.
    pub fn new(blocks: Vec<InvertibleMatrixRef>) -> Result<Self> {
        Ok(Self::from_blocks(Blocks::new(blocks)?))
    }

    fn from_blocks(blocks: Blocks<dyn InvertibleMatrix>) -> Self {
        SquareBlockDiagonalMatrix {
            blocks,
            inv: OnceCell::new(),
        }
    }

    pub fn blocks(&self) -> &[InvertibleMatrixRef] {
        &self.blocks.blocks
    }
}

impl Matrix for SquareBlockDiagonalMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.blocks.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.lmult(other)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.rmult(other)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        let transposed = self
            .blocks
            .blocks
            .iter()
            .map(|block| Arc::new(TransposedMatrix::new(Arc::clone(block))) as InvertibleMatrixRef)
            .collect();
        Arc::new(Self::from_blocks(self.blocks.with_blocks(transposed)))
    }

    fn array(&self) -> Result<Array2<f64>> {
        self.blocks.array()
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        self.blocks.diagonal()
    }
}

impl SquareMatrix for SquareBlockDiagonalMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        self.blocks.log_abs_det()
    }
}

impl InvertibleMatrix for SquareBlockDiagonalMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| Ok(Arc::new(self.blocks.inverse()?) as InvertibleMatrixRef)).cloned()
    }
}

/// Block-diagonal matrix with symmetric invertible blocks.
///
/// The inverse is a [`SquareBlockDiagonalMatrix`] of the block inverses.
#[derive(Debug)]
pub struct SymmetricBlockDiagonalMatrix {
    blocks: Blocks<dyn SymmetricInvertibleMatrix>,
    inv: OnceCell<InvertibleMatrixRef>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
}

impl SymmetricBlockDiagonalMatrix {
    pub fn new(blocks: Vec<SymmetricInvertibleMatrixRef>) -> Result<Self> {
        Ok(SymmetricBlockDiagonalMatrix {
            blocks: Blocks::new(blocks)?,
            inv: OnceCell::new(),
            eigen: OnceCell::new(),
        })
    }

    pub fn blocks(&self) -> &[SymmetricInvertibleMatrixRef] {
        &self.blocks.blocks
    }
}

impl Matrix for SymmetricBlockDiagonalMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.blocks.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.lmult(other)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.rmult(other)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        self.blocks.array()
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        self.blocks.diagonal()
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl SquareMatrix for SymmetricBlockDiagonalMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        self.blocks.log_abs_det()
    }
}

impl SymmetricMatrix for SymmetricBlockDiagonalMatrix {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen.get_or_try_init(|| self.blocks.eigen())?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen.get_or_try_init(|| self.blocks.eigen())?.1))
    }
}

impl InvertibleMatrix for SymmetricBlockDiagonalMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| Ok(Arc::new(self.blocks.inverse()?) as InvertibleMatrixRef)).cloned()
    }
}

/// Block-diagonal matrix with positive definite blocks.
///
/// The square root is a [`SquareBlockDiagonalMatrix`] of the block square
/// roots.
#[derive(Debug)]
pub struct PositiveDefiniteBlockDiagonalMatrix {
    blocks: Blocks<dyn PositiveDefiniteMatrix>,
    inv: OnceCell<InvertibleMatrixRef>,
    sqrt: OnceCell<InvertibleMatrixRef>,
    eigen: OnceCell<(Array1<f64>, Arc<OrthogonalMatrix>)>,
}

impl PositiveDefiniteBlockDiagonalMatrix {
    pub fn new(blocks: Vec<PositiveDefiniteMatrixRef>) -> Result<Self> {
        Ok(PositiveDefiniteBlockDiagonalMatrix {
            blocks: Blocks::new(blocks)?,
            inv: OnceCell::new(),
            sqrt: OnceCell::new(),
            eigen: OnceCell::new(),
        })
    }

    pub fn blocks(&self) -> &[PositiveDefiniteMatrixRef] {
        &self.blocks.blocks
    }
}

impl Matrix for PositiveDefiniteBlockDiagonalMatrix {
    fn shape(&self) -> Option<(usize, usize)> {
        self.blocks.shape()
    }

    fn lmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.lmult(other)
    }

    fn rmult(&self, other: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.blocks.rmult(other)
    }

    fn transpose(self: Arc<Self>) -> MatrixRef {
        self
    }

    fn array(&self) -> Result<Array2<f64>> {
        self.blocks.array()
    }

    fn diagonal(&self) -> Result<Array1<f64>> {
        self.blocks.diagonal()
    }

    fn is_symmetric(&self) -> bool {
        true
    }
}

impl SquareMatrix for PositiveDefiniteBlockDiagonalMatrix {
    fn log_abs_det(&self) -> Result<f64> {
        self.blocks.log_abs_det()
    }
}

impl SymmetricMatrix for PositiveDefiniteBlockDiagonalMatrix {
    fn eigenvalues(&self) -> Result<Array1<f64>> {
        Ok(self.eigen.get_or_try_init(|| self.blocks.eigen())?.0.clone())
    }

    fn eigenvectors(&self) -> Result<Arc<OrthogonalMatrix>> {
        Ok(Arc::clone(&self.eigen.get_or_try_init(|| self.blocks.eigen())?.1))
    }
}

impl InvertibleMatrix for PositiveDefiniteBlockDiagonalMatrix {
    fn inv(&self) -> Result<InvertibleMatrixRef> {
        self.inv.get_or_try_init(|| Ok(Arc::new(self.blocks.inverse()?) as InvertibleMatrixRef)).cloned()
    }
}

impl PositiveDefiniteMatrix for PositiveDefiniteBlockDiagonalMatrix {
    fn sqrt(&self) -> Result<InvertibleMatrixRef> {
        self.sqrt.get_or_try_init(|| {
            let roots = self.blocks.map(|block| block.sqrt())?;
            Ok(Arc::new(SquareBlockDiagonalMatrix::from_blocks(roots)) as InvertibleMatrixRef)
        })
        .cloned()
    }
}
