use criterion::measurement::Measurement;
use criterion::{criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::distr::{Distribution, Uniform};
use rand::{rngs::StdRng, SeedableRng};
use single_matrices::{
    DenseDefiniteMatrix, DenseSquareMatrix, DiagonalMatrix, InvertibleMatrix, Matrix, PositiveDefiniteBlockDiagonalMatrix,
    PositiveDefiniteMatrixRef, SoftAbsRegularisedPositiveDefiniteMatrix, SquareMatrix,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct StructuredMatrixConfig {
    seed: u64,
    sizes: Vec<usize>,
    block_counts: Vec<usize>,
    measurement_time: u64,
    sample_size: usize,
}

impl Default for StructuredMatrixConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sizes: vec![10, 100, 500],
            block_counts: vec![4, 16],
            measurement_time: 10,
            sample_size: 10,
        }
    }
}

fn random_array(rows: usize, cols: usize, seed: u64) -> anyhow::Result<Array2<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::try_from(-1.0..1.0)?;
    Ok(Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut rng)))
}

fn random_positive_definite(size: usize, seed: u64) -> anyhow::Result<Array2<f64>> {
    let array = random_array(size, size, seed)?;
    Ok(array.dot(&array.t()) / size as f64 + Array2::<f64>::eye(size))
}

fn block_diagonal(size: usize, blocks: usize, seed: u64) -> anyhow::Result<PositiveDefiniteBlockDiagonalMatrix> {
    let block_size = (size / blocks).max(1);
    let mut parts: Vec<PositiveDefiniteMatrixRef> = Vec::with_capacity(blocks);
    for index in 0..blocks {
        let array = random_positive_definite(block_size, seed + index as u64)?;
        parts.push(Arc::new(DenseDefiniteMatrix::positive(array)?));
    }
    Ok(PositiveDefiniteBlockDiagonalMatrix::new(parts)?)
}

fn configure_group<'a, M: Measurement>(
    c: &'a mut Criterion<M>,
    name: &str,
    config: &StructuredMatrixConfig,
) -> BenchmarkGroup<'a, M> {
    let mut group = c.benchmark_group(name);
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);
    group
}

pub fn bench_multiplication(c: &mut Criterion) {
    let config = StructuredMatrixConfig::default();
    let mut group = configure_group(c, "Structured_Multiplication", &config);

    for &size in config.sizes.iter() {
        let seed = config.seed + size as u64;
        let operand = random_array(size, size, seed).unwrap();
        let dense = DenseSquareMatrix::new(random_array(size, size, seed + 1).unwrap()).unwrap();
        let diagonal = DiagonalMatrix::new(Array1::linspace(1.0, 2.0, size));

        group.bench_with_input(BenchmarkId::new("dense_lmult", size), &size, |b, _| {
            b.iter(|| dense.lmult(operand.view()).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("diagonal_lmult", size), &size, |b, _| {
            b.iter(|| diagonal.lmult(operand.view()).unwrap());
        });

        for &blocks in config.block_counts.iter() {
            let matrix = block_diagonal(size, blocks, seed).unwrap();
            let n = matrix.shape().map(|(rows, _)| rows).unwrap_or(size);
            let operand = random_array(n, n, seed + 2).unwrap();
            group.bench_with_input(
                BenchmarkId::new("block_diagonal_lmult", format!("{}_b{}", size, blocks)),
                &(size, blocks),
                |b, _| {
                    b.iter(|| matrix.lmult(operand.view()).unwrap());
                },
            );
        }
    }
    group.finish();
}

pub fn bench_factorizations(c: &mut Criterion) {
    let config = StructuredMatrixConfig::default();
    let mut group = configure_group(c, "Structured_Factorizations", &config);

    for &size in config.sizes.iter() {
        let seed = config.seed + size as u64;
        let positive = random_positive_definite(size, seed).unwrap();
        let square = random_array(size, size, seed + 1).unwrap() + Array2::<f64>::eye(size) * 2.0;

        // Cholesky at construction
        group.bench_with_input(BenchmarkId::new("dense_definite_new", size), &size, |b, _| {
            b.iter(|| DenseDefiniteMatrix::positive(positive.clone()).unwrap());
        });

        // Lazy LU on first use
        group.bench_with_input(BenchmarkId::new("dense_square_log_abs_det", size), &size, |b, _| {
            b.iter(|| {
                let matrix = DenseSquareMatrix::new(square.clone()).unwrap();
                matrix.log_abs_det().unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("dense_square_inv_lmult", size), &size, |b, _| {
            let matrix = DenseSquareMatrix::new(square.clone()).unwrap();
            b.iter(|| matrix.inv().unwrap().lmult(positive.view()).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("softabs_new", size), &size, |b, _| {
            b.iter(|| SoftAbsRegularisedPositiveDefiniteMatrix::new(square.clone(), 1.0).unwrap());
        });
    }
    group.finish();
}

criterion_group!(structured_benches, bench_multiplication, bench_factorizations);
criterion_main!(structured_benches);
