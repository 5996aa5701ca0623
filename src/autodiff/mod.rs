//! Differentiation capability used to obtain parameter gradients.
//!
//! Differentiable matrices ship hand-derived gradients, but any scalar
//! function of their parameters can also be differentiated by an injected
//! [`Differentiator`]. [`CentralDifference`] is the numerical fallback:
//!
//! ```text
//! ∂f/∂xᵢ ≈ [f(x + h eᵢ) - f(x - h eᵢ)] / (2h)
//! ```

use log::trace;
use ndarray::{ArrayD, ArrayViewD, Dimension};

use crate::error::{MatrixError, Result};

/// A scalar function of a parameter tensor.
pub type ScalarFn<'a> = dyn Fn(ArrayViewD<'_, f64>) -> Result<f64> + 'a;

/// Computes the gradient of a scalar function at a point.
///
/// Implementations must be free of side effects and deterministic for fixed
/// inputs; the returned tensor has the shape of `at`.
pub trait Differentiator: Send + Sync {
    fn gradient(&self, function: &ScalarFn<'_>, at: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>>;
}

/// Central finite differences with a fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralDifference {
    step: f64,
}

impl CentralDifference {
    pub fn new(step: f64) -> Result<Self> {
        if !(step > 0.0 && step.is_finite()) {
            return Err(MatrixError::CategoryMismatch(format!(
                "finite difference step must be positive and finite, got {step}"
            )));
        }
        Ok(CentralDifference { step })
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

impl Default for CentralDifference {
    fn default() -> Self {
        CentralDifference { step: 1e-6 }
    }
}

impl Differentiator for CentralDifference {
    fn gradient(&self, function: &ScalarFn<'_>, at: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        trace!("central difference gradient over {} parameters", at.len());
        let mut point = at.to_owned();
        let mut gradient = ArrayD::<f64>::zeros(at.raw_dim());
        let indices: Vec<_> = gradient.indexed_iter().map(|(index, _)| index).collect();
        for index in indices {
            let index = index.slice();
            let original = point[index];

            point[index] = original + self.step;
            let forward = function(point.view())?;
            point[index] = original - self.step;
            let backward = function(point.view())?;
            point[index] = original;

            gradient[index] = (forward - backward) / (2.0 * self.step);
        }
        Ok(gradient)
    }
}
