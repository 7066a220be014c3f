//! # Log-Gamma Function
//!
//! Element-wise natural logarithm of the gamma function, `ln Γ(x)`, for `x > 0`.
//!
//! The result is composed only of differentiable tensor primitives, so gradients flow
//! through it (the derivative is the digamma function). The argument is first shifted with
//! the recurrence `ln Γ(x) = ln Γ(x + n) - Σ_{i<n} ln(x + i)` and the shifted value is
//! evaluated with the Stirling series truncated after the `z^-7` term. With `n = 6` the
//! truncation error stays below `1e-10` for every positive input.
//!
//! The shift is accumulated as a sum of logarithms rather than a product so large counts
//! do not overflow single-precision backends. `x = 0` yields `+inf`; negative inputs yield
//! NaN.

use burn::prelude::*;

const SHIFT: usize = 6;
const HALF_LN_TWO_PI: f64 = 0.918_938_533_204_672_8;
/// Stirling coefficients for `z^-1`, `z^-3`, `z^-5`, `z^-7`.
const STIRLING: [f64; 4] = [1.0 / 12.0, -1.0 / 360.0, 1.0 / 1260.0, -1.0 / 1680.0];

/// A trait for calculating the log-gamma function on a tensor.
pub trait LogGamma {
    /// Calculates `ln Γ(x)` element-wise.
    fn lgamma(self) -> Self;
}

impl<B: Backend, const D: usize> LogGamma for Tensor<B, D> {
    fn lgamma(self) -> Self {
        lgamma_(self)
    }
}

fn lgamma_<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let mut shift = x.clone().log();
    for i in 1..SHIFT {
        shift = shift + (x.clone() + i as f64).log();
    }

    stirling(x + SHIFT as f64) - shift
}

/// `(z - 1/2) ln z - z + ln(2π)/2 + Σ c_k z^(1-2k)`, valid for large `z`.
fn stirling<B: Backend, const D: usize>(z: Tensor<B, D>) -> Tensor<B, D> {
    let inv = z.clone().recip();
    let inv_sq = inv.clone().powf_scalar(2.0);

    let series = (((inv_sq.clone() * STIRLING[3] + STIRLING[2]) * inv_sq.clone() + STIRLING[1])
        * inv_sq
        + STIRLING[0])
        * inv;

    (z.clone() - 0.5) * z.clone().log() - z + HALF_LN_TWO_PI + series
}

/// Convenience function for the log-gamma function.
pub fn lgamma<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.lgamma()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::{Tensor, TensorData},
    };

    type TestBackend = NdArray<f64>;
    type TestAutodiffBackend = Autodiff<NdArray<f64>>;

    #[test]
    fn lgamma_matches_libm_over_a_wide_range() {
        let device = Default::default();
        let inputs = [0.1, 0.5, 1.0, 2.0, 3.5, 6.0, 10.5, 150.0, 1.0e4, 1.0e7];
        let x = Tensor::<TestBackend, 1>::from_data(TensorData::from(inputs), &device);

        let result = lgamma(x).into_data();

        for (actual, input) in result.iter::<f64>().zip(inputs) {
            let expected = libm::lgamma(input);
            let tolerance = 1e-9 * expected.abs().max(1.0);
            assert!(
                (actual - expected).abs() < tolerance,
                "lgamma({input}) = {actual}, expected {expected}"
            );
        }
    }

    #[test]
    fn lgamma_of_small_integers_is_log_factorial() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 6.0], &device);

        let result: Vec<f64> = x.lgamma().into_data().iter::<f64>().collect();

        assert!(result[0].abs() < 1e-10);
        assert!(result[1].abs() < 1e-10);
        assert!((result[2] - 120.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn lgamma_gradient_is_digamma() {
        let device = Default::default();
        let x = Tensor::<TestAutodiffBackend, 1>::from_floats([1.0, 2.0], &device).require_grad();

        let grads = x.clone().lgamma().sum().backward();
        let grad: Vec<f64> = x
            .grad(&grads)
            .expect("x requires grad")
            .into_data()
            .iter::<f64>()
            .collect();

        // digamma(1) = -γ, digamma(2) = 1 - γ
        let euler_gamma = 0.577_215_664_901_532_9;
        assert!((grad[0] + euler_gamma).abs() < 1e-8);
        assert!((grad[1] - (1.0 - euler_gamma)).abs() < 1e-8);
    }

    #[test]
    fn lgamma_single_precision_handles_large_counts() {
        let device = Default::default();
        let x = Tensor::<NdArray, 1>::from_floats([1.0e6], &device);

        let actual = x.lgamma().into_data().iter::<f64>().next().unwrap_or(f64::NAN);
        let expected = libm::lgamma(1.0e6);

        assert!(actual.is_finite());
        assert!(((actual - expected) / expected).abs() < 1e-5);
    }
}
