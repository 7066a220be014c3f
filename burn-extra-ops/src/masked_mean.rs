//! # Masked Mean
//!
//! Filter, sum, then divide. The divisor is an explicit policy: either the declared
//! element count of the tensor (excluded elements still count) or the number of elements
//! that survived the filter.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Which count a masked mean divides by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeanDivisor {
    /// Total number of elements, including excluded ones.
    #[default]
    Declared,
    /// Number of elements left after exclusion. Yields NaN when nothing is left.
    Valid,
}

/// Sums the elements of `values` not flagged in `exclude` and divides by the count
/// selected by `divisor`.
///
/// Excluded positions are replaced by zero before summation, so NaN or infinite values at
/// those positions do not reach the result.
///
/// # Shapes
/// - values: `[...dims]`
/// - exclude: `[...dims]`
/// - output: `[1]`
pub fn masked_mean<B: Backend, const D: usize>(
    values: Tensor<B, D>,
    exclude: Tensor<B, D, Bool>,
    divisor: MeanDivisor,
) -> Tensor<B, 1> {
    let declared = values.shape().num_elements();
    let total = values.mask_fill(exclude.clone(), 0.0).sum();

    match divisor {
        MeanDivisor::Declared => total.div_scalar(declared as f64),
        MeanDivisor::Valid => total / exclude.bool_not().float().sum(),
    }
}

/// [`masked_mean`] excluding NaN elements.
pub fn nan_mean<B: Backend, const D: usize>(
    values: Tensor<B, D>,
    divisor: MeanDivisor,
) -> Tensor<B, 1> {
    let exclude = values.clone().is_nan();
    masked_mean(values, exclude, divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{TensorData, Tolerance},
    };

    type TestBackend = NdArray;

    #[test]
    fn declared_divisor_keeps_excluded_elements_in_the_count() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 6.0], &device);
        let exclude = Tensor::<TestBackend, 1, Bool>::from_bool(
            TensorData::from([false, false, true]),
            &device,
        );

        let result = masked_mean(values, exclude, MeanDivisor::Declared);

        // (1 + 2) / 3
        result
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([1.0]), Tolerance::default());
    }

    #[test]
    fn valid_divisor_counts_only_kept_elements() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 6.0], &device);
        let exclude = Tensor::<TestBackend, 1, Bool>::from_bool(
            TensorData::from([false, false, true]),
            &device,
        );

        let result = masked_mean(values, exclude, MeanDivisor::Valid);

        result
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([1.5]), Tolerance::default());
    }

    #[test]
    fn nan_mean_skips_nan_but_divides_by_declared_count() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 2>::from_floats([[3.0, f32::NAN], [3.0, 6.0]], &device);

        let result = nan_mean(values, MeanDivisor::Declared).into_scalar();

        assert!((result - 3.0).abs() < 1e-6);
    }

    #[test]
    fn valid_divisor_with_everything_excluded_is_nan() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 1>::from_floats([f32::NAN, f32::NAN], &device);

        let result = nan_mean(values, MeanDivisor::Valid).into_scalar();

        assert!(result.is_nan());
    }
}
