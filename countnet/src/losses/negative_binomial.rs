//! # Negative-Binomial Negative Log-Likelihood
//!
//! For an observed count `k`, a predicted mean `kbar` and a dispersion `beta`, with
//! `M = 1 / beta^2`, each observation contributes
//!
//! ```text
//! lnΓ(M + k) - lnΓ(M) - k ln(kbar + M) + M ln(M / (kbar + M))
//! ```
//!
//! The loss is the negated mean of these terms. Predicted means are unconstrained, so a
//! term can be NaN (for instance when `kbar + M < 0`). Such degenerate terms are excluded
//! from the sum but, under the default [`MeanDivisor::Declared`] policy, still counted in
//! the divisor. They contribute zero gradient.

use core::marker::PhantomData;

use burn::{
    module::Ignored,
    prelude::*,
    tensor::{ElementConversion, Tensor},
};
use burn_extra_ops::{masked_mean, LogGamma, MeanDivisor};

use crate::error::{CountNetError, CountNetResult};

/// Configuration for the [`NegativeBinomialNll`] loss.
#[derive(Config, Debug)]
pub struct NegativeBinomialNllConfig {
    /// Count the mean is divided by.
    #[config(default = "MeanDivisor::Declared")]
    pub divisor: MeanDivisor,
}

impl NegativeBinomialNllConfig {
    /// Initialize a new negative-binomial loss with the given configuration.
    pub fn init<B: Backend>(&self) -> NegativeBinomialNll<B> {
        NegativeBinomialNll {
            divisor: Ignored(self.divisor),
            _phantom: PhantomData,
        }
    }
}

/// Per-observation likelihood terms before reduction.
#[derive(Debug, Clone)]
pub struct LikelihoodTerms<B: Backend> {
    /// One term per observation, NaN where degenerate.
    pub terms: Tensor<B, 1>,
    /// Positions whose term is NaN.
    pub degenerate: Tensor<B, 1, Bool>,
}

impl<B: Backend> LikelihoodTerms<B> {
    /// Number of degenerate terms. Synchronizes with the device.
    pub fn degenerate_count(&self) -> usize {
        count_set(&self.degenerate)
    }
}

/// Number of `true` entries of a mask. Synchronizes with the device.
pub(crate) fn count_set<B: Backend>(mask: &Tensor<B, 1, Bool>) -> usize {
    mask.clone().int().sum().into_scalar().elem::<i64>() as usize
}

/// Negative-binomial negative log-likelihood.
#[derive(Module, Debug)]
pub struct NegativeBinomialNll<B: Backend> {
    divisor: Ignored<MeanDivisor>,
    _phantom: PhantomData<B>,
}

impl<B: Backend> Default for NegativeBinomialNll<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> NegativeBinomialNll<B> {
    /// Create a new loss with the default configuration.
    pub fn new() -> Self {
        NegativeBinomialNllConfig::new().init()
    }

    /// The divisor policy.
    pub fn divisor(&self) -> MeanDivisor {
        self.divisor.0
    }

    /// Computes the loss.
    ///
    /// `counts` and `predicted` may have any rank; they are flattened in the same order.
    /// `beta` must hold a single element.
    ///
    /// # Shapes
    /// - beta: `[1]`
    /// - counts: `[...dims]`
    /// - predicted: `[...dims]`
    /// - output: `[1]`
    ///
    /// # Errors
    ///
    /// - `CountNetError::InvalidDispersion` if `M = 1 / beta^2` is not finite and positive
    ///   in the backend's precision, which includes `beta` being zero or NaN.
    /// - `CountNetError::InvalidObservations` if the inputs are empty or differ in
    ///   element count.
    pub fn forward<const D: usize>(
        &self,
        beta: Tensor<B, 1>,
        counts: Tensor<B, D>,
        predicted: Tensor<B, D>,
    ) -> CountNetResult<Tensor<B, 1>> {
        let terms = self.forward_no_reduction(beta, counts, predicted)?;

        Ok(self.reduce(terms))
    }

    /// Reduces per-observation terms to the loss with this loss's divisor policy.
    pub fn reduce(&self, terms: LikelihoodTerms<B>) -> Tensor<B, 1> {
        masked_mean(terms.terms, terms.degenerate, self.divisor.0).neg()
    }

    /// Computes the per-observation terms without reducing them.
    ///
    /// Degeneracy is decided on detached values. At degenerate positions the predicted
    /// mean is replaced by zero before the differentiable evaluation and the term is then
    /// overwritten with NaN, so no NaN reaches the gradient.
    ///
    /// # Errors
    ///
    /// See [`NegativeBinomialNll::forward`].
    pub fn forward_no_reduction<const D: usize>(
        &self,
        beta: Tensor<B, 1>,
        counts: Tensor<B, D>,
        predicted: Tensor<B, D>,
    ) -> CountNetResult<LikelihoodTerms<B>> {
        check_beta(&beta)?;

        let len = counts.shape().num_elements();
        let predicted_len = predicted.shape().num_elements();
        check_lengths(len, predicted_len)?;

        let counts = counts.reshape([len]);
        let predicted = predicted.reshape([len]);

        let degenerate = likelihood_terms(
            beta.clone().detach(),
            counts.clone(),
            predicted.clone().detach(),
        )
        .is_nan();
        let predicted = predicted.mask_fill(degenerate.clone(), 0.0);
        let terms =
            likelihood_terms(beta, counts, predicted).mask_fill(degenerate.clone(), f64::NAN);

        let terms = LikelihoodTerms { terms, degenerate };
        if tracing::enabled!(tracing::Level::DEBUG) {
            let count = terms.degenerate_count();
            if count > 0 {
                tracing::debug!(
                    degenerate = count,
                    observations = len,
                    "excluded degenerate likelihood terms"
                );
            }
        }

        Ok(terms)
    }

    /// Computes the loss on host values.
    ///
    /// # Errors
    ///
    /// See [`NegativeBinomialNll::forward`].
    pub fn evaluate(&self, beta: f64, counts: &[f64], predicted: &[f64]) -> CountNetResult<f64> {
        evaluate_with(self.divisor.0, beta, counts, predicted)
    }
}

/// Scalar negative-binomial loss with the [`MeanDivisor::Declared`] policy.
///
/// # Errors
///
/// - `CountNetError::InvalidDispersion` if `M = 1 / beta^2` is not finite and positive.
/// - `CountNetError::InvalidObservations` if the slices are empty or differ in length.
pub fn negative_binomial_nll(beta: f64, counts: &[f64], predicted: &[f64]) -> CountNetResult<f64> {
    evaluate_with(MeanDivisor::Declared, beta, counts, predicted)
}

/// One likelihood term. NaN when degenerate.
pub fn likelihood_term(beta: f64, count: f64, predicted: f64) -> f64 {
    let m = (beta * beta).recip();
    let denominator = predicted + m;

    libm::lgamma(m + count) - libm::lgamma(m) - count * denominator.ln()
        + m * (m / denominator).ln()
}

fn evaluate_with(
    divisor: MeanDivisor,
    beta: f64,
    counts: &[f64],
    predicted: &[f64],
) -> CountNetResult<f64> {
    check_mass(beta, (beta * beta).recip())?;
    check_lengths(counts.len(), predicted.len())?;

    let (sum, valid) = counts
        .iter()
        .zip(predicted)
        .map(|(&count, &mean)| likelihood_term(beta, count, mean))
        .filter(|term| !term.is_nan())
        .fold((0.0, 0usize), |(sum, valid), term| (sum + term, valid + 1));

    let divisor = match divisor {
        MeanDivisor::Declared => counts.len(),
        MeanDivisor::Valid => valid,
    };

    Ok(-(sum / divisor as f64))
}

fn likelihood_terms<B: Backend>(
    beta: Tensor<B, 1>,
    counts: Tensor<B, 1>,
    predicted: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [len] = counts.dims();
    let m = beta.powf_scalar(2.0).recip().repeat_dim(0, len);
    let denominator = predicted + m.clone();

    (m.clone() + counts.clone()).lgamma() - m.clone().lgamma() - counts * denominator.clone().log()
        + m.clone() * (m / denominator).log()
}

fn check_beta<B: Backend>(beta: &Tensor<B, 1>) -> CountNetResult<()> {
    let [len] = beta.dims();
    if len != 1 {
        return Err(CountNetError::InvalidConfiguration {
            reason: format!("beta must hold exactly one element, got {len}"),
        });
    }

    // M in the backend's own precision, where it may overflow before f64 would.
    let m = beta.clone().powf_scalar(2.0).recip().into_scalar().elem::<f64>();
    check_mass(beta.clone().into_scalar().elem::<f64>(), m)
}

/// `M` must be finite and positive for every term to be defined.
pub(crate) fn check_mass(beta: f64, m: f64) -> CountNetResult<()> {
    if m.is_finite() && m > 0.0 {
        Ok(())
    } else {
        Err(CountNetError::InvalidDispersion { beta })
    }
}

fn check_lengths(counts: usize, predicted: usize) -> CountNetResult<()> {
    if counts != predicted {
        return Err(CountNetError::InvalidObservations {
            reason: format!("{counts} counts but {predicted} predicted means"),
        });
    }
    if counts == 0 {
        return Err(CountNetError::InvalidObservations {
            reason: "no observations".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::{TensorData, Tolerance},
    };

    type TestBackend = NdArray<f64>;
    type TestAutodiffBackend = Autodiff<NdArray<f64>>;

    /// `beta = 1`, `k = kbar = 5`: `M = 1`, the term is `ln 120 - 6 ln 6`.
    fn single_term() -> f64 {
        120.0_f64.ln() - 6.0 * 6.0_f64.ln()
    }

    #[test]
    fn single_observation_matches_closed_form() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();

        let output = loss
            .forward(
                Tensor::from_floats([1.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0], &device),
            )
            .unwrap();

        let expected = TensorData::from([-single_term()]);
        output
            .into_data()
            .assert_approx_eq::<f64>(&expected, Tolerance::absolute(1e-6));
        assert!((-single_term() - 5.963_07).abs() < 1e-5);

        let scalar = negative_binomial_nll(1.0, &[5.0], &[5.0]).unwrap();
        assert!((scalar + single_term()).abs() < 1e-12);
    }

    #[test]
    fn repeated_observations_match_closed_form() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();

        let output = loss
            .forward(
                Tensor::from_floats([1.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0, 5.0, 5.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0, 5.0, 5.0], &device),
            )
            .unwrap();

        output
            .into_data()
            .assert_approx_eq::<f64>(&TensorData::from([5.963_07]), Tolerance::absolute(1e-5));

        let scalar = negative_binomial_nll(1.0, &[5.0, 5.0, 5.0], &[5.0, 5.0, 5.0]).unwrap();
        assert!((scalar - 5.963_07).abs() < 1e-5);
    }

    #[test]
    fn degenerate_term_is_dropped_from_sum_but_kept_in_divisor() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();
        let counts = Tensor::<TestBackend, 1>::from_floats([5.0, 5.0, 5.0], &device);
        let predicted = Tensor::<TestBackend, 1>::from_floats([5.0, -3.0, 5.0], &device);

        let terms = loss
            .forward_no_reduction(
                Tensor::from_floats([1.0], &device),
                counts.clone(),
                predicted.clone(),
            )
            .unwrap();
        assert_eq!(terms.degenerate_count(), 1);

        let output = loss
            .forward(Tensor::from_floats([1.0], &device), counts, predicted)
            .unwrap();

        let expected = TensorData::from([-2.0 * single_term() / 3.0]);
        output
            .into_data()
            .assert_approx_eq::<f64>(&expected, Tolerance::absolute(1e-6));
        loss.reduce(terms)
            .into_data()
            .assert_approx_eq::<f64>(&expected, Tolerance::absolute(1e-6));

        let scalar = negative_binomial_nll(1.0, &[5.0, 5.0, 5.0], &[5.0, -3.0, 5.0]).unwrap();
        assert!((scalar + 2.0 * single_term() / 3.0).abs() < 1e-12);
    }

    #[test]
    fn valid_divisor_averages_surviving_terms_only() {
        let device = Default::default();
        let loss = NegativeBinomialNllConfig::new()
            .with_divisor(MeanDivisor::Valid)
            .init::<TestBackend>();

        let output = loss
            .forward(
                Tensor::from_floats([1.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0, 5.0, 5.0], &device),
                Tensor::<TestBackend, 1>::from_floats([5.0, -3.0, 5.0], &device),
            )
            .unwrap();

        let expected = TensorData::from([-single_term()]);
        output
            .into_data()
            .assert_approx_eq::<f64>(&expected, Tolerance::absolute(1e-6));

        let scalar = loss.evaluate(1.0, &[5.0, 5.0, 5.0], &[5.0, -3.0, 5.0]).unwrap();
        assert!((scalar + single_term()).abs() < 1e-12);
    }

    #[test]
    fn zero_dispersion_is_rejected() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();

        let result = loss.forward(
            Tensor::from_floats([0.0], &device),
            Tensor::<TestBackend, 1>::from_floats([1.0], &device),
            Tensor::<TestBackend, 1>::from_floats([1.0], &device),
        );

        assert!(matches!(
            result,
            Err(CountNetError::InvalidDispersion { .. })
        ));
        assert!(matches!(
            negative_binomial_nll(0.0, &[1.0], &[1.0]),
            Err(CountNetError::InvalidDispersion { .. })
        ));
    }

    #[test]
    fn overflowing_or_nan_dispersion_is_rejected() {
        for beta in [1e-200, 1e200, f64::NAN] {
            assert!(matches!(
                negative_binomial_nll(beta, &[1.0, 2.0], &[1.0, 2.0]),
                Err(CountNetError::InvalidDispersion { .. })
            ));
        }

        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();
        for beta in [1e-200, f64::NAN] {
            let result = loss.forward(
                Tensor::from_data(TensorData::from([beta]), &device),
                Tensor::<TestBackend, 1>::from_floats([1.0, 2.0], &device),
                Tensor::<TestBackend, 1>::from_floats([1.0, 2.0], &device),
            );
            assert!(matches!(
                result,
                Err(CountNetError::InvalidDispersion { .. })
            ));
        }
    }

    #[test]
    fn single_precision_dispersion_is_checked_in_single_precision() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<NdArray>::new();

        // 1 / (1e-25)^2 overflows f32 but not f64.
        let result = loss.forward(
            Tensor::from_floats([1e-25], &device),
            Tensor::<NdArray, 1>::from_floats([1.0, 2.0], &device),
            Tensor::<NdArray, 1>::from_floats([1.0, 2.0], &device),
        );

        assert!(matches!(
            result,
            Err(CountNetError::InvalidDispersion { .. })
        ));
    }

    #[test]
    fn empty_or_mismatched_observations_are_rejected() {
        assert!(matches!(
            negative_binomial_nll(1.0, &[], &[]),
            Err(CountNetError::InvalidObservations { .. })
        ));
        assert!(matches!(
            negative_binomial_nll(1.0, &[1.0, 2.0], &[1.0]),
            Err(CountNetError::InvalidObservations { .. })
        ));

        let device = Default::default();
        let result = NegativeBinomialNll::<TestBackend>::new().forward(
            Tensor::from_floats([1.0], &device),
            Tensor::<TestBackend, 1>::from_floats([1.0, 2.0], &device),
            Tensor::<TestBackend, 1>::from_floats([1.0], &device),
        );
        assert!(matches!(
            result,
            Err(CountNetError::InvalidObservations { .. })
        ));
    }

    #[test]
    fn count_maps_of_any_rank_are_flattened() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestBackend>::new();
        let counts = Tensor::<TestBackend, 4>::full([2, 1, 2, 2], 5.0, &device);

        let output = loss
            .forward(Tensor::from_floats([1.0], &device), counts.clone(), counts)
            .unwrap();

        let expected = TensorData::from([-single_term()]);
        output
            .into_data()
            .assert_approx_eq::<f64>(&expected, Tolerance::absolute(1e-6));
    }

    #[test]
    fn degenerate_terms_contribute_zero_gradient() {
        let device = Default::default();
        let loss = NegativeBinomialNll::<TestAutodiffBackend>::new();
        let beta = Tensor::<TestAutodiffBackend, 1>::from_floats([1.0], &device).require_grad();
        let predicted =
            Tensor::<TestAutodiffBackend, 1>::from_floats([5.0, -3.0, 5.0], &device).require_grad();
        let counts = Tensor::<TestAutodiffBackend, 1>::from_floats([5.0, 5.0, 5.0], &device);

        let output = loss
            .forward(beta.clone(), counts, predicted.clone())
            .unwrap();
        let grads = output.backward();

        // d/dkbar of -term/n is (k + M) / ((kbar + M) n) = 6 / (6 * 3).
        let predicted_grad = predicted.grad(&grads).unwrap();
        predicted_grad
            .into_data()
            .assert_approx_eq::<f64>(&TensorData::from([1.0 / 3.0, 0.0, 1.0 / 3.0]), Tolerance::absolute(1e-6));

        let beta_grad = beta.grad(&grads).unwrap().into_scalar();
        assert!(beta_grad.is_finite());
    }
}
