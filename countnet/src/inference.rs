//! Monte-Carlo prediction.
//!
//! Dropout stays active at inference, so repeated evaluations of the same input sample
//! different sub-networks. The spread of those samples estimates predictive uncertainty.

use burn::prelude::*;
use burn_extra_ops::Mode;

use crate::error::{CountNetError, CountNetResult};
use crate::hooks::{BatchLogs, LifecycleHooks, Phase};
use crate::models::{NetworkGraph, Trainable};
use crate::session::run_epoch;

/// Mean and variance of repeated forward passes.
#[derive(Debug, Clone)]
pub struct McPrediction<B: Backend> {
    /// Element-wise mean of the samples, `[batch, 1, out_height, out_width]`.
    pub mean: Tensor<B, 4>,
    /// Element-wise population variance of the samples.
    pub variance: Tensor<B, 4>,
    /// Number of forward passes.
    pub samples: usize,
}

impl<B: Backend> McPrediction<B> {
    /// Element-wise standard deviation.
    pub fn std(&self) -> Tensor<B, 4> {
        self.variance.clone().sqrt()
    }
}

/// Runs `samples` forward passes of `graph` over `input` in [`Mode::Eval`].
///
/// Without any dropout site every pass is identical and the variance is zero.
///
/// # Errors
///
/// - `CountNetError::InvalidConfiguration` if `samples` is zero.
/// - `CountNetError::InvalidInputShape` if `input` does not match the graph.
pub fn mc_predict<B: Backend>(
    graph: &NetworkGraph<B>,
    input: Tensor<B, 4>,
    samples: usize,
) -> CountNetResult<McPrediction<B>> {
    if samples == 0 {
        return Err(CountNetError::InvalidConfiguration {
            reason: "at least one Monte-Carlo sample is required".to_string(),
        });
    }

    let first = graph.try_forward(input.clone(), Mode::Eval)?;
    let mut sum = first.clone();
    let mut sum_sq = first.powf_scalar(2.0);
    for _ in 1..samples {
        let sample = graph.forward(input.clone(), Mode::Eval);
        sum = sum + sample.clone();
        sum_sq = sum_sq + sample.powf_scalar(2.0);
    }

    let mean = sum.div_scalar(samples as f64);
    let variance = (sum_sq.div_scalar(samples as f64) - mean.clone().powf_scalar(2.0)).clamp_min(0.0);

    Ok(McPrediction {
        mean,
        variance,
        samples,
    })
}

/// [`mc_predict`] over every batch, emitting [`Phase::Predict`] events to `hooks`.
///
/// # Errors
///
/// The first error of [`mc_predict`]; predictions of earlier batches are discarded.
pub fn predict_batches<B, H, I>(
    graph: &NetworkGraph<B>,
    batches: I,
    samples: usize,
    hooks: &mut H,
) -> CountNetResult<Vec<McPrediction<B>>>
where
    B: Backend,
    H: LifecycleHooks + ?Sized,
    I: IntoIterator<Item = Tensor<B, 4>>,
{
    let mut predictions = Vec::new();

    run_epoch(hooks, Phase::Predict, 0, batches, |input: Tensor<B, 4>| {
        let batch_size = input.dims()[0];
        predictions.push(mc_predict(graph, input, samples)?);
        Ok(BatchLogs::new(batch_size))
    })?;

    Ok(predictions)
}
