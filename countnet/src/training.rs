//! Training data structures and the trainable count regressor.
//!
//! [`CountRegressor`] bundles a [`NetworkGraph`], the [`Dispersion`] parameter and the
//! [`NegativeBinomialNll`] loss, so one optimizer updates the network weights and `beta`
//! together. With the `train` feature it also plugs into Burn's `Learner`.

#[cfg(feature = "train")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{
        metric::{Adaptor, ItemLazy, LossInput},
        TrainOutput, TrainStep, ValidStep,
    },
};
use burn::prelude::*;
use burn_extra_ops::Mode;

use crate::config::TopologyConfig;
use crate::error::{CountNetError, CountNetResult};
use crate::losses::{
    count_set, Dispersion, DispersionConfig, NegativeBinomialNll, NegativeBinomialNllConfig,
};
use crate::models::{NetworkBuilder, NetworkGraph};
use crate::shape::FeatureShape;

/// A batch of input maps and the observed count maps the network should predict.
#[derive(Debug, Clone)]
pub struct CountBatch<B: Backend> {
    /// Input maps, `[batch, channels, height, width]`.
    pub inputs: Tensor<B, 4>,
    /// Observed counts at the network's output resolution, `[batch, 1, out_height, out_width]`.
    pub counts: Tensor<B, 4>,
}

impl<B: Backend> CountBatch<B> {
    pub const fn new(inputs: Tensor<B, 4>, counts: Tensor<B, 4>) -> Self {
        Self { inputs, counts }
    }

    pub fn batch_size(&self) -> usize {
        self.inputs.dims()[0]
    }
}

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct CountOutput<B: Backend> {
    /// The negative-binomial loss.
    pub loss: Tensor<B, 1>,
    /// Predicted mean counts.
    pub predicted: Tensor<B, 4>,
    /// Observed counts.
    pub counts: Tensor<B, 4>,
    /// Flattened positions whose likelihood term was excluded from the sum.
    pub degenerate: Tensor<B, 1, Bool>,
}

impl<B: Backend> CountOutput<B> {
    pub const fn new(
        loss: Tensor<B, 1>,
        predicted: Tensor<B, 4>,
        counts: Tensor<B, 4>,
        degenerate: Tensor<B, 1, Bool>,
    ) -> Self {
        Self {
            loss,
            predicted,
            counts,
            degenerate,
        }
    }

    /// Number of excluded likelihood terms. Synchronizes with the device.
    pub fn degenerate_count(&self) -> usize {
        count_set(&self.degenerate)
    }
}

/// Configuration for the [`CountRegressor`] module.
#[derive(Config, Debug)]
pub struct CountRegressorConfig {
    /// Stage layout of the network.
    pub topology: TopologyConfig,
    /// Per-sample input shape the network is built for.
    pub input_shape: FeatureShape,
    #[config(default = "NegativeBinomialNllConfig::new()")]
    pub loss: NegativeBinomialNllConfig,
    #[config(default = "DispersionConfig::new()")]
    pub dispersion: DispersionConfig,
}

impl CountRegressorConfig {
    /// Builds the network and initializes the dispersion parameter.
    ///
    /// # Errors
    ///
    /// Any error of [`NetworkBuilder::build`], or `CountNetError::InvalidDispersion` if the
    /// initial `beta` is zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> CountNetResult<CountRegressor<B>> {
        Ok(CountRegressor {
            network: NetworkBuilder::new(self.topology.clone()).build(self.input_shape, device)?,
            dispersion: self.dispersion.init(device)?,
            loss: self.loss.init(),
        })
    }
}

/// Network, dispersion and loss trained as one module.
#[derive(Module, Debug)]
pub struct CountRegressor<B: Backend> {
    network: NetworkGraph<B>,
    dispersion: Dispersion<B>,
    loss: NegativeBinomialNll<B>,
}

impl<B: Backend> CountRegressor<B> {
    pub const fn network(&self) -> &NetworkGraph<B> {
        &self.network
    }

    pub const fn dispersion(&self) -> &Dispersion<B> {
        &self.dispersion
    }

    pub const fn loss(&self) -> &NegativeBinomialNll<B> {
        &self.loss
    }

    /// Predicts counts for `batch.inputs` and scores them against `batch.counts`.
    ///
    /// # Errors
    ///
    /// - `CountNetError::InvalidInputShape` if the inputs do not match the built shape.
    /// - `CountNetError::InvalidObservations` if the count maps do not match the
    ///   predictions.
    /// - `CountNetError::InvalidDispersion` if `beta` has reached zero.
    pub fn forward_loss(&self, batch: CountBatch<B>, mode: Mode) -> CountNetResult<CountOutput<B>> {
        let predicted = self.network.try_forward(batch.inputs, mode)?;

        if predicted.dims() != batch.counts.dims() {
            return Err(CountNetError::InvalidObservations {
                reason: format!(
                    "count maps have shape {:?} but predictions have shape {:?}",
                    batch.counts.dims(),
                    predicted.dims()
                ),
            });
        }

        let terms = self.loss.forward_no_reduction(
            self.dispersion.beta(),
            batch.counts.clone(),
            predicted.clone(),
        )?;
        let degenerate = terms.degenerate.clone();
        let loss = self.loss.reduce(terms);

        Ok(CountOutput::new(loss, predicted, batch.counts, degenerate))
    }
}

#[cfg(feature = "train")]
impl<B: Backend> ItemLazy for CountOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        self
    }
}

#[cfg(feature = "train")]
impl<B: Backend> Adaptor<LossInput<B>> for CountOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

/// # Panics
///
/// Panics if the batch does not match the shapes the regressor was built for, or if
/// `beta` has reached zero.
#[cfg(feature = "train")]
impl<B: AutodiffBackend> TrainStep<CountBatch<B>, CountOutput<B>> for CountRegressor<B> {
    fn step(&self, batch: CountBatch<B>) -> TrainOutput<CountOutput<B>> {
        let item = self
            .forward_loss(batch, Mode::Train)
            .unwrap_or_else(|err| panic!("training step failed: {err}"));

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

/// # Panics
///
/// See the `TrainStep` implementation.
#[cfg(feature = "train")]
impl<B: Backend> ValidStep<CountBatch<B>, CountOutput<B>> for CountRegressor<B> {
    fn step(&self, batch: CountBatch<B>) -> CountOutput<B> {
        self.forward_loss(batch, Mode::Eval)
            .unwrap_or_else(|err| panic!("validation step failed: {err}"))
    }
}


#[cfg(all(test, feature = "train"))]
mod learner_tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        module::AutodiffModule,
        optim::{AdamConfig, Optimizer},
        tensor::Distribution,
    };

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn batch<B: Backend>(device: &B::Device) -> CountBatch<B> {
        CountBatch::new(
            Tensor::random([2, 1, 18, 18], Distribution::Uniform(0.0, 1.0), device),
            Tensor::full([2, 1, 6, 6], 3.0, device),
        )
    }

    #[test]
    fn train_step_yields_gradients_for_dispersion() {
        let device = Default::default();
        let regressor =
            CountRegressorConfig::new(TopologyConfig::reference(), FeatureShape::new(18, 18, 1))
                .init::<TestAutodiffBackend>(&device)
                .unwrap();
        let beta_before = regressor.dispersion().value();

        let output = TrainStep::step(&regressor, batch(&device));
        let item = output.item.sync();
        let _: LossInput<TestAutodiffBackend> = item.adapt();
        assert_eq!(item.loss.dims(), [1]);

        let mut optim = AdamConfig::new().init();
        let regressor = optim.step(1e-2, regressor, output.grads);
        assert_ne!(regressor.dispersion().value(), beta_before);
    }

    #[test]
    fn valid_step_scores_without_gradients() {
        let device = Default::default();
        let regressor =
            CountRegressorConfig::new(TopologyConfig::reference(), FeatureShape::new(18, 18, 1))
                .init::<TestAutodiffBackend>(&device)
                .unwrap()
                .valid();

        let output: CountOutput<TestBackend> = ValidStep::step(&regressor, batch(&device));

        assert_eq!(output.loss.dims(), [1]);
        assert_eq!(output.predicted.dims(), [2, 1, 6, 6]);
    }
}
