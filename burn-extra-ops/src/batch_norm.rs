//! # Batch Normalization with an explicit mode
//!
//! Burn's `BatchNorm` picks between batch and running statistics from whether the
//! backend records gradients. This variant takes the [`Mode`] as an argument instead, so
//! a caller can run an autodiff backend with frozen statistics (Monte-Carlo sampling) or
//! update statistics on purpose.
//!
//! Running statistics live in [`RunningState`], which performs one locked update per
//! training forward pass.

use burn::{
    module::{Param, RunningState},
    nn::Initializer,
    prelude::*,
};

use crate::Mode;

/// Configuration for [`BatchNorm2d`].
#[derive(Config, Debug)]
pub struct BatchNorm2dConfig {
    /// Number of channels of the normalized feature map.
    pub num_features: usize,
    /// Added to the variance before taking the square root.
    #[config(default = 1e-3)]
    pub epsilon: f64,
    /// Weight of the current batch in the running statistics update.
    #[config(default = 0.01)]
    pub momentum: f64,
}

impl BatchNorm2dConfig {
    /// Initializes a new [`BatchNorm2d`] module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BatchNorm2d<B> {
        assert!(
            (0.0..=1.0).contains(&self.momentum),
            "Momentum for BatchNorm2d must be in [0, 1], got {}",
            self.momentum
        );

        BatchNorm2d {
            gamma: Initializer::Ones.init([self.num_features], device),
            beta: Initializer::Zeros.init([self.num_features], device),
            running_mean: RunningState::new(Tensor::zeros([self.num_features], device)),
            running_var: RunningState::new(Tensor::ones([self.num_features], device)),
            momentum: self.momentum,
            epsilon: self.epsilon,
        }
    }
}

/// Per-channel normalization over `[batch, channels, height, width]` inputs.
#[derive(Module, Debug)]
pub struct BatchNorm2d<B: Backend> {
    /// Learned scale.
    pub gamma: Param<Tensor<B, 1>>,
    /// Learned shift.
    pub beta: Param<Tensor<B, 1>>,
    /// Running mean used in [`Mode::Eval`].
    pub running_mean: RunningState<Tensor<B, 1>>,
    /// Running (biased) variance used in [`Mode::Eval`].
    pub running_var: RunningState<Tensor<B, 1>>,
    momentum: f64,
    epsilon: f64,
}

impl<B: Backend> BatchNorm2d<B> {
    /// Normalizes `input` with batch statistics in [`Mode::Train`] (updating the running
    /// statistics once) or with the running statistics in [`Mode::Eval`].
    ///
    /// # Shapes
    /// - input: `[batch, channels, height, width]`
    /// - output: `[batch, channels, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>, mode: Mode) -> Tensor<B, 4> {
        match mode {
            Mode::Train => self.forward_train(input),
            Mode::Eval => {
                let mean = self.running_mean.value_sync();
                let var = self.running_var.value_sync();
                self.apply(input, mean, var)
            }
        }
    }

    fn forward_train(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = input.dims();

        let flat = input
            .clone()
            .swap_dims(0, 1)
            .reshape([channels, batch * height * width]);
        let mean = flat.clone().mean_dim(1);
        let var = flat.sub(mean.clone()).powf_scalar(2.0).mean_dim(1);

        let mean = mean.reshape([channels]);
        let var = var.reshape([channels]);

        let running_mean = self.running_mean.value_sync();
        let running_var = self.running_var.value_sync();

        self.running_mean.update(
            running_mean
                .mul_scalar(1.0 - self.momentum)
                .add(mean.clone().detach().mul_scalar(self.momentum)),
        );
        self.running_var.update(
            running_var
                .mul_scalar(1.0 - self.momentum)
                .add(var.clone().detach().mul_scalar(self.momentum)),
        );

        self.apply(input, mean, var)
    }

    fn apply(&self, input: Tensor<B, 4>, mean: Tensor<B, 1>, var: Tensor<B, 1>) -> Tensor<B, 4> {
        let channels = mean.dims()[0];
        let shape = [1, channels, 1, 1];

        let std = var.add_scalar(self.epsilon).sqrt();
        let normalized = (input - mean.reshape(shape)) / std.reshape(shape);

        normalized * self.gamma.val().reshape(shape) + self.beta.val().reshape(shape)
    }
}
