//! Capabilities shared by the layers of the graph.
//!
//! Every layer receives the [`Mode`] explicitly. Nothing consults global state or the
//! backend's autodiff flag to decide between training and inference behavior.

use burn::prelude::*;
use burn_extra_ops::{BatchNorm2d, Mode};

/// A batch of channels-first feature maps, `[batch, channels, height, width]`.
pub type FeatureMap<B> = Tensor<B, 4>;

/// A layer whose forward pass depends on the training mode.
pub trait Trainable<B: Backend>: Module<B> {
    /// Runs the layer. [`Mode::Train`] updates any running statistics.
    fn forward(&self, input: FeatureMap<B>, mode: Mode) -> FeatureMap<B>;
}

/// A normalization layer that keeps running statistics.
///
/// In [`Mode::Train`] the layer normalizes with batch statistics and folds them into its
/// running state; in [`Mode::Eval`] it normalizes with the running state and leaves it
/// untouched.
pub trait StatefulNormalization<B: Backend>: Module<B> {
    fn normalize(&self, input: FeatureMap<B>, mode: Mode) -> FeatureMap<B>;
}

impl<B: Backend> StatefulNormalization<B> for BatchNorm2d<B> {
    fn normalize(&self, input: FeatureMap<B>, mode: Mode) -> FeatureMap<B> {
        self.forward(input, mode)
    }
}
