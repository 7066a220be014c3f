//! # Convolutional Block
//!
//! Two passes of 3x3 convolution, batch normalization and ReLU, with optional dropout at
//! the end. Spatial size is preserved; the channel count becomes `num_filters`.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};
use burn_extra_ops::{BatchNorm2d, BatchNorm2dConfig, McDropout, McDropoutConfig, Mode};

use crate::models::capability::{FeatureMap, StatefulNormalization, Trainable};
use crate::shape::FeatureShape;

/// Configuration for the [`ConvolutionalBlock`] module.
#[derive(Config, Debug)]
pub struct ConvolutionalBlockConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels of both convolutions.
    pub num_filters: usize,
    /// Apply dropout to the block output.
    #[config(default = false)]
    pub dropout: bool,
    /// Drop probability used when `dropout` is set.
    #[config(default = 0.5)]
    pub dropout_prob: f64,
}

impl ConvolutionalBlockConfig {
    /// Initializes a new `ConvolutionalBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvolutionalBlock<B> {
        let conv1 = Conv2dConfig::new([self.in_channels, self.num_filters], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm1 = BatchNorm2dConfig::new(self.num_filters).init(device);
        let conv2 = Conv2dConfig::new([self.num_filters, self.num_filters], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm2 = BatchNorm2dConfig::new(self.num_filters).init(device);
        let dropout = self
            .dropout
            .then(|| McDropoutConfig::new().with_prob(self.dropout_prob).init());

        ConvolutionalBlock {
            conv1,
            norm1,
            conv2,
            norm2,
            relu: Relu::new(),
            dropout,
        }
    }

    /// Output shape for an input of shape `input`.
    pub const fn output_shape(&self, input: FeatureShape) -> FeatureShape {
        input.with_channels(self.num_filters)
    }
}

/// `[conv 3x3 -> batch norm -> relu] x 2 -> dropout?`
#[derive(Module, Debug)]
pub struct ConvolutionalBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm2d<B>,
    conv2: Conv2d<B>,
    norm2: BatchNorm2d<B>,
    relu: Relu,
    dropout: Option<McDropout>,
}

impl<B: Backend> Trainable<B> for ConvolutionalBlock<B> {
    fn forward(&self, input: FeatureMap<B>, mode: Mode) -> FeatureMap<B> {
        let x = self.conv1.forward(input);
        let x = self.relu.forward(self.norm1.normalize(x, mode));
        let x = self.conv2.forward(x);
        let x = self.relu.forward(self.norm2.normalize(x, mode));

        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }
}

impl<B: Backend> ConvolutionalBlock<B> {
    /// Whether the block ends with dropout.
    pub const fn has_dropout(&self) -> bool {
        self.dropout.is_some()
    }
}
