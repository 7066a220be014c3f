//! # Encoder Stage
//!
//! A [`ConvolutionalBlock`] followed by non-overlapping max pooling. The block output is
//! kept as the stage's skip map; the pooled map feeds the next stage.

use burn::{
    nn::pool::{MaxPool2d, MaxPool2dConfig},
    prelude::*,
};
use burn_extra_ops::{McDropout, McDropoutConfig, Mode};

use super::{ConvolutionalBlock, ConvolutionalBlockConfig};
use crate::config::FilterConfig;
use crate::error::{CountNetError, CountNetResult};
use crate::models::capability::{FeatureMap, Trainable};
use crate::shape::FeatureShape;

/// Configuration for the [`EncoderStage`] module.
#[derive(Config, Debug)]
pub struct EncoderStageConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Filters, pool size and dropout sites of the stage.
    pub filters: FilterConfig,
    /// Drop probability for every enabled dropout site.
    #[config(default = 0.5)]
    pub dropout_prob: f64,
}

impl EncoderStageConfig {
    /// Initializes a new `EncoderStage` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> EncoderStage<B> {
        let pool_size = self.filters.pool_size;

        EncoderStage {
            block: self.block_config().init(device),
            pool: MaxPool2dConfig::new([pool_size, pool_size])
                .with_strides([pool_size, pool_size])
                .init(),
            dropout: self
                .filters
                .dropout
                .then(|| McDropoutConfig::new().with_prob(self.dropout_prob).init()),
        }
    }

    fn block_config(&self) -> ConvolutionalBlockConfig {
        ConvolutionalBlockConfig::new(self.in_channels, self.filters.num_filters)
            .with_dropout(self.filters.block_dropout)
            .with_dropout_prob(self.dropout_prob)
    }

    /// Shapes of the skip map and of the pooled map for an input of shape `input`.
    ///
    /// Pooling floors: a side of 10 pooled by 3 becomes 3.
    ///
    /// # Errors
    ///
    /// Returns `Err(CountNetError::InvalidInputShape)` if pooling reduces a side to zero.
    pub fn output_shapes(&self, input: FeatureShape) -> CountNetResult<(FeatureShape, FeatureShape)> {
        let skip = self.block_config().output_shape(input);
        let pooled = skip.pooled(self.filters.pool_size);

        if pooled.height == 0 || pooled.width == 0 {
            return Err(CountNetError::InvalidInputShape {
                reason: format!(
                    "a {}x{} map pooled by {} leaves no spatial extent",
                    input.height, input.width, self.filters.pool_size
                ),
            });
        }

        Ok((skip, pooled))
    }

    /// Whether pooling an input of shape `input` discards trailing rows or columns.
    pub const fn truncates(&self, input: FeatureShape) -> bool {
        !input.divisible_by(self.filters.pool_size)
    }
}

/// `block -> (skip, max pool -> dropout?)`
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    block: ConvolutionalBlock<B>,
    pool: MaxPool2d,
    dropout: Option<McDropout>,
}

impl<B: Backend> EncoderStage<B> {
    /// Returns `(skip, pooled)`.
    ///
    /// # Shapes
    /// - input: `[batch, in_channels, height, width]`
    /// - skip: `[batch, num_filters, height, width]`
    /// - pooled: `[batch, num_filters, height / pool_size, width / pool_size]`
    pub fn forward(&self, input: FeatureMap<B>, mode: Mode) -> (FeatureMap<B>, FeatureMap<B>) {
        let skip = self.block.forward(input, mode);
        let pooled = self.pool.forward(skip.clone());
        let pooled = match &self.dropout {
            Some(dropout) => dropout.forward(pooled),
            None => pooled,
        };

        (skip, pooled)
    }
}
