//! # Decoder Stage
//!
//! Upsamples with a 3x3 transposed convolution, concatenates the paired encoder's skip
//! map along channels and refines the result with a [`ConvolutionalBlock`].

use burn::{
    nn::conv::{ConvTranspose2d, ConvTranspose2dConfig},
    prelude::*,
};
use burn_extra_ops::{McDropout, McDropoutConfig, Mode};

use super::{ConvolutionalBlock, ConvolutionalBlockConfig};
use crate::config::UpsampleConfig;
use crate::error::{CountNetError, CountNetResult};
use crate::models::capability::{FeatureMap, Trainable};
use crate::shape::FeatureShape;

const KERNEL_SIZE: usize = 3;

/// `(padding, padding_out)` for a 3x3 transposed convolution whose output is exactly
/// `stride` times its input.
///
/// The output side is `(h - 1) * stride - 2 * padding + 3 + padding_out`, and Burn needs
/// `padding_out < stride`.
const fn same_padding(stride: usize) -> (usize, usize) {
    let padding = if stride <= 2 { 1 } else { 0 };
    (padding, stride + 2 * padding - KERNEL_SIZE)
}

/// Configuration for the [`DecoderStage`] module.
#[derive(Config, Debug)]
pub struct DecoderStageConfig {
    /// Channels of the map coming from the previous stage.
    pub in_channels: usize,
    /// Channels of the skip map.
    pub skip_channels: usize,
    /// Filters, stride, skip index and dropout sites of the stage.
    pub upsample: UpsampleConfig,
    /// Drop probability for every enabled dropout site.
    #[config(default = 0.5)]
    pub dropout_prob: f64,
}

impl DecoderStageConfig {
    /// Initializes a new `DecoderStage` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderStage<B> {
        let stride = self.upsample.stride;
        let num_filters = self.upsample.num_filters;
        let (padding, padding_out) = same_padding(stride);

        let upsample = ConvTranspose2dConfig::new([self.in_channels, num_filters], [KERNEL_SIZE; 2])
            .with_stride([stride, stride])
            .with_padding([padding, padding])
            .with_padding_out([padding_out, padding_out])
            .init(device);
        let block = ConvolutionalBlockConfig::new(num_filters + self.skip_channels, num_filters)
            .with_dropout(self.upsample.block_dropout)
            .with_dropout_prob(self.dropout_prob)
            .init(device);
        let dropout = self
            .upsample
            .dropout
            .then(|| McDropoutConfig::new().with_prob(self.dropout_prob).init());

        DecoderStage {
            upsample,
            block,
            dropout,
            skip: self.upsample.skip,
        }
    }

    /// Output shape of decoder `stage` for an input of shape `input` and a skip map of
    /// shape `skip`.
    ///
    /// # Errors
    ///
    /// Returns `Err(CountNetError::ShapeMismatch)` if the upsampled map and the skip map
    /// differ in spatial size, and `Err(CountNetError::InvalidInputShape)` if either map
    /// has a channel count other than the one this stage was configured with.
    pub fn output_shape(
        &self,
        stage: usize,
        input: FeatureShape,
        skip: FeatureShape,
    ) -> CountNetResult<FeatureShape> {
        if input.channels != self.in_channels || skip.channels != self.skip_channels {
            return Err(CountNetError::InvalidInputShape {
                reason: format!(
                    "decoder {stage} expects {} input and {} skip channels, got {} and {}",
                    self.in_channels, self.skip_channels, input.channels, skip.channels
                ),
            });
        }

        let upsampled = input.upsampled(self.upsample.stride);
        if upsampled.spatial() != skip.spatial() {
            return Err(CountNetError::ShapeMismatch {
                stage,
                upsampled: upsampled.spatial(),
                skip: skip.spatial(),
            });
        }

        Ok(skip.with_channels(self.upsample.num_filters))
    }
}

/// `transposed conv -> concat(skip) -> block -> dropout?`
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    upsample: ConvTranspose2d<B>,
    block: ConvolutionalBlock<B>,
    dropout: Option<McDropout>,
    skip: usize,
}

impl<B: Backend> DecoderStage<B> {
    /// # Shapes
    /// - input: `[batch, in_channels, height, width]`
    /// - skip: `[batch, skip_channels, height * stride, width * stride]`
    /// - output: `[batch, num_filters, height * stride, width * stride]`
    pub fn forward(&self, input: FeatureMap<B>, skip: FeatureMap<B>, mode: Mode) -> FeatureMap<B> {
        let upsampled = self.upsample.forward(input);
        let x = self.block.forward(Tensor::cat(vec![upsampled, skip], 1), mode);

        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }

    /// Index of the encoder stage whose skip map this stage consumes.
    pub const fn skip(&self) -> usize {
        self.skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn transposed_convolution_multiplies_size_by_stride() {
        let device = Default::default();

        for stride in 1..=4 {
            let (padding, padding_out) = same_padding(stride);
            let conv = ConvTranspose2dConfig::new([2, 3], [KERNEL_SIZE; 2])
                .with_stride([stride, stride])
                .with_padding([padding, padding])
                .with_padding_out([padding_out, padding_out])
                .init::<TestBackend>(&device);
            let input = Tensor::<TestBackend, 4>::ones([1, 2, 4, 5], &device);

            let output = conv.forward(input);

            assert_eq!(output.dims(), [1, 3, 4 * stride, 5 * stride], "stride {stride}");
        }
    }

    #[test]
    fn decoder_concatenates_skip_and_upsamples() {
        let device = Default::default();
        let config = DecoderStageConfig::new(16, 8, UpsampleConfig::new(8, 3, 0));
        let stage = config.init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::ones([2, 16, 2, 3], &device);
        let skip = Tensor::<TestBackend, 4>::ones([2, 8, 6, 9], &device);

        let output = stage.forward(input, skip, Mode::Eval);

        assert_eq!(output.dims(), [2, 8, 6, 9]);
        assert_eq!(stage.skip(), 0);
        assert_eq!(
            config
                .output_shape(0, FeatureShape::new(2, 3, 16), FeatureShape::new(6, 9, 8))
                .unwrap(),
            FeatureShape::new(6, 9, 8)
        );
    }

    #[test]
    fn mismatched_skip_is_reported_with_both_sizes() {
        let config = DecoderStageConfig::new(32, 8, UpsampleConfig::new(16, 2, 0));

        let result = config.output_shape(1, FeatureShape::new(3, 3, 32), FeatureShape::new(7, 7, 8));

        match result {
            Err(CountNetError::ShapeMismatch {
                stage,
                upsampled,
                skip,
            }) => {
                assert_eq!(stage, 1);
                assert_eq!(upsampled, (6, 6));
                assert_eq!(skip, (7, 7));
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }
}
