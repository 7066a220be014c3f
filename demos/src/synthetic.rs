//! Synthetic overdispersed count maps.
//!
//! Inputs are uniform noise. The expected count of an output location is the mean of its
//! input patch times a scale, and the observed count multiplies that expectation by
//! log-normal noise before rounding, which makes the variance grow faster than the mean.

use burn::{
    prelude::*,
    tensor::{module::adaptive_avg_pool2d, Distribution},
};
use countnet_burn::{CountBatch, FeatureShape};

/// Draws batches whose counts are a noisy function of the inputs.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCounts {
    input_shape: FeatureShape,
    output_shape: FeatureShape,
    scale: f64,
    noise_std: f64,
}

impl SyntheticCounts {
    pub const fn new(
        input_shape: FeatureShape,
        output_shape: FeatureShape,
        scale: f64,
        noise_std: f64,
    ) -> Self {
        Self {
            input_shape,
            output_shape,
            scale,
            noise_std,
        }
    }

    /// # Shapes
    /// - inputs: `[batch_size, channels, height, width]` of the input shape
    /// - counts: `[batch_size, 1, out_height, out_width]` of the output shape
    pub fn batch<B: Backend>(&self, batch_size: usize, device: &B::Device) -> CountBatch<B> {
        let inputs = Tensor::<B, 4>::random(
            self.input_shape.dims(batch_size),
            Distribution::Uniform(0.0, 1.0),
            device,
        );

        let expected = adaptive_avg_pool2d(
            inputs.clone().mean_dim(1),
            [self.output_shape.height, self.output_shape.width],
        ) * self.scale;
        let noise = Tensor::<B, 4>::random(
            expected.shape(),
            Distribution::Normal(0.0, self.noise_std),
            device,
        );
        let counts = (expected * noise.exp()).round();

        CountBatch::new(inputs, counts)
    }
}
