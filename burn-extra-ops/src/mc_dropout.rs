//! # Monte-Carlo Dropout
//!
//! Inverted dropout that stays active for every forward pass, including inference.
//! Repeated evaluations of the same input therefore produce different outputs, which is
//! what Monte-Carlo estimates of predictive uncertainty sample from.
//!
//! Unlike Burn's `Dropout`, this module does not consult the backend's autodiff state
//! and takes no mode argument.

use burn::{prelude::*, tensor::Distribution};

/// Configuration for the [`McDropout`] module.
#[derive(Config, Debug)]
pub struct McDropoutConfig {
    /// Probability of zeroing each element.
    #[config(default = 0.5)]
    pub prob: f64,
}

impl McDropoutConfig {
    /// Initializes a new [`McDropout`] module.
    pub fn init(&self) -> McDropout {
        assert!(
            (0.0..1.0).contains(&self.prob),
            "Probability for McDropout must be in [0, 1), got {}",
            self.prob
        );
        McDropout { prob: self.prob }
    }
}

/// Always-on dropout.
#[derive(Module, Clone, Debug)]
pub struct McDropout {
    prob: f64,
}

impl McDropout {
    /// Zeroes each element with probability `prob` and scales survivors by
    /// `1 / (1 - prob)`.
    ///
    /// # Shapes
    /// - input: `[...dims]`
    /// - output: `[...dims]`
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if self.prob == 0.0 {
            return x;
        }
        let keep_prob = 1.0 - self.prob;
        let mask = Tensor::random(x.shape(), Distribution::Bernoulli(keep_prob), &x.device());

        x * mask / keep_prob
    }
}
