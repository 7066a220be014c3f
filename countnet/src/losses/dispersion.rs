//! Dispersion parameter of the negative-binomial likelihood.

use burn::{
    module::Param,
    prelude::*,
    tensor::{ElementConversion, TensorData},
};

use crate::error::{CountNetError, CountNetResult};
use crate::losses::negative_binomial::check_mass;

/// Configuration for the [`Dispersion`] module.
#[derive(Config, Debug)]
pub struct DispersionConfig {
    /// Starting value of `beta`. The likelihood uses `M = 1 / beta^2`.
    #[config(default = 1.0)]
    pub initial_beta: f64,
    /// Whether the optimizer updates `beta`.
    #[config(default = true)]
    pub learnable: bool,
}

impl DispersionConfig {
    /// Initializes a new `Dispersion` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(CountNetError::InvalidDispersion)` if `initial_beta` is zero, not
    /// finite, or makes `M = 1 / beta^2` overflow in the backend's precision.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> CountNetResult<Dispersion<B>> {
        if !self.initial_beta.is_finite() {
            return Err(CountNetError::InvalidDispersion {
                beta: self.initial_beta,
            });
        }

        let beta = Tensor::<B, 1>::from_data(TensorData::from([self.initial_beta]), device);
        let m = beta.clone().powf_scalar(2.0).recip().into_scalar().elem::<f64>();
        check_mass(self.initial_beta, m)?;

        Ok(Dispersion {
            beta: Param::from_tensor(beta).set_require_grad(self.learnable),
        })
    }
}

/// Holds `beta` as a one-element parameter.
#[derive(Module, Debug)]
pub struct Dispersion<B: Backend> {
    pub beta: Param<Tensor<B, 1>>,
}

impl<B: Backend> Dispersion<B> {
    /// `beta` as a `[1]` tensor, tracked by autodiff when learnable.
    pub fn beta(&self) -> Tensor<B, 1> {
        self.beta.val()
    }

    /// Current value of `beta`. Synchronizes with the device.
    pub fn value(&self) -> f64 {
        self.beta.val().into_scalar().elem::<f64>()
    }
}
