//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used in deep learning but are not
//! yet available in the core Burn framework, or are available only with semantics tied to
//! the backend's autodiff state:
//!
//! - [`BatchNorm2d`]: batch normalization driven by an explicit [`Mode`].
//! - [`McDropout`]: dropout that stays active at inference.
//! - [`LogGamma`]: a differentiable element-wise `ln Γ(x)`.
//! - [`masked_mean`] / [`nan_mean`]: means with an explicit [`MeanDivisor`] policy.

mod batch_norm;
mod lgamma;
mod masked_mean;
mod mc_dropout;
mod mode;

// Convenient re-exports
pub use batch_norm::{BatchNorm2d, BatchNorm2dConfig};
pub use lgamma::{lgamma, LogGamma};
pub use masked_mean::{masked_mean, nan_mean, MeanDivisor};
pub use mc_dropout::{McDropout, McDropoutConfig};
pub use mode::Mode;
