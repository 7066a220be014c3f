//! Loss functions for count regression.
//!
//! - `negative_binomial`: the negative-binomial negative log-likelihood, in tensor form for
//!   training and in scalar form for reporting.
//! - `dispersion`: the learnable dispersion parameter the likelihood is evaluated with.

mod dispersion;
mod negative_binomial;

pub use dispersion::*;
pub use negative_binomial::*;
