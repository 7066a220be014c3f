use thiserror::Error;

/// The error type for `countnet-burn` operations.
///
/// Structural errors abort graph construction before any parameter is allocated.
/// Numeric degeneracies inside the likelihood are not errors: they are absorbed into the
/// aggregate (see [`LikelihoodTerms`](crate::LikelihoodTerms)).
#[derive(Error, Debug)]
pub enum CountNetError {
    /// A decoder stage's upsampled map and its skip map disagree in spatial size.
    #[error(
        "Shape mismatch at decoder stage {stage}: upsampled (height, width) {upsampled:?}, skip {skip:?}"
    )]
    ShapeMismatch {
        /// Index of the decoder stage.
        stage: usize,
        /// `(height, width)` after upsampling.
        upsampled: (usize, usize),
        /// `(height, width)` of the skip map.
        skip: (usize, usize),
    },

    /// `M = 1 / beta^2` is not a finite positive number: `beta` is zero, NaN, or so
    /// small or large that `M` overflows or underflows.
    #[error("Invalid dispersion: beta = {beta}, M = 1/beta^2 is undefined")]
    InvalidDispersion {
        /// The offending value.
        beta: f64,
    },

    /// The topology or another configuration is logically inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// An input shape cannot flow through the graph, or a tensor disagrees with the
    /// shape the graph was built for.
    #[error("Invalid input shape: {reason}")]
    InvalidInputShape {
        /// The reason why the shape is rejected.
        reason: String,
    },

    /// Observed counts and predicted means cannot be paired.
    #[error("Invalid observations: {reason}")]
    InvalidObservations {
        /// The reason why the observations are rejected.
        reason: String,
    },
}

/// A specialized `Result` type for `countnet-burn` operations.
pub type CountNetResult<T> = Result<T, CountNetError>;
