//! # countnet-burn
//!
//! A convolutional encoder-decoder that regresses a dense map of expected counts, trained
//! with a negative-binomial negative log-likelihood, built on Burn.
//!
//! Topologies are described with [`TopologyConfig`] and turned into a [`NetworkGraph`] by
//! [`NetworkBuilder::build`], which checks every stage's shape against a concrete input
//! shape before allocating parameters. The graph is driven through the [`Trainable`]
//! trait with an explicit [`Mode`]; dropout stays active in both modes so that
//! [`mc_predict`] can sample predictive uncertainty.
//!
//! ## Features
//!
//! - `train`: `TrainStep` and `ValidStep` for [`CountRegressor`], for use with Burn's
//!   `Learner`.

mod config;
mod error;
mod hooks;
mod inference;
mod losses;
mod models;
mod session;
mod shape;
mod training;

pub use burn_extra_ops::{MeanDivisor, Mode};
pub use config::{BottleneckConfig, FilterConfig, TopologyConfig, UpsampleConfig};
pub use error::{CountNetError, CountNetResult};
pub use hooks::{BatchLogs, EpochSummary, HookSet, LifecycleHooks, NoopHooks, Phase};
pub use inference::{mc_predict, predict_batches, McPrediction};
pub use losses::{
    likelihood_term, negative_binomial_nll, Dispersion, DispersionConfig, LikelihoodTerms,
    NegativeBinomialNll, NegativeBinomialNllConfig,
};
pub use models::{
    ConvolutionalBlock, ConvolutionalBlockConfig, DecoderStage, DecoderStageConfig,
    EncoderStage, EncoderStageConfig, FeatureMap, NetworkBuilder, NetworkGraph,
    StatefulNormalization, Trainable, OUTPUT_CHANNELS,
};
pub use session::run_epoch;
pub use shape::{FeatureShape, ShapeTrace, StageShape};
pub use training::{CountBatch, CountOutput, CountRegressor, CountRegressorConfig};
