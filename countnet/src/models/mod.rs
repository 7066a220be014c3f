//! # Model Architectures
//!
//! - `capability`: the traits every stage of the graph is driven through.
//! - `modules`: the convolutional block and the encoder and decoder stages.
//! - `network`: the builder that validates a topology against an input shape and
//!   assembles the stages into a [`NetworkGraph`].

pub mod capability;
pub mod modules;
pub mod network;

pub use capability::{FeatureMap, StatefulNormalization, Trainable};
pub use modules::*;
pub use network::{NetworkBuilder, NetworkGraph, OUTPUT_CHANNELS};
