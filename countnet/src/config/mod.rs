//! Configuration for the count-regression network.
//!
//! - `topology`: the encoder, bottleneck and decoder stage descriptions and their
//!   validation

pub mod topology;

pub use topology::{BottleneckConfig, FilterConfig, TopologyConfig, UpsampleConfig};
