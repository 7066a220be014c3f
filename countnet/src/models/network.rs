//! # Network Graph
//!
//! [`NetworkBuilder`] walks a [`TopologyConfig`] against a concrete input shape before
//! any parameter is allocated. Every stage's shape is computed up front, so an
//! inconsistent pairing of pool sizes, strides and input size fails at build time with
//! the offending stage named, rather than inside a forward pass.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::Mode;

use super::capability::{FeatureMap, Trainable};
use super::modules::{
    ConvolutionalBlock, ConvolutionalBlockConfig, DecoderStage, DecoderStageConfig, EncoderStage,
    EncoderStageConfig,
};
use crate::config::TopologyConfig;
use crate::error::{CountNetError, CountNetResult};
use crate::shape::{FeatureShape, ShapeTrace, StageShape};

/// Channels of the network output: one predicted mean count per location.
pub const OUTPUT_CHANNELS: usize = 1;

/// Stage configurations and shapes resolved for one input shape.
struct Plan {
    encoders: Vec<EncoderStageConfig>,
    bottleneck: ConvolutionalBlockConfig,
    decoders: Vec<DecoderStageConfig>,
    head: Conv2dConfig,
    trace: ShapeTrace,
}

/// Builds a [`NetworkGraph`] from a topology.
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    topology: TopologyConfig,
}

impl NetworkBuilder {
    pub const fn new(topology: TopologyConfig) -> Self {
        Self { topology }
    }

    /// A builder for [`TopologyConfig::reference`].
    pub fn reference() -> Self {
        Self::new(TopologyConfig::reference())
    }

    pub const fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    /// Computes every stage's shapes for `input_shape` without allocating parameters.
    ///
    /// # Errors
    ///
    /// See [`NetworkBuilder::build`].
    pub fn infer_shapes(&self, input_shape: FeatureShape) -> CountNetResult<ShapeTrace> {
        self.plan(input_shape).map(|plan| plan.trace)
    }

    /// Validates the topology against `input_shape` and initializes every stage.
    ///
    /// # Errors
    ///
    /// - `CountNetError::InvalidConfiguration` if the topology is inconsistent.
    /// - `CountNetError::InvalidInputShape` if the input is empty or pooling reduces a map
    ///   to nothing.
    /// - `CountNetError::ShapeMismatch` if a decoder's upsampled map and its skip map
    ///   differ in spatial size.
    pub fn build<B: Backend>(
        &self,
        input_shape: FeatureShape,
        device: &Device<B>,
    ) -> CountNetResult<NetworkGraph<B>> {
        let plan = self.plan(input_shape)?;

        let graph = NetworkGraph {
            encoders: plan
                .encoders
                .iter()
                .map(|config| config.init(device))
                .collect(),
            bottleneck: plan.bottleneck.init(device),
            decoders: plan
                .decoders
                .iter()
                .map(|config| config.init(device))
                .collect(),
            head: plan.head.init(device),
            trace: Ignored(plan.trace),
        };

        tracing::info!(
            input = %input_shape,
            output = %graph.output_shape(),
            encoders = graph.encoders.len(),
            decoders = graph.decoders.len(),
            parameters = graph.num_params(),
            "built count regression network"
        );

        Ok(graph)
    }

    fn plan(&self, input_shape: FeatureShape) -> CountNetResult<Plan> {
        self.topology.validate()?;

        if input_shape.is_empty() {
            return Err(CountNetError::InvalidInputShape {
                reason: format!("input shape {input_shape} has an empty dimension"),
            });
        }

        let dropout_prob = self.topology.dropout_prob;
        let mut trace = ShapeTrace::new(input_shape);
        let mut skips = Vec::with_capacity(self.topology.encoders.len());
        let mut encoders = Vec::with_capacity(self.topology.encoders.len());
        let mut shape = input_shape;

        for (index, filters) in self.topology.encoders.iter().enumerate() {
            let config = EncoderStageConfig::new(shape.channels, filters.clone())
                .with_dropout_prob(dropout_prob);
            let (skip, pooled) = config.output_shapes(shape)?;
            let truncated = config.truncates(shape);

            if truncated {
                tracing::warn!(
                    stage = index,
                    height = shape.height,
                    width = shape.width,
                    pool_size = filters.pool_size,
                    "pooling discards trailing rows or columns"
                );
            }

            record(&mut trace, format!("encoder{index}"), shape, pooled, truncated);
            skips.push(skip);
            encoders.push(config);
            shape = pooled;
        }

        let bottleneck = ConvolutionalBlockConfig::new(shape.channels, self.topology.bottleneck.num_filters)
            .with_dropout(self.topology.bottleneck.dropout)
            .with_dropout_prob(dropout_prob);
        let output = bottleneck.output_shape(shape);
        record(&mut trace, "bottleneck".to_string(), shape, output, false);
        shape = output;

        let mut decoders = Vec::with_capacity(self.topology.decoders.len());
        for (index, upsample) in self.topology.decoders.iter().enumerate() {
            let skip = skips[upsample.skip];
            let config = DecoderStageConfig::new(shape.channels, skip.channels, upsample.clone())
                .with_dropout_prob(dropout_prob);
            let output = config.output_shape(index, shape, skip)?;

            record(&mut trace, format!("decoder{index}"), shape, output, false);
            decoders.push(config);
            shape = output;
        }

        let head = Conv2dConfig::new([shape.channels, OUTPUT_CHANNELS], [1, 1])
            .with_padding(PaddingConfig2d::Valid);
        record(
            &mut trace,
            "head".to_string(),
            shape,
            shape.with_channels(OUTPUT_CHANNELS),
            false,
        );

        Ok(Plan {
            encoders,
            bottleneck,
            decoders,
            head,
            trace,
        })
    }
}

fn record(
    trace: &mut ShapeTrace,
    name: String,
    input: FeatureShape,
    output: FeatureShape,
    truncated: bool,
) {
    tracing::debug!(
        stage = name.as_str(),
        input = %input,
        output = %output,
        truncated,
        "resolved stage shape"
    );
    trace.push(StageShape {
        name,
        input,
        output,
        truncated,
    });
}

/// The assembled encoder-decoder graph.
///
/// The graph is built for one per-sample input shape, recorded in its [`ShapeTrace`]. The
/// output has [`OUTPUT_CHANNELS`] channels and the spatial size of the last decoder's
/// skip map (or of the bottleneck when there is no decoder). Its values are unconstrained
/// real numbers.
#[derive(Module, Debug)]
pub struct NetworkGraph<B: Backend> {
    encoders: Vec<EncoderStage<B>>,
    bottleneck: ConvolutionalBlock<B>,
    decoders: Vec<DecoderStage<B>>,
    head: Conv2d<B>,
    trace: Ignored<ShapeTrace>,
}

impl<B: Backend> Trainable<B> for NetworkGraph<B> {
    /// # Shapes
    /// - input: `[batch, channels, height, width]` of the shape the graph was built for
    /// - output: `[batch, 1, out_height, out_width]`
    fn forward(&self, input: FeatureMap<B>, mode: Mode) -> FeatureMap<B> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = input;
        for encoder in &self.encoders {
            let (skip, pooled) = encoder.forward(x, mode);
            skips.push(skip);
            x = pooled;
        }

        let mut x = self.bottleneck.forward(x, mode);
        for decoder in &self.decoders {
            x = decoder.forward(x, skips[decoder.skip()].clone(), mode);
        }

        self.head.forward(x)
    }
}

impl<B: Backend> NetworkGraph<B> {
    /// [`Trainable::forward`] after checking `input` against the built input shape.
    ///
    /// # Errors
    ///
    /// Returns `Err(CountNetError::InvalidInputShape)` if `input` does not have the
    /// channels, height and width the graph was built for.
    pub fn try_forward(&self, input: FeatureMap<B>, mode: Mode) -> CountNetResult<FeatureMap<B>> {
        let [batch_size, channels, height, width] = input.dims();
        let expected = self.input_shape();

        if FeatureShape::new(height, width, channels) != expected {
            return Err(CountNetError::InvalidInputShape {
                reason: format!(
                    "graph was built for {expected}, got {height}x{width}x{channels}"
                ),
            });
        }
        if batch_size == 0 {
            return Err(CountNetError::InvalidInputShape {
                reason: "empty batch".to_string(),
            });
        }

        Ok(self.forward(input, mode))
    }

    /// Shapes of every stage, in execution order.
    pub fn shape_trace(&self) -> &ShapeTrace {
        &self.trace.0
    }

    /// Per-sample input shape the graph was built for.
    pub fn input_shape(&self) -> FeatureShape {
        self.trace.0.input()
    }

    /// Per-sample output shape.
    pub fn output_shape(&self) -> FeatureShape {
        self.trace.0.output()
    }

    /// Whether any encoder truncates the input shape while pooling.
    pub fn truncated(&self) -> bool {
        self.trace.0.truncated()
    }

    /// Encoder stages whose skip map no decoder consumes. Their outputs are computed and
    /// discarded.
    pub fn unused_skips(&self) -> Vec<usize> {
        (0..self.encoders.len())
            .filter(|index| !self.decoders.iter().any(|decoder| decoder.skip() == *index))
            .collect()
    }
}
