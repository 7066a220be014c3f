//! Per-sample feature-map shapes and the stage-by-stage trace recorded while a graph is
//! built.
//!
//! Tensors are channels-first (`[batch, channels, height, width]`); a [`FeatureShape`]
//! describes one sample of such a tensor.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Spatial size and channel depth of one sample of a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FeatureShape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// `(height, width)`.
    pub const fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub const fn with_channels(self, channels: usize) -> Self {
        Self { channels, ..self }
    }

    /// Spatial size after a non-overlapping `factor x factor` reduction. Floors, never pads.
    pub const fn pooled(self, factor: usize) -> Self {
        Self {
            height: self.height / factor,
            width: self.width / factor,
            ..self
        }
    }

    /// Spatial size after upsampling by `factor`.
    pub const fn upsampled(self, factor: usize) -> Self {
        Self {
            height: self.height * factor,
            width: self.width * factor,
            ..self
        }
    }

    /// Whether both spatial dimensions are exact multiples of `factor`.
    pub const fn divisible_by(&self, factor: usize) -> bool {
        self.height % factor == 0 && self.width % factor == 0
    }

    /// Whether any dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Tensor dimensions for a batch of this shape.
    pub const fn dims(&self, batch_size: usize) -> [usize; 4] {
        [batch_size, self.channels, self.height, self.width]
    }
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Shapes entering and leaving one stage of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageShape {
    /// `encoder{i}`, `bottleneck`, `decoder{j}` or `head`.
    pub name: String,
    pub input: FeatureShape,
    pub output: FeatureShape,
    /// The stage pooled a dimension that was not a multiple of its pool size.
    pub truncated: bool,
}

/// Ordered record of every stage's shapes for one built graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeTrace {
    input: FeatureShape,
    stages: Vec<StageShape>,
}

impl ShapeTrace {
    pub const fn new(input: FeatureShape) -> Self {
        Self {
            input,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, stage: StageShape) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[StageShape] {
        &self.stages
    }

    pub const fn input(&self) -> FeatureShape {
        self.input
    }

    /// Output of the last stage, or the input when no stage was recorded.
    pub fn output(&self) -> FeatureShape {
        self.stages.last().map_or(self.input, |stage| stage.output)
    }

    /// Whether any stage truncated while pooling.
    pub fn truncated(&self) -> bool {
        self.stages.iter().any(|stage| stage.truncated)
    }
}

impl fmt::Display for ShapeTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input      {}", self.input)?;
        for stage in &self.stages {
            write!(f, "{:<10} {} -> {}", stage.name, stage.input, stage.output)?;
            if stage.truncated {
                write!(f, " (truncated)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
