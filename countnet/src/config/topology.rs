//! Stage descriptions for the encoder-decoder graph.
//!
//! A topology is an ordered list of encoder stages, one bottleneck block and an ordered
//! list of decoder stages. Each decoder names the encoder whose pre-pool output it
//! concatenates after upsampling.

use burn::prelude::*;

use crate::error::{CountNetError, CountNetResult};

/// One encoder stage: a convolutional block followed by non-overlapping max pooling.
#[derive(Config, Debug)]
pub struct FilterConfig {
    /// Output channels of the stage's convolutional block.
    pub num_filters: usize,
    /// Side of the square pooling window; the stride equals the window.
    #[config(default = 1)]
    pub pool_size: usize,
    /// Apply dropout to the pooled map.
    #[config(default = false)]
    pub dropout: bool,
    /// Apply dropout at the end of the convolutional block.
    #[config(default = false)]
    pub block_dropout: bool,
}

/// The bottleneck block between the deepest encoder and the first decoder.
#[derive(Config, Debug)]
pub struct BottleneckConfig {
    /// Output channels of the bottleneck block.
    pub num_filters: usize,
    /// Apply dropout at the end of the block.
    #[config(default = false)]
    pub dropout: bool,
}

/// One decoder stage: transposed convolution, concatenation with a skip map, then a
/// convolutional block.
#[derive(Config, Debug)]
pub struct UpsampleConfig {
    /// Output channels of the transposed convolution and of the block.
    pub num_filters: usize,
    /// Upsampling factor of the transposed convolution.
    pub stride: usize,
    /// Index of the encoder stage whose pre-pool output is concatenated.
    pub skip: usize,
    /// Apply dropout to the stage output.
    #[config(default = false)]
    pub dropout: bool,
    /// Apply dropout at the end of the convolutional block.
    #[config(default = false)]
    pub block_dropout: bool,
}

/// The full encoder-bottleneck-decoder description.
#[derive(Config, Debug)]
pub struct TopologyConfig {
    /// Encoder stages, shallowest first.
    pub encoders: Vec<FilterConfig>,
    /// The bottleneck block.
    pub bottleneck: BottleneckConfig,
    /// Decoder stages, deepest first.
    pub decoders: Vec<UpsampleConfig>,
    /// Drop probability shared by every enabled dropout site.
    #[config(default = 0.5)]
    pub dropout_prob: f64,
}

impl TopologyConfig {
    /// The three-level reference topology.
    ///
    /// Encoders of 8, 16 and 32 filters pool by 3, 3 and 2; the bottleneck has 64 filters.
    /// Two decoders upsample by 2 and 3 and consume the skips of the deepest two encoders.
    /// The shallowest skip is left unused, so the output has a third of the input's
    /// spatial size.
    pub fn reference() -> Self {
        Self::new(
            vec![
                FilterConfig::new(8).with_pool_size(3),
                FilterConfig::new(16).with_pool_size(3),
                FilterConfig::new(32).with_pool_size(2),
            ],
            BottleneckConfig::new(64),
            vec![UpsampleConfig::new(32, 2, 2), UpsampleConfig::new(16, 3, 1)],
        )
    }

    /// Checks the topology for logical consistency, independently of any input shape.
    ///
    /// # Errors
    ///
    /// Returns `Err(CountNetError::InvalidConfiguration)` when:
    /// - there is no encoder stage
    /// - a stage has zero filters, a zero pool size or a zero stride
    /// - a decoder names a skip that does not exist, or skips are not consumed strictly
    ///   deepest first
    /// - a decoder's stride differs from the pool size of the encoder it pairs with
    /// - the dropout probability is outside `[0, 1)`
    pub fn validate(&self) -> CountNetResult<()> {
        if self.encoders.is_empty() {
            return Err(CountNetError::InvalidConfiguration {
                reason: "at least one encoder stage is required".to_string(),
            });
        }

        if !(0.0..1.0).contains(&self.dropout_prob) {
            return Err(CountNetError::InvalidConfiguration {
                reason: format!(
                    "dropout_prob must be in [0, 1), got {}",
                    self.dropout_prob
                ),
            });
        }

        for (index, encoder) in self.encoders.iter().enumerate() {
            if encoder.num_filters == 0 {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!("encoder {index} has zero filters"),
                });
            }
            if encoder.pool_size == 0 {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!("encoder {index} has a zero pool size"),
                });
            }
        }

        if self.bottleneck.num_filters == 0 {
            return Err(CountNetError::InvalidConfiguration {
                reason: "bottleneck has zero filters".to_string(),
            });
        }

        let mut previous_skip: Option<usize> = None;
        for (index, decoder) in self.decoders.iter().enumerate() {
            if decoder.num_filters == 0 {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!("decoder {index} has zero filters"),
                });
            }
            if decoder.stride == 0 {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!("decoder {index} has a zero stride"),
                });
            }

            let Some(encoder) = self.encoders.get(decoder.skip) else {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!(
                        "decoder {index} consumes skip {} but only {} encoder stages exist",
                        decoder.skip,
                        self.encoders.len()
                    ),
                });
            };

            if previous_skip.is_some_and(|previous| decoder.skip >= previous) {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!(
                        "decoder {index} consumes skip {} out of order; skips must be consumed deepest first, each at most once",
                        decoder.skip
                    ),
                });
            }
            previous_skip = Some(decoder.skip);

            if decoder.stride != encoder.pool_size {
                return Err(CountNetError::InvalidConfiguration {
                    reason: format!(
                        "decoder {index} upsamples by {} but encoder {} pools by {}",
                        decoder.stride, decoder.skip, encoder.pool_size
                    ),
                });
            }
        }

        Ok(())
    }

    /// Product of all pool sizes. Inputs whose sides are multiples of it never truncate.
    pub fn pool_product(&self) -> usize {
        self.encoders
            .iter()
            .map(|encoder| encoder.pool_size)
            .product()
    }

    /// Indices of encoder stages whose skip map no decoder consumes.
    pub fn unused_skips(&self) -> Vec<usize> {
        (0..self.encoders.len())
            .filter(|index| !self.decoders.iter().any(|decoder| decoder.skip == *index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(topology: &TopologyConfig, fragment: &str) {
        match topology.validate() {
            Err(CountNetError::InvalidConfiguration { reason }) => {
                assert!(reason.contains(fragment), "unexpected reason: {reason}");
            }
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn reference_topology_is_valid() {
        let topology = TopologyConfig::reference();

        topology.validate().unwrap();
        assert_eq!(topology.pool_product(), 18);
        assert_eq!(topology.unused_skips(), vec![0]);
        assert_eq!(topology.dropout_prob, 0.5);
    }

    #[test]
    fn empty_encoder_list_is_rejected() {
        let topology = TopologyConfig::new(vec![], BottleneckConfig::new(8), vec![]);

        assert_invalid(&topology, "at least one encoder");
    }

    #[test]
    fn zero_filters_are_rejected() {
        let mut topology = TopologyConfig::reference();
        topology.bottleneck.num_filters = 0;

        assert_invalid(&topology, "bottleneck has zero filters");
    }

    #[test]
    fn out_of_range_skip_is_rejected() {
        let mut topology = TopologyConfig::reference();
        topology.decoders[0].skip = 3;

        assert_invalid(&topology, "consumes skip 3");
    }

    #[test]
    fn skips_consumed_twice_or_out_of_order_are_rejected() {
        let mut topology = TopologyConfig::reference();
        topology.decoders[1] = UpsampleConfig::new(16, 2, 2);

        assert_invalid(&topology, "out of order");
    }

    #[test]
    fn stride_must_match_paired_pool_size() {
        let mut topology = TopologyConfig::reference();
        topology.decoders[0].stride = 3;

        assert_invalid(&topology, "upsamples by 3 but encoder 2 pools by 2");
    }

    #[test]
    fn dropout_probability_of_one_is_rejected() {
        let topology = TopologyConfig::reference().with_dropout_prob(1.0);

        assert_invalid(&topology, "dropout_prob");
    }

    #[test]
    fn topology_round_trips_through_json() {
        let topology = TopologyConfig::reference();

        let json = serde_json::to_string(&topology).unwrap();
        let restored: TopologyConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.encoders.len(), 3);
        assert_eq!(restored.decoders[1].stride, 3);
        assert_eq!(restored.bottleneck.num_filters, 64);
    }
}
