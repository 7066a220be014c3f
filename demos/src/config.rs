//! Configuration for the training demo, loaded from and saved to JSON via
//! [`TrainingConfig::load`] and [`TrainingConfig::save`].

use burn::prelude::*;
use countnet_burn::{DispersionConfig, FeatureShape, NegativeBinomialNllConfig, TopologyConfig};

/// Training demo configuration.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Stage layout of the network.
    #[config(default = "TopologyConfig::reference()")]
    pub topology: TopologyConfig,

    /// Per-sample input shape.
    #[config(default = "FeatureShape::new(36, 36, 1)")]
    pub input_shape: FeatureShape,

    #[config(default = "NegativeBinomialNllConfig::new()")]
    pub loss: NegativeBinomialNllConfig,

    #[config(default = "DispersionConfig::new()")]
    pub dispersion: DispersionConfig,

    #[config(default = 1e-3)]
    pub learning_rate: f64,

    #[config(default = 5)]
    pub num_epochs: usize,

    #[config(default = 4)]
    pub batch_size: usize,

    /// Synthetic training batches drawn per epoch.
    #[config(default = 8)]
    pub batches_per_epoch: usize,

    /// Synthetic validation batches drawn per epoch.
    #[config(default = 2)]
    pub valid_batches: usize,

    /// Forward passes per Monte-Carlo prediction.
    #[config(default = 16)]
    pub mc_samples: usize,

    /// Expected count of a location whose input patch averages one.
    #[config(default = 10.0)]
    pub count_scale: f64,

    /// Standard deviation of the log-normal noise that overdisperses the counts.
    #[config(default = 0.5)]
    pub noise_std: f64,

    /// Log a training batch every this many batches. Zero disables batch logging.
    #[config(default = 4)]
    pub log_every: usize,

    /// Random seed for reproducibility.
    #[config(default = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = TrainingConfig::new().with_num_epochs(2);

        let json = serde_json::to_string(&config).unwrap();
        let restored: TrainingConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.num_epochs, 2);
        assert_eq!(restored.input_shape, FeatureShape::new(36, 36, 1));
        assert_eq!(restored.topology.encoders.len(), 3);
    }

    #[test]
    fn default_input_never_truncates_reference_topology() {
        let config = TrainingConfig::new();

        let pool_product = config.topology.pool_product();

        assert_eq!(config.input_shape.height % pool_product, 0);
        assert_eq!(config.input_shape.width % pool_product, 0);
    }
}
