//! Count Regression Training Example
//!
//! Trains a count regression network and its dispersion parameter on synthetic
//! overdispersed counts with a hand-written Adam loop, reporting progress through a
//! lifecycle hook, then samples Monte-Carlo predictions from the trained network.
//!
//! ## Usage
//!
//! ```bash
//! # Train with the default configuration
//! cargo run --bin train
//!
//! # Train from a configuration file and keep the resolved configuration
//! cargo run --bin train -- --config train.json --save-config resolved.json
//!
//! # Show per-stage shape inference
//! RUST_LOG=info,countnet_burn=debug cargo run --bin train
//! ```

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use burn::{
    backend::Autodiff,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use clap::Parser;
use countnet_burn::{
    predict_batches, run_epoch, BatchLogs, CountRegressor, CountRegressorConfig, HookSet, Mode,
    Phase,
};
use countnet_demos::{
    create_device, get_backend_name, init_tracing, SelectedBackend, SyntheticCounts,
    TracingProgress, TrainingConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the resolved configuration to this path
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Override number of epochs
    #[arg(long)]
    num_epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Override Monte-Carlo samples
    #[arg(long)]
    mc_samples: Option<usize>,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => TrainingConfig::new(),
    };

    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(mc_samples) = args.mc_samples {
        config.mc_samples = mc_samples;
    }

    ensure!(config.batch_size > 0, "Batch size must be greater than 0");
    ensure!(
        config.num_epochs > 0,
        "Number of epochs must be greater than 0"
    );
    ensure!(config.learning_rate > 0.0, "Learning rate must be positive");
    ensure!(config.count_scale > 0.0, "Count scale must be positive");

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save config file: {}", path.display()))?;
    }

    tracing::info!(
        backend = get_backend_name(),
        input = %config.input_shape,
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );

    train::<Autodiff<SelectedBackend>>(&create_device(), &config)
}

fn train<B: AutodiffBackend>(device: &B::Device, config: &TrainingConfig) -> Result<()> {
    B::seed(config.seed);

    let mut model: CountRegressor<B> =
        CountRegressorConfig::new(config.topology.clone(), config.input_shape)
            .with_loss(config.loss.clone())
            .with_dispersion(config.dispersion.clone())
            .init(device)
            .context("Failed to build the network")?;
    let mut optim = AdamConfig::new().init();

    let generator = SyntheticCounts::new(
        config.input_shape,
        model.network().output_shape(),
        config.count_scale,
        config.noise_std,
    );
    let mut hooks = HookSet::new().with(TracingProgress::new(config.log_every));

    for epoch in 0..config.num_epochs {
        let batches =
            (0..config.batches_per_epoch).map(|_| generator.batch::<B>(config.batch_size, device));
        run_epoch(&mut hooks, Phase::Train, epoch, batches, |batch| {
            let batch_size = batch.batch_size();
            let output = model.forward_loss(batch, Mode::Train)?;
            let loss = output.loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(config.learning_rate, model.clone(), grads);

            Ok(BatchLogs::new(batch_size).with_loss(loss))
        })?;

        let valid = model.valid();
        let batches = (0..config.valid_batches)
            .map(|_| generator.batch::<B::InnerBackend>(config.batch_size, device));
        run_epoch(&mut hooks, Phase::Eval, epoch, batches, |batch| {
            let batch_size = batch.batch_size();
            let output = valid.forward_loss(batch, Mode::Eval)?;

            Ok(BatchLogs::new(batch_size)
                .with_degenerate_terms(output.degenerate_count())
                .with_loss(output.loss.into_scalar().elem::<f64>()))
        })?;

        tracing::info!(epoch, beta = model.dispersion().value(), "dispersion updated");
    }

    let valid = model.valid();
    let inputs = (0..config.valid_batches)
        .map(|_| generator.batch::<B::InnerBackend>(config.batch_size, device).inputs);
    let predictions = predict_batches(valid.network(), inputs, config.mc_samples, &mut hooks)?;

    for (index, prediction) in predictions.iter().enumerate() {
        tracing::info!(
            batch = index,
            samples = prediction.samples,
            mean = prediction.mean.clone().mean().into_scalar().elem::<f64>(),
            std = prediction.std().mean().into_scalar().elem::<f64>(),
            "monte-carlo prediction"
        );
    }

    tracing::info!(beta = model.dispersion().value(), "training completed successfully");

    Ok(())
}
