//! Topology Summary
//!
//! Resolves every stage's shape for a topology and an input size without training, and
//! reports pooling truncation, unused skip maps and shape mismatches.
//!
//! ## Usage
//!
//! ```bash
//! # Reference topology on a 36x36 single-channel input
//! cargo run --bin summary
//!
//! # Custom topology from a JSON file, also counting parameters
//! cargo run --bin summary -- --topology topology.json --height 48 --width 48 --params
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{config::Config, module::Module};
use clap::Parser;
use countnet_burn::{FeatureShape, NetworkBuilder, TopologyConfig};
use countnet_demos::{create_device, get_backend_name, init_tracing, SelectedBackend};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topology file path; the reference topology when omitted
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Input height
    #[arg(long, default_value_t = 36)]
    height: usize,

    /// Input width
    #[arg(long, default_value_t = 36)]
    width: usize,

    /// Input channels
    #[arg(long, default_value_t = 1)]
    channels: usize,

    /// Build the network and count its parameters
    #[arg(long)]
    params: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let topology = match &args.topology {
        Some(path) => TopologyConfig::load(path)
            .with_context(|| format!("Failed to load topology file: {}", path.display()))?,
        None => TopologyConfig::reference(),
    };
    let input_shape = FeatureShape::new(args.height, args.width, args.channels);
    let builder = NetworkBuilder::new(topology);

    let trace = builder
        .infer_shapes(input_shape)
        .with_context(|| format!("Topology cannot process a {input_shape} input"))?;

    print!("{trace}");
    println!("output     {}", trace.output());
    println!("pool product {}", builder.topology().pool_product());

    let unused = builder.topology().unused_skips();
    if !unused.is_empty() {
        println!("unused skips {unused:?}");
    }
    if trace.truncated() {
        println!("warning: pooling truncates this input");
    }

    if args.params {
        let graph = builder.build::<SelectedBackend>(input_shape, &create_device())?;
        println!(
            "parameters {} ({})",
            graph.num_params(),
            get_backend_name()
        );
    }

    Ok(())
}
