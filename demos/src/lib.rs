//! countnet demos
//!
//! Example applications for `countnet-burn`.
//!
//! ## Available Examples
//!
//! - `train`: custom training loop over synthetic overdispersed counts, followed by
//!   Monte-Carlo prediction
//! - `summary`: prints the stage-by-stage shape trace of a topology
//!
//! ## Usage
//!
//! ```bash
//! # Train the reference topology on 36x36 inputs
//! cargo run --bin train
//!
//! # Train from a configuration file, on the WGPU backend
//! cargo run --bin train --features wgpu --no-default-features -- --config train.json
//!
//! # Inspect the shapes of the reference topology for a 40x40 input
//! cargo run --bin summary -- --height 40 --width 40
//! ```

pub mod backend;
pub mod config;
pub mod progress;
pub mod synthetic;
pub mod telemetry;

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
pub use config::TrainingConfig;
pub use progress::TracingProgress;
pub use synthetic::SyntheticCounts;
pub use telemetry::{init_tracing, InitError};
