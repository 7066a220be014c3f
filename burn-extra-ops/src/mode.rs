//! Execution mode passed explicitly through every forward call.

use serde::{Deserialize, Serialize};

/// Whether a forward pass is part of an optimisation step.
///
/// Layers that keep running statistics read this value instead of a global flag.
/// Layers that must stay stochastic at inference (see [`McDropout`](crate::McDropout))
/// ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Batch statistics are used and running statistics are updated.
    Train,
    /// Running statistics are read only.
    #[default]
    Eval,
}
