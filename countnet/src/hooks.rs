//! Lifecycle hooks for epoch and batch events.
//!
//! A training, evaluation or prediction loop announces where it is through
//! [`LifecycleHooks`]. Every method has a no-op default, so a subscriber implements only the
//! events it cares about. Batch-level events are only emitted for phases in which the
//! subscriber asks for them.

use core::fmt;

/// The kind of loop emitting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Eval,
    Predict,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Eval => "eval",
            Self::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// What one batch step reports back to the loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchLogs {
    /// Number of samples in the batch.
    pub batch_size: usize,
    /// Loss of the batch, when the step computes one.
    pub loss: Option<f64>,
    /// Likelihood terms excluded as degenerate.
    pub degenerate_terms: usize,
}

impl BatchLogs {
    pub const fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            loss: None,
            degenerate_terms: 0,
        }
    }

    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn with_degenerate_terms(mut self, degenerate_terms: usize) -> Self {
        self.degenerate_terms = degenerate_terms;
        self
    }
}

/// Aggregate of one epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochSummary {
    pub batches: usize,
    pub samples: usize,
    /// Batch-size-weighted mean of the batch losses, if any batch reported one.
    pub mean_loss: Option<f64>,
    pub degenerate_terms: usize,
}

/// Subscriber to loop events.
pub trait LifecycleHooks {
    /// Whether batch-level events are wanted for `phase`.
    fn wants_batch_events(&self, _phase: Phase) -> bool {
        true
    }

    fn on_epoch_begin(&mut self, _phase: Phase, _epoch: usize) {}

    fn on_epoch_end(&mut self, _phase: Phase, _epoch: usize, _summary: &EpochSummary) {}

    fn on_batch_begin(&mut self, _phase: Phase, _batch: usize) {}

    fn on_batch_end(&mut self, _phase: Phase, _batch: usize, _logs: &BatchLogs) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {
    fn wants_batch_events(&self, _phase: Phase) -> bool {
        false
    }
}

/// Fans events out to several subscribers, in registration order.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn LifecycleHooks + Send>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    #[must_use]
    pub fn with(mut self, hook: impl LifecycleHooks + Send + 'static) -> Self {
        self.push(hook);
        self
    }

    pub fn push(&mut self, hook: impl LifecycleHooks + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl LifecycleHooks for HookSet {
    fn wants_batch_events(&self, phase: Phase) -> bool {
        self.hooks.iter().any(|hook| hook.wants_batch_events(phase))
    }

    fn on_epoch_begin(&mut self, phase: Phase, epoch: usize) {
        for hook in &mut self.hooks {
            hook.on_epoch_begin(phase, epoch);
        }
    }

    fn on_epoch_end(&mut self, phase: Phase, epoch: usize, summary: &EpochSummary) {
        for hook in &mut self.hooks {
            hook.on_epoch_end(phase, epoch, summary);
        }
    }

    fn on_batch_begin(&mut self, phase: Phase, batch: usize) {
        for hook in self
            .hooks
            .iter_mut()
            .filter(|hook| hook.wants_batch_events(phase))
        {
            hook.on_batch_begin(phase, batch);
        }
    }

    fn on_batch_end(&mut self, phase: Phase, batch: usize, logs: &BatchLogs) {
        for hook in self
            .hooks
            .iter_mut()
            .filter(|hook| hook.wants_batch_events(phase))
        {
            hook.on_batch_end(phase, batch, logs);
        }
    }
}
