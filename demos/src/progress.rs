//! Progress reporting through `tracing`, subscribed as a lifecycle hook.

use countnet_burn::{BatchLogs, EpochSummary, LifecycleHooks, Phase};

/// Logs every epoch summary and, for training, every `log_every`-th batch.
#[derive(Debug, Clone, Copy)]
pub struct TracingProgress {
    log_every: usize,
}

impl TracingProgress {
    pub const fn new(log_every: usize) -> Self {
        Self { log_every }
    }
}

impl LifecycleHooks for TracingProgress {
    fn wants_batch_events(&self, phase: Phase) -> bool {
        phase == Phase::Train && self.log_every > 0
    }

    fn on_epoch_begin(&mut self, phase: Phase, epoch: usize) {
        tracing::debug!(%phase, epoch, "epoch started");
    }

    fn on_epoch_end(&mut self, phase: Phase, epoch: usize, summary: &EpochSummary) {
        tracing::info!(
            %phase,
            epoch,
            batches = summary.batches,
            samples = summary.samples,
            mean_loss = summary.mean_loss,
            degenerate_terms = summary.degenerate_terms,
            "epoch finished"
        );
    }

    fn on_batch_end(&mut self, phase: Phase, batch: usize, logs: &BatchLogs) {
        if (batch + 1) % self.log_every == 0 {
            tracing::info!(%phase, batch, loss = logs.loss, "batch finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_events_only_for_training() {
        let progress = TracingProgress::new(4);

        assert!(progress.wants_batch_events(Phase::Train));
        assert!(!progress.wants_batch_events(Phase::Eval));
        assert!(!TracingProgress::new(0).wants_batch_events(Phase::Train));
    }
}
