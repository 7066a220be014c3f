//! Epoch driver that emits lifecycle events around a per-batch step.

use crate::error::CountNetResult;
use crate::hooks::{BatchLogs, EpochSummary, LifecycleHooks, Phase};

/// Runs `step` over every batch of one epoch, emitting events to `hooks`.
///
/// Events are emitted in the order epoch begin, then for each batch begin and end, then
/// epoch end. Batch events are skipped when `hooks` does not want them for `phase`.
///
/// # Errors
///
/// Returns the first error `step` returns. The epoch is abandoned at that batch and no
/// further events, including the epoch end, are emitted.
pub fn run_epoch<H, I, F>(
    hooks: &mut H,
    phase: Phase,
    epoch: usize,
    batches: I,
    mut step: F,
) -> CountNetResult<EpochSummary>
where
    H: LifecycleHooks + ?Sized,
    I: IntoIterator,
    F: FnMut(I::Item) -> CountNetResult<BatchLogs>,
{
    hooks.on_epoch_begin(phase, epoch);
    let batch_events = hooks.wants_batch_events(phase);

    let mut summary = EpochSummary::default();
    let mut weighted_loss = 0.0;
    let mut loss_samples = 0usize;

    for (index, batch) in batches.into_iter().enumerate() {
        if batch_events {
            hooks.on_batch_begin(phase, index);
        }

        let logs = step(batch)?;

        summary.batches += 1;
        summary.samples += logs.batch_size;
        summary.degenerate_terms += logs.degenerate_terms;
        if let Some(loss) = logs.loss {
            weighted_loss += loss * logs.batch_size as f64;
            loss_samples += logs.batch_size;
        }

        if batch_events {
            hooks.on_batch_end(phase, index, &logs);
        }
    }

    summary.mean_loss = (loss_samples > 0).then(|| weighted_loss / loss_samples as f64);

    tracing::debug!(
        %phase,
        epoch,
        batches = summary.batches,
        samples = summary.samples,
        mean_loss = summary.mean_loss,
        "finished epoch"
    );
    hooks.on_epoch_end(phase, epoch, &summary);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CountNetError;
    use crate::hooks::tests::Recorder;
    use crate::hooks::NoopHooks;

    #[test]
    fn events_bracket_every_batch() {
        let mut recorder = Recorder::default();

        let summary = run_epoch(&mut recorder, Phase::Train, 2, [3usize, 1], |size| {
            Ok(BatchLogs::new(size).with_loss(size as f64))
        })
        .unwrap();

        assert_eq!(
            recorder.events(),
            [
                "train epoch 2 begin",
                "train batch 0 begin",
                "train batch 0 end 3",
                "train batch 1 begin",
                "train batch 1 end 1",
                "train epoch 2 end 2 batches",
            ]
        );
        assert_eq!(summary.samples, 4);
        // (3 * 3 + 1 * 1) / 4
        assert_eq!(summary.mean_loss, Some(2.5));
    }

    #[test]
    fn batch_events_are_skipped_when_unwanted() {
        let mut recorder = Recorder {
            batch_phases: Some(vec![Phase::Train]),
            ..Recorder::default()
        };

        run_epoch(&mut recorder, Phase::Eval, 0, [1usize, 1], |size| {
            Ok(BatchLogs::new(size))
        })
        .unwrap();

        assert_eq!(
            recorder.events(),
            ["eval epoch 0 begin", "eval epoch 0 end 2 batches"]
        );
    }

    #[test]
    fn failing_step_abandons_epoch_without_end_event() {
        let mut recorder = Recorder::default();

        let result = run_epoch(&mut recorder, Phase::Train, 0, [1usize, 2, 3], |size| {
            if size == 2 {
                Err(CountNetError::InvalidObservations {
                    reason: "bad batch".to_string(),
                })
            } else {
                Ok(BatchLogs::new(size))
            }
        });

        assert!(result.is_err());
        assert_eq!(
            recorder.events(),
            [
                "train epoch 0 begin",
                "train batch 0 begin",
                "train batch 0 end 1",
                "train batch 1 begin",
            ]
        );
    }

    #[test]
    fn epoch_without_losses_has_no_mean() {
        let summary = run_epoch(&mut NoopHooks, Phase::Predict, 0, [4usize], |size| {
            Ok(BatchLogs::new(size).with_degenerate_terms(1))
        })
        .unwrap();

        assert_eq!(summary.mean_loss, None);
        assert_eq!(summary.degenerate_terms, 1);
        assert_eq!(summary.batches, 1);
    }
}
