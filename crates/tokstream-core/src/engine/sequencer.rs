//! Ordered delivery of worker output to the caller.
//!
//! The sequencer takes worker slots from a FIFO in submission order and
//! drains each one completely before looking at the next, so frames reach the
//! callback in batch order no matter which worker finishes first.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clock::PlaybackClock;
use super::pool::WorkerSlot;
use super::worker::SlotMessage;
use crate::audio::AudioFrame;

/// Totals gathered while draining slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerReport {
    pub batches_drained: usize,
    pub batches_failed: usize,
    pub frames_delivered: usize,
    pub audio: Duration,
    /// Slots whose worker disappeared without a sentinel
    pub batches_lost: usize,
}

pub struct Sequencer<F> {
    slots: mpsc::Receiver<WorkerSlot>,
    clock: Arc<PlaybackClock>,
    closing: CancellationToken,
    on_frame: F,
}

impl<F> Sequencer<F>
where
    F: FnMut(AudioFrame),
{
    pub fn new(
        slots: mpsc::Receiver<WorkerSlot>,
        clock: Arc<PlaybackClock>,
        closing: CancellationToken,
        on_frame: F,
    ) -> Self {
        Self {
            slots,
            clock,
            closing,
            on_frame,
        }
    }

    /// Drain slots until the FIFO is closed and empty, or the session closes.
    pub async fn run(mut self) -> SequencerReport {
        let mut report = SequencerReport::default();

        'slots: loop {
            let next = tokio::select! {
                biased;
                _ = self.closing.cancelled() => break 'slots,
                slot = self.slots.recv() => slot,
            };
            let Some(mut slot) = next else {
                break;
            };

            loop {
                let msg = tokio::select! {
                    biased;
                    _ = self.closing.cancelled() => {
                        slot.close();
                        break 'slots;
                    }
                    msg = slot.recv() => msg,
                };

                match msg {
                    Some(SlotMessage::Frame(frame)) => {
                        if self.closing.is_cancelled() {
                            slot.close();
                            break 'slots;
                        }
                        let duration = frame.duration();
                        (self.on_frame)(frame);
                        self.clock.record_frame(duration, Instant::now());
                        report.frames_delivered += 1;
                        report.audio += duration;
                    }
                    Some(SlotMessage::End(outcome)) => {
                        report.batches_drained += 1;
                        if outcome.failed() {
                            report.batches_failed += 1;
                        }
                        debug!(
                            batch = slot.seq(),
                            frames = outcome.frames,
                            "Drained batch"
                        );
                        break;
                    }
                    None => {
                        warn!(batch = slot.seq(), "Worker ended without a sentinel");
                        report.batches_lost += 1;
                        break;
                    }
                }
            }
            slot.close();
        }

        if self.closing.is_cancelled() {
            self.slots.close();
            while let Ok(mut slot) = self.slots.try_recv() {
                slot.close();
            }
        }

        report
    }
}
