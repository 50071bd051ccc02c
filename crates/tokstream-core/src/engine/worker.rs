//! Conversion worker: runs one batch through the backend.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::batch::TokenBatch;
use crate::audio::{AudioFrame, PrefixTrimmer};
use crate::backend::{ConversionBackend, ConversionRequest};
use crate::config::{BackendRouting, TokenType};

/// Messages on a worker's private output queue.
#[derive(Debug)]
pub enum SlotMessage {
    Frame(AudioFrame),
    /// End-of-batch sentinel
    End(BatchOutcome),
}

/// What a worker did with its batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub seq: u64,
    pub request_id: String,
    /// Frames pushed to the queue after trimming
    pub frames: usize,
    /// Play time of those frames
    pub audio: Duration,
    /// Backend failure, if the batch ended early because of one
    pub error: Option<String>,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-session settings shared by every worker.
pub struct WorkerContext {
    pub backend: Arc<dyn ConversionBackend>,
    pub prompt_reference: String,
    pub token_type: TokenType,
    pub routing: BackendRouting,
}

pub struct ConversionWorker {
    ctx: Arc<WorkerContext>,
    closing: CancellationToken,
}

impl ConversionWorker {
    pub fn new(ctx: Arc<WorkerContext>, closing: CancellationToken) -> Self {
        Self { ctx, closing }
    }

    /// Convert `batch`, pushing trimmed frames and finally the sentinel to `tx`.
    ///
    /// Backend failures end the batch early; they are logged and reported in
    /// the outcome, never propagated.
    pub async fn run(self, batch: TokenBatch, tx: mpsc::Sender<SlotMessage>) -> BatchOutcome {
        let request_id = Uuid::new_v4().to_string();
        let mut outcome = BatchOutcome {
            seq: batch.seq(),
            request_id: request_id.clone(),
            ..BatchOutcome::default()
        };

        let trim = self.ctx.token_type.duration_of(batch.overlap());
        let mut trimmer = PrefixTrimmer::new(trim);

        debug!(
            batch = batch.seq(),
            request_id = %request_id,
            tokens = batch.len(),
            overlap = batch.overlap(),
            trim_ms = trim.as_millis() as u64,
            "Worker started"
        );

        let request = ConversionRequest {
            tokens: batch.shared_tokens(),
            prompt_reference: self.ctx.prompt_reference.clone(),
            token_type: self.ctx.token_type,
            request_id,
            routing: self.ctx.routing.clone(),
        };

        let started = tokio::select! {
            biased;
            _ = self.closing.cancelled() => None,
            result = self.ctx.backend.convert(request) => Some(result),
        };

        match started {
            None => outcome.cancelled = true,
            Some(Err(e)) => {
                warn!(batch = batch.seq(), "Backend call failed: {e}");
                outcome.error = Some(e.to_string());
            }
            Some(Ok(mut frames)) => loop {
                let next = tokio::select! {
                    biased;
                    _ = self.closing.cancelled() => {
                        outcome.cancelled = true;
                        break;
                    }
                    next = frames.next() => next,
                };

                let frame = match next {
                    None => break,
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!(
                            batch = batch.seq(),
                            frames = outcome.frames,
                            "Backend stream interrupted: {e}"
                        );
                        outcome.error = Some(e.to_string());
                        break;
                    }
                };

                let Some(frame) = trimmer.trim(frame) else {
                    continue;
                };
                if frame.is_empty() {
                    continue;
                }

                let duration = frame.duration();
                if !self.push(&tx, SlotMessage::Frame(frame)).await {
                    outcome.cancelled = true;
                    break;
                }
                outcome.frames += 1;
                outcome.audio += duration;
            },
        }

        if !trimmer.is_done() && outcome.error.is_none() && !outcome.cancelled {
            debug!(
                batch = batch.seq(),
                "Backend produced less audio than the overlap ({}ms untrimmed)",
                trimmer.remaining().as_millis()
            );
        }

        if !self.push(&tx, SlotMessage::End(outcome.clone())).await {
            debug!(batch = batch.seq(), "Sentinel not delivered, sequencer gone");
        }

        debug!(
            batch = outcome.seq,
            frames = outcome.frames,
            audio_ms = outcome.audio.as_millis() as u64,
            "Worker finished"
        );
        outcome
    }

    /// Push onto the bounded queue, waiting for room unless the session closes.
    ///
    /// Returns `false` if the message could not be delivered.
    async fn push(&self, tx: &mpsc::Sender<SlotMessage>, msg: SlotMessage) -> bool {
        if self.closing.is_cancelled() {
            return tx.try_send(msg).is_ok();
        }
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => false,
            sent = tx.send(msg) => sent.is_ok(),
        }
    }
}
