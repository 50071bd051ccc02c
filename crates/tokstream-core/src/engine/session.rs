//! One conversion session: token text in, ordered frames out.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch::TokenBatch;
use super::clock::PlaybackClock;
use super::dispatcher::Dispatcher;
use super::pool::{WorkerPool, WorkerSlot};
use super::sequencer::{Sequencer, SequencerReport};
use super::worker::WorkerContext;
use crate::audio::AudioFrame;
use crate::backend::ConversionBackend;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::lexer::lex;
use crate::voice::PromptResolver;

/// Stand-in deadline for shutdown limits too large to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// Input ended; the final batch is being flushed and drained
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Summary returned by a completed (or cancelled) session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub tokens_received: usize,
    pub batches_submitted: usize,
    pub batches_failed: usize,
    pub frames_delivered: usize,
    pub audio_duration: Duration,
    pub cancelled: bool,
}

impl SessionReport {
    pub fn audio_seconds(&self) -> f64 {
        self.audio_duration.as_secs_f64()
    }
}

/// Cancellation and state observation for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Stop the session.
    ///
    /// At most the frame already being handed to the callback is delivered
    /// after this returns; everything queued behind it is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches [`SessionState::Closed`].
    pub async fn closed(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }
}

/// A single-use conversion session.
pub struct Session {
    config: EngineConfig,
    backend: Arc<dyn ConversionBackend>,
    resolver: Arc<dyn PromptResolver>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl Session {
    pub(crate) fn new(
        config: EngineConfig,
        backend: Arc<dyn ConversionBackend>,
        resolver: Arc<dyn PromptResolver>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            backend,
            resolver,
            cancel: CancellationToken::new(),
            state,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        debug!(state = %state, "Session state");
    }

    /// Run the session to completion.
    ///
    /// Consumes `chunks` until it ends (or the session is cancelled) and
    /// calls `on_frame` once per output frame, in order, from the sequencer
    /// task. Only setup failures are returned as errors; backend failures
    /// for individual batches show up in the report.
    pub async fn run<S, T, F>(self, chunks: S, voice_id: &str, on_frame: F) -> Result<SessionReport>
    where
        S: Stream<Item = T>,
        T: AsRef<str>,
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let prompt_reference = match self.setup(voice_id).await {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(voice = voice_id, "Session setup failed: {e}");
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        self.set_state(SessionState::Running);
        info!(
            voice = voice_id,
            workers = self.config.worker_count,
            token_type = %self.config.token_type,
            "Session started"
        );

        let clock = Arc::new(PlaybackClock::new());
        let ctx = Arc::new(WorkerContext {
            backend: Arc::clone(&self.backend),
            prompt_reference,
            token_type: self.config.token_type,
            routing: self.config.routing.clone(),
        });
        let mut pool = WorkerPool::new(
            ctx,
            self.config.worker_count,
            self.config.frame_queue_capacity,
            self.cancel.clone(),
        );

        let (slot_tx, slot_rx) = mpsc::channel::<WorkerSlot>(self.config.worker_count);
        let sequencer = Sequencer::new(slot_rx, Arc::clone(&clock), self.cancel.clone(), on_frame);
        let mut sequencer = tokio::spawn(sequencer.run());

        let mut dispatcher = Dispatcher::new(self.config.batch_policy(), clock, Instant::now());
        let mut report = SessionReport::default();

        let mut ticker = tokio::time::interval(self.config.reevaluate_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        futures::pin_mut!(chunks);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                chunk = chunks.next() => match chunk {
                    Some(text) => {
                        report.tokens_received += dispatcher.push(lex(text.as_ref()));
                    }
                    None => break,
                },
                _ = ticker.tick(), if dispatcher.has_pending() => {}
            }

            if let Some((batch, _)) = dispatcher.poll(pool.in_flight(), Instant::now()) {
                if !self.submit(&mut pool, &slot_tx, batch).await {
                    break;
                }
                report.batches_submitted += 1;
            }
        }

        if !self.cancel.is_cancelled() {
            self.set_state(SessionState::Draining);
            if let Some(batch) = dispatcher.finish(Instant::now()) {
                if self.submit(&mut pool, &slot_tx, batch).await {
                    report.batches_submitted += 1;
                }
            }
        }
        drop(slot_tx);

        let drained = if self.cancel.is_cancelled() {
            let limit = self.config.shutdown_timeout();
            let now = Instant::now();
            let deadline = now.checked_add(limit).unwrap_or(now + FAR_FUTURE);
            pool.join_until(deadline).await;
            match timeout_at(deadline, &mut sequencer).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Sequencer did not stop within {}ms", limit.as_millis());
                    sequencer.abort();
                    Ok(SequencerReport::default())
                }
            }
        } else {
            let joined = (&mut sequencer).await;
            pool.join(Duration::MAX).await;
            joined
        };

        let drained = match drained {
            Ok(drained) => drained,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!("Sequencer task ended abnormally: {e}");
                SequencerReport::default()
            }
        };

        report.batches_failed = drained.batches_failed + drained.batches_lost;
        report.frames_delivered = drained.frames_delivered;
        report.audio_duration = drained.audio;
        report.cancelled = self.cancel.is_cancelled();
        self.set_state(SessionState::Closed);

        info!(
            tokens = report.tokens_received,
            batches = report.batches_submitted,
            failed = report.batches_failed,
            frames = report.frames_delivered,
            audio_ms = report.audio_duration.as_millis() as u64,
            cancelled = report.cancelled,
            "Session closed"
        );
        Ok(report)
    }

    async fn setup(&self, voice_id: &str) -> Result<String> {
        let prompt = self.resolver.resolve(voice_id).await?;
        self.backend.probe().await.map_err(|e| match e {
            Error::BackendUnavailable(_) => e,
            other => Error::BackendUnavailable(other.to_string()),
        })?;
        Ok(prompt)
    }

    /// Hand a batch to the pool and queue its slot for the sequencer.
    ///
    /// Returns `false` once the session is closing.
    async fn submit(
        &self,
        pool: &mut WorkerPool,
        slot_tx: &mpsc::Sender<WorkerSlot>,
        batch: TokenBatch,
    ) -> bool {
        let slot = match pool.submit(batch).await {
            Ok(slot) => slot,
            Err(e) => {
                debug!("Batch not submitted: {e}");
                return false;
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = slot_tx.send(slot) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ToneBackend;
    use crate::voice::VoicePromptTable;
    use tokio_test::{assert_pending, assert_ready, task};

    fn session() -> Session {
        Session::new(
            EngineConfig::default(),
            Arc::new(ToneBackend::default()),
            Arc::new(VoicePromptTable::default()),
        )
    }

    #[test]
    fn closed_resolves_only_once_closed() {
        let session = session();
        let observer = session.handle();
        let mut handle = observer.clone();
        let mut closed = task::spawn(async move { handle.closed().await });

        assert_pending!(closed.poll());
        session.set_state(SessionState::Running);
        assert!(closed.is_woken());
        assert_pending!(closed.poll());
        assert_eq!(observer.state(), SessionState::Running);

        session.set_state(SessionState::Closed);
        assert_ready!(closed.poll());
        assert_eq!(observer.state(), SessionState::Closed);
    }

    #[test]
    fn handles_share_one_cancellation() {
        let session = session();
        let a = session.handle();
        let b = a.clone();
        assert!(!a.is_cancelled());

        b.cancel();
        assert!(a.is_cancelled());
        assert!(session.cancel.is_cancelled());
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_string(&SessionState::Closed).unwrap(),
            "\"closed\""
        );
    }
}
